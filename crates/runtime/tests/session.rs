use smsgw_protocol::{SecurityCodeKind, SecurityState};
use smsgw_runtime::{
	Authentication, ConnectionParams, DriverErrorKind, Error, Op, Session, SessionHealth,
	SimulatedModem,
};

fn params() -> ConnectionParams {
	ConnectionParams::new("/dev/ttyUSB0")
}

#[tokio::test]
async fn connect_and_authenticate_ready_sim() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	assert_eq!(session.health(), SessionHealth::Connected);

	let auth = session.authenticate(None).await.unwrap();
	assert_eq!(auth, Authentication::Ready);
	assert_eq!(session.health(), SessionHealth::Ready);
	assert_eq!(handle.journal(), vec![Op::Init, Op::Security]);
}

#[tokio::test]
async fn device_open_failure_is_fatal() {
	let modem = SimulatedModem::new();
	modem.handle().fail_init(DriverErrorKind::Io);

	let err = Session::connect(Box::new(modem), params()).await.unwrap_err();
	assert!(matches!(err, Error::DeviceOpen { .. }));
	assert!(err.is_fatal());
}

#[tokio::test]
async fn missing_sim_at_init_degrades() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();
	handle.fail_init(DriverErrorKind::NoSim);
	handle.fail_security_status(true);

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	assert!(matches!(session.health(), SessionHealth::Degraded(_)));

	let auth = session.authenticate(Some("1234")).await.unwrap();
	assert!(matches!(auth, Authentication::Degraded { .. }));
}

#[tokio::test]
async fn pin_required_without_pin_is_fatal() {
	let modem = SimulatedModem::new();
	modem.handle().set_security(SecurityState::PinRequired);

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	for pin in [None, Some("")] {
		let err = session.authenticate(pin).await.unwrap_err();
		assert!(matches!(err, Error::PinRequired));
		assert!(err.is_fatal());
	}
}

#[tokio::test]
async fn pin_entry_unlocks_sim() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();
	handle.set_security(SecurityState::PinRequired);
	handle.set_pin(Some("1234"));

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	assert_eq!(session.authenticate(Some("1234")).await.unwrap(), Authentication::Ready);
	assert_eq!(handle.security(), SecurityState::Ready);
	assert!(handle.journal().contains(&Op::EnterCode(SecurityCodeKind::Pin)));
}

#[tokio::test]
async fn wrong_pin_is_fatal() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();
	handle.set_security(SecurityState::PinRequired);
	handle.set_pin(Some("1234"));

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	let err = session.authenticate(Some("9999")).await.unwrap_err();
	assert!(matches!(err, Error::SecurityCode(_)));
	assert!(err.is_fatal());
}

#[tokio::test]
async fn blocked_sim_is_fatal() {
	let modem = SimulatedModem::new();
	modem.handle().set_security(SecurityState::Blocked);

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	let err = session.authenticate(Some("1234")).await.unwrap_err();
	assert!(matches!(err, Error::SimBlocked));
}

#[tokio::test]
async fn unknown_security_state_degrades() {
	let modem = SimulatedModem::new();
	modem.handle().set_security(SecurityState::Unknown);

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	let auth = session.authenticate(None).await.unwrap();
	assert!(matches!(auth, Authentication::Degraded { .. }));
}

#[tokio::test]
async fn debug_log_failure_is_only_a_warning() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();
	handle.fail_debug_log(true);

	let params = params().with_debug_log("/data/gammu-debug.log");
	let session = Session::connect(Box::new(modem), params).await.unwrap();
	assert_eq!(session.health(), SessionHealth::Connected);
	assert_eq!(handle.journal(), vec![Op::Init, Op::DebugLog]);
}

#[tokio::test]
async fn debug_log_is_enabled_when_configured() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();

	let params = params().with_debug_log("/tmp/modem.log");
	Session::connect(Box::new(modem), params).await.unwrap();
	assert_eq!(handle.debug_log().as_deref(), Some(std::path::Path::new("/tmp/modem.log")));
}

#[tokio::test]
async fn reset_reenters_stored_pin() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();
	handle.set_security(SecurityState::PinRequired);
	handle.set_pin(Some("1234"));

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	session.authenticate(Some("1234")).await.unwrap();
	handle.clear_journal();

	session.reset().await.unwrap();
	assert_eq!(
		handle.journal(),
		vec![Op::Reset(false), Op::Security, Op::EnterCode(SecurityCodeKind::Pin)]
	);
	assert_eq!(handle.security(), SecurityState::Ready);
	assert_eq!(session.health(), SessionHealth::Ready);
}

#[tokio::test]
async fn reset_failure_is_not_fatal() {
	let modem = SimulatedModem::new();
	modem.handle().fail_reset(true);

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	session.authenticate(None).await.unwrap();

	let err = session.reset().await.unwrap_err();
	assert!(matches!(err, Error::Reset(_)));
	assert!(!err.is_fatal());
}

#[tokio::test]
async fn close_deinitializes_driver() {
	let modem = SimulatedModem::new();
	let handle = modem.handle();

	let session = Session::connect(Box::new(modem), params()).await.unwrap();
	session.close().await;
	assert!(handle.is_closed());
}
