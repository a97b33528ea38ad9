use std::sync::Arc;
use std::time::Duration;

use smsgw::testing::RecordingSink;
use smsgw::{Gateway, Monitor, MonitorConfig, MonitorState, Publisher};
use smsgw_protocol::{ConcatInfo, RawFragment};
use smsgw_runtime::{ConnectionParams, Session, SimulatedHandle, SimulatedModem};

async fn monitor_with(
	fragments: Vec<RawFragment>,
	config: MonitorConfig,
	sink: Arc<RecordingSink>,
) -> (Monitor, SimulatedHandle) {
	let modem = SimulatedModem::with_fragments(fragments);
	let handle = modem.handle();
	let session = Session::connect(Box::new(modem), ConnectionParams::new("/dev/ttyUSB0"))
		.await
		.unwrap();
	let publisher = Arc::new(Publisher::new(sink, "gw"));
	let gateway = Arc::new(Gateway::new(Arc::new(session), publisher));
	(Monitor::new(gateway, config), handle)
}

#[tokio::test]
async fn unchanged_storage_is_forwarded_once() {
	let sink = Arc::new(RecordingSink::connected());
	let (mut monitor, _) = monitor_with(
		vec![RawFragment::text(1, "+420111", "Hello")],
		MonitorConfig::default(),
		sink.clone(),
	)
	.await;

	assert_eq!(monitor.poll_messages().await, 1);
	monitor.poll_status().await;
	assert_eq!(monitor.poll_messages().await, 0);
	monitor.poll_status().await;

	let sms = sink.on_topic("sms/state");
	assert_eq!(sms.len(), 1);
	assert_eq!(sms[0].payload["Text"], "Hello");
	assert_eq!(sink.on_topic("signal/state").len(), 2);
	assert_eq!(sink.on_topic("network/state").len(), 2);
	assert_eq!(monitor.seen().len(), 1);
}

#[tokio::test]
async fn new_message_after_first_cycle_is_forwarded() {
	let sink = Arc::new(RecordingSink::connected());
	let (mut monitor, handle) = monitor_with(
		vec![RawFragment::text(1, "+1", "first")],
		MonitorConfig::default(),
		sink.clone(),
	)
	.await;

	monitor.poll_messages().await;
	handle.store(RawFragment::text(2, "+1", "second"));
	assert_eq!(monitor.poll_messages().await, 1);

	let texts: Vec<_> = sink
		.on_topic("sms/state")
		.into_iter()
		.map(|p| p.payload["Text"].clone())
		.collect();
	assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn status_queries_are_independent() {
	let sink = Arc::new(RecordingSink::connected());
	let (monitor, handle) = monitor_with(Vec::new(), MonitorConfig::default(), sink.clone()).await;
	handle.fail_signal(true);

	monitor.poll_status().await;
	assert!(sink.on_topic("signal/state").is_empty());
	assert_eq!(sink.on_topic("network/state").len(), 1);
}

#[tokio::test]
async fn delete_after_publish_clears_storage() {
	let sink = Arc::new(RecordingSink::connected());
	let config = MonitorConfig {
		delete_after_publish: true,
		..Default::default()
	};
	let (mut monitor, handle) = monitor_with(
		vec![RawFragment::text(1, "+1", "a"), RawFragment::text(2, "+1", "b")],
		config,
		sink.clone(),
	)
	.await;

	assert_eq!(monitor.poll_messages().await, 2);
	assert!(handle.locations().is_empty());
}

#[tokio::test]
async fn failed_publish_is_retried_and_not_deleted() {
	let sink = Arc::new(RecordingSink::connected());
	let config = MonitorConfig {
		delete_after_publish: true,
		..Default::default()
	};
	let (mut monitor, handle) =
		monitor_with(vec![RawFragment::text(1, "+1", "keep me")], config, sink.clone()).await;

	sink.fail_publishes(true);
	assert_eq!(monitor.poll_messages().await, 0);
	assert!(monitor.seen().is_empty());
	assert_eq!(handle.locations(), vec![1]);

	sink.fail_publishes(false);
	assert_eq!(monitor.poll_messages().await, 1);
	let sms = sink.on_topic("sms/state");
	assert_eq!(sms.len(), 1);
	assert_eq!(sms[0].payload["Text"], "keep me");
	assert!(handle.locations().is_empty());
}

fn part(location: u32, total: u8, sequence: u8, text: &str) -> RawFragment {
	RawFragment::text(location, "+420111", text).with_concat(ConcatInfo::new(42, total, sequence))
}

#[tokio::test]
async fn incomplete_message_waits_for_remaining_parts() {
	let sink = Arc::new(RecordingSink::connected());
	let (mut monitor, handle) =
		monitor_with(vec![part(1, 2, 1, "Hel")], MonitorConfig::default(), sink.clone()).await;

	assert_eq!(monitor.poll_messages().await, 0);
	assert!(sink.on_topic("sms/state").is_empty());

	handle.store(part(2, 2, 2, "lo"));
	assert_eq!(monitor.poll_messages().await, 1);
	assert_eq!(monitor.poll_messages().await, 0);

	let texts: Vec<_> = sink
		.on_topic("sms/state")
		.into_iter()
		.map(|p| p.payload["Text"].clone())
		.collect();
	assert_eq!(texts, vec!["Hello"]);
}

#[tokio::test]
async fn incomplete_message_is_forwarded_after_timeout() {
	let sink = Arc::new(RecordingSink::connected());
	let config = MonitorConfig {
		incomplete_timeout: Duration::ZERO,
		..Default::default()
	};
	let (mut monitor, _) = monitor_with(vec![part(1, 3, 1, "partial")], config, sink.clone()).await;

	assert_eq!(monitor.poll_messages().await, 1);
	assert_eq!(monitor.poll_messages().await, 0);
	let sms = sink.on_topic("sms/state");
	assert_eq!(sms.len(), 1);
	assert_eq!(sms[0].payload["Text"], "partial");
}

#[tokio::test]
async fn disconnected_telemetry_defers_forwarding() {
	let sink = Arc::new(RecordingSink::new());
	let (mut monitor, _) = monitor_with(
		vec![RawFragment::text(1, "+1", "later")],
		MonitorConfig::default(),
		sink.clone(),
	)
	.await;

	assert_eq!(monitor.poll_messages().await, 0);
	assert!(monitor.seen().is_empty());

	smsgw::TelemetrySink::connect(sink.as_ref()).await.unwrap();
	assert_eq!(monitor.poll_messages().await, 1);
}

#[tokio::test]
async fn spawned_monitor_publishes_and_stops() {
	let sink = Arc::new(RecordingSink::connected());
	let config = MonitorConfig {
		status_interval: Duration::from_millis(20),
		sms_interval: Some(Duration::from_millis(20)),
		..Default::default()
	};
	let (monitor, _) = monitor_with(vec![RawFragment::text(1, "+1", "hi")], config, sink.clone()).await;

	let handle = monitor.spawn();
	tokio::time::sleep(Duration::from_millis(120)).await;
	let mut state = handle.subscribe();
	handle.stop().await;

	assert_eq!(*state.borrow_and_update(), MonitorState::Stopped);
	assert_eq!(sink.on_topic("homeassistant/sensor/sms_gateway_signal/config").len(), 1);
	assert!(sink.on_topic("signal/state").len() >= 2);
	assert_eq!(sink.on_topic("sms/state").iter().filter(|p| p.payload["Text"] == "hi").count(), 1);
}

#[tokio::test]
async fn disabled_message_checks_never_fetch() {
	let sink = Arc::new(RecordingSink::connected());
	let config = MonitorConfig {
		status_interval: Duration::from_secs(3600),
		sms_interval: None,
		..Default::default()
	};
	let (monitor, handle) = monitor_with(vec![RawFragment::text(1, "+1", "hi")], config, sink.clone()).await;

	let running = monitor.spawn();
	tokio::time::sleep(Duration::from_millis(50)).await;
	running.stop().await;

	assert!(!handle.journal().contains(&smsgw_runtime::Op::Status));
}
