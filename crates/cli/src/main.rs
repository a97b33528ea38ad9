use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use smsgw::{Gateway, Monitor, NullSink, Publisher, TelemetrySink};
use smsgw_cli::cli::Cli;
use smsgw_cli::config::{self, GatewayConfig};
use smsgw_cli::http::{self, AppState, Credentials};
use smsgw_cli::logging;
use smsgw_cli::secrets::SecretResolver;
use smsgw_cli::sinks::{LogSink, WebhookSink};
use smsgw_runtime::{Authentication, Session, SimulatedModem};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let debug = config::debug_requested(&cli.config);
	logging::init_logging(cli.verbose.max(u8::from(debug)));

	if let Err(err) = run(cli).await {
		error!(target = "smsgw", error = %format!("{err:#}"), "gateway stopped");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<()> {
	let secrets = SecretResolver::with_default_files(cli.secrets);
	let mut config = GatewayConfig::load(&cli.config, &secrets)?;
	if let Some(port) = cli.port {
		config.port = port;
	}

	let modem = match cli.fixture.or_else(|| config.simulation_fixture.clone()) {
		Some(path) => SimulatedModem::load(&path)
			.with_context(|| format!("failed to load modem fixture {}", path.display()))?,
		None => {
			warn!(target = "smsgw", "no modem fixture configured; starting with empty storage");
			SimulatedModem::new()
		}
	};

	let session = Session::connect(Box::new(modem), config.connection_params()).await?;
	match session.authenticate(config.pin()).await? {
		Authentication::Ready => info!(target = "smsgw", device = %config.device_path, "modem ready"),
		Authentication::Degraded { reason } => {
			warn!(target = "smsgw", device = %config.device_path, %reason, "modem degraded")
		}
	}
	let session = Arc::new(session);

	let sink = build_sink(&config);
	if config.telemetry_enabled {
		if let Err(err) = sink.connect().await {
			warn!(target = "smsgw", error = %err, "telemetry unavailable; continuing without it");
		}
	}
	let publisher = Arc::new(Publisher::new(sink.clone(), &config.telemetry_topic_prefix));
	let gateway = Arc::new(
		Gateway::new(Arc::clone(&session), publisher).with_default_smsc(&config.smsc_number),
	);

	let monitor = config
		.telemetry_enabled
		.then(|| Monitor::new(Arc::clone(&gateway), config.monitor_config()).spawn());

	let addr = config.bind_addr();
	let listener = TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;
	info!(
		target = "smsgw",
		version = env!("CARGO_PKG_VERSION"),
		telemetry = config.telemetry_enabled,
		"SMS gateway started"
	);

	let state = AppState::new(gateway, Credentials::new(&config.username, &config.password));
	let served = http::serve(listener, state, shutdown_signal()).await;

	if let Some(monitor) = monitor {
		monitor.stop().await;
	}
	if let Err(err) = sink.disconnect().await {
		warn!(target = "smsgw", error = %err, "telemetry disconnect failed");
	}
	session.close().await;
	info!(target = "smsgw", "SMS gateway stopped");

	served.context("HTTP server failed")
}

fn build_sink(config: &GatewayConfig) -> Arc<dyn TelemetrySink> {
	if !config.telemetry_enabled {
		return Arc::new(NullSink);
	}
	match config.telemetry_endpoint.as_deref().map(str::trim) {
		Some(endpoint) if !endpoint.is_empty() => Arc::new(WebhookSink::new(endpoint)),
		_ => Arc::new(LogSink::new()),
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			error!(target = "smsgw", error = %err, "cannot listen for ctrl-c");
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(err) => {
				error!(target = "smsgw", error = %err, "cannot listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
	info!(target = "smsgw", "shutdown requested");
}
