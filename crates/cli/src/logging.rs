use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the global subscriber. `RUST_LOG` overrides the verbosity.
pub fn init_logging(verbosity: u8) {
	// 0 = info, 1 (-v or debug option) = debug, 2+ (-vv) = trace
	let filter = filter_for(verbosity);

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

fn filter_for(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "info,hyper=warn,reqwest=warn",
		1 => "debug,hyper=info,reqwest=info",
		_ => "trace",
	}
}
