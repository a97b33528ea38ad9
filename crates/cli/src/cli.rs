use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(name = "smsgw")]
#[command(about = "SMS gateway for USB/serial GSM modems")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Options file (JSON)
	#[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
	pub config: PathBuf,

	/// Extra secrets file; may be repeated, later files win
	#[arg(long = "secrets", value_name = "FILE")]
	pub secrets: Vec<PathBuf>,

	/// Override the HTTP port from the options file
	#[arg(short, long)]
	pub port: Option<u16>,

	/// Fixture loaded into the simulated modem
	#[arg(long, value_name = "FILE")]
	pub fixture: Option<PathBuf>,
}
