use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "jobsh")]
#[command(about = "A small shell with job control")]
pub struct ShellOpts {
	/// Text printed before each line is read
	#[arg(long, default_value = "# ")]
	pub prompt: String,

	/// Run a single line and exit with its status
	#[arg(short = 'c', value_name = "LINE")]
	pub command: Option<String>,

	/// Log more; repeat for even more. RUST_LOG still wins.
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

impl ShellOpts {
	pub fn log_level(&self) -> LevelFilter {
		match self.verbose {
			0 => LevelFilter::Warn,
			1 => LevelFilter::Debug,
			_ => LevelFilter::Trace,
		}
	}
}
