use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use log::debug;
use nix::sys::wait::WaitStatus;

use jobsh::error::ShResult;
use jobsh::execute::dispatch;
use jobsh::helper;
use jobsh::opts::ShellOpts;
use jobsh::parser;
use jobsh::shellenv;

fn main() -> ExitCode {
	let opts = ShellOpts::parse();
	env_logger::Builder::new()
		.filter_level(opts.log_level())
		.parse_default_env()
		.init();

	if let Err(e) = shellenv::init_shell() {
		eprintln!("{}", e);
		return ExitCode::FAILURE
	}

	let result = match opts.command.as_deref() {
		Some(line) => run_line(line).map(helper::status_code),
		None => read_loop(&opts.prompt).map(|_| 0),
	};
	match result {
		Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
		Err(e) => {
			eprintln!("{}", e);
			ExitCode::FAILURE
		}
	}
}

fn read_loop(prompt: &str) -> ShResult<()> {
	let stdin = io::stdin();
	let mut buf = vec![];
	loop {
		print!("{}", prompt);
		io::stdout().flush()?;

		let Some(line) = helper::read_cmdline(&mut stdin.lock(), &mut buf)? else {
			println!();
			return Ok(())
		};
		match run_line(&line) {
			Ok(status) => debug!("foreground outcome: {:?}", status),
			Err(e) if e.is_fatal() => return Err(e),
			Err(e) => eprintln!("{}", e),
		}
	}
}

fn run_line(line: &str) -> ShResult<Option<WaitStatus>> {
	let cmd_line = parser::parse_line(line)?;
	debug!("parsed line: {:?}", cmd_line);
	dispatch::dispatch_exec(cmd_line, &mut io::stdout())
}
