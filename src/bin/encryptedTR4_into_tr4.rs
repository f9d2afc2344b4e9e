#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	clap::Parser,
	std::{path::PathBuf, process::ExitCode},
	tga_builder::decrypt,
};

fn main() -> ExitCode {
	#[derive(Parser, Debug)]
	struct Args {
		src: PathBuf,
		dest: PathBuf,
	}
	env_logger::init();
	let Args { src, dest } = Args::parse();
	if decrypt::decryptFile(&src, &dest) { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
