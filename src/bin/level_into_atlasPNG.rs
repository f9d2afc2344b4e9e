#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	clap::Parser,
	std::{error::Error, io::BufWriter, path::PathBuf},
	tga_builder::{
		config::Config,
		pipeline::{self, CancelToken, LoadOutcome},
		pool::ArrayPool,
		stdoutRaw, writePNG,
	},
};

fn main() -> Result<(), Box<dyn Error>> {
	#[derive(Parser, Debug)]
	struct Args {
		#[clap(long)]
		config: Option<PathBuf>,
		level: PathBuf,
	}
	env_logger::init();
	let Args { config, level } = Args::parse();
	let config = match config {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	let LoadOutcome::Loaded(atlas) = pipeline::loadAtlas(&level, &config, &ArrayPool::new(), &CancelToken::new())? else {
		return Ok(());
	};
	writePNG(&atlas.image, BufWriter::new(stdoutRaw()))?;
	Ok(())
}
