#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	clap::Parser,
	log::{error, info, warn},
	std::{path::PathBuf, process::ExitCode},
	tga_builder::{
		config::Config,
		pipeline::{self, CancelToken, LoadOutcome},
		pool::ArrayPool,
		tga, Result,
	},
};

/// Builds a level-compatible TGA texture atlas from a Tomb Raider level.
#[derive(Parser, Debug)]
struct Args {
	/// .phd, .tub, .tr2, .tr4 or .ten level
	level: PathBuf,
	/// Defaults to the level path with a .tga extension
	#[clap(short, long)]
	output: Option<PathBuf>,
	/// TOML file with build settings
	#[clap(long)]
	config: Option<PathBuf>,
	/// Lay out whole pages instead of the tiles the geometry uses
	#[clap(long)]
	noRepack: bool,
	#[clap(long)]
	widthPages: Option<usize>,
	#[clap(long)]
	panelColumns: Option<usize>,
}

fn run(args: Args) -> Result<()> {
	let mut config = match &args.config {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	config.repack &= !args.noRepack;
	config.widthPages = args.widthPages.unwrap_or(config.widthPages);
	config.panelColumns = args.panelColumns.unwrap_or(config.panelColumns);

	let atlas = match pipeline::loadAtlas(&args.level, &config, &ArrayPool::new(), &CancelToken::new())? {
		LoadOutcome::Loaded(atlas) => atlas,
		LoadOutcome::Cancelled => {
			warn!("cancelled");
			return Ok(());
		}
	};
	let output = args.output.unwrap_or_else(|| args.level.with_extension("tga"));
	tga::exportTGA(&atlas.image, &output)?;
	info!("{output:?}: {}x{} atlas", atlas.image.width, atlas.image.height);
	Ok(())
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	match run(Args::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("{err}");
			ExitCode::FAILURE
		}
	}
}
