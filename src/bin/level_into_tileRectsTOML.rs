#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	clap::Parser,
	serde::Serialize,
	std::{error::Error, path::PathBuf},
	tga_builder::{
		pipeline::{self, CancelToken, LoadOutcome},
		pool::ArrayPool,
		repack::{self, Placement},
		UsizeExt, PAGE_SIZE,
	},
};

fn main() -> Result<(), Box<dyn Error>> {
	#[derive(Parser, Debug)]
	struct Args {
		#[clap(long, default_value_t = 1)]
		widthPages: usize,
		level: PathBuf,
	}
	#[derive(Serialize)]
	struct TileRectsTOML {
		pageCount: usize,
		canvasWidth: usize,
		canvasHeight: usize,
		referenceCount: usize,
		placements: Vec<Placement>,
	}
	env_logger::init();
	let Args { widthPages, level } = Args::parse();
	let LoadOutcome::Loaded(textures) = pipeline::loadLevel(&level, &ArrayPool::new(), &CancelToken::new())? else {
		return Ok(());
	};
	let tileRects = repack::dedup(textures.tileRects.iter().copied());
	let canvasWidth = widthPages.max(1) * PAGE_SIZE;
	let packing = repack::pack(&Vec::from_iter(tileRects.iter().map(|tileRect| tileRect.dimensions())), canvasWidth)?;
	print!(
		"{}",
		toml::to_string_pretty(&TileRectsTOML {
			pageCount: textures.pages.len(),
			canvasWidth,
			canvasHeight: packing.usedHeight.nextMultipleOf(PAGE_SIZE),
			referenceCount: textures.tileRects.len(),
			placements: Vec::from_iter(
				tileRects.into_iter().zip(packing.positions).map(|(tile, position)| Placement { position, tile })
			),
		})?,
	);
	Ok(())
}
