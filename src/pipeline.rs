//! From a level path to an atlas: format lookup by extension, reading, tile dedup, and either
//! repacking or the whole-page panel.

use {
	crate::{
		classic,
		config::Config,
		pool::ArrayPool,
		repack::{self, Atlas, AtlasStatus, TileRect},
		ten, tga,
		undo::{Snapshot, UndoRedoManager},
		Error, Image, Page, Result,
	},
	log::{info, warn},
	std::{
		fs,
		path::Path,
		sync::{
			atomic::{AtomicBool, Ordering},
			Arc,
		},
	},
};

/// Cooperative cancellation flag, shared between the loading thread and whoever may cancel.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	pub fn isCancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}

	pub fn check(&self) -> Result<()> {
		if self.isCancelled() { Err(Error::Cancelled) } else { Ok(()) }
	}
}

/// What a level reader hands over: BGRA pages and every textured face's tile, duplicates included.
#[derive(Debug)]
pub struct LevelTextures {
	pub pages: Vec<Page>,
	pub tileRects: Vec<TileRect>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
	Classic,
	NextGen,
}

pub const FORMATS: [(&str, Format); 5] = [
	("phd", Format::Classic),
	("tub", Format::Classic),
	("tr2", Format::Classic),
	("tr4", Format::Classic),
	("ten", Format::NextGen),
];

/// Cancellation is an outcome of its own rather than an error.
#[derive(Debug)]
pub enum LoadOutcome<T> {
	Loaded(T),
	Cancelled,
}

impl<T> LoadOutcome<T> {
	fn fromResult(result: Result<T>) -> Result<Self> {
		match result {
			Ok(loaded) => Ok(Self::Loaded(loaded)),
			Err(Error::Cancelled) => Ok(Self::Cancelled),
			Err(err) => Err(err),
		}
	}
}

/// Lowercased extension of `path` and the format it selects.
pub fn formatOf(path: &Path) -> Result<(String, Format)> {
	let extension = path.extension().and_then(|extension| extension.to_str()).unwrap_or_default().to_ascii_lowercase();
	match FORMATS.iter().find(|(known, _)| *known == extension) {
		Some(&(_, format)) => Ok((extension, format)),
		None => Err(Error::unsupportedFormat(&extension, "not a level file")),
	}
}

pub fn readLevel(level: &[u8], extension: &str, pool: &ArrayPool, cancel: &CancelToken) -> Result<LoadOutcome<LevelTextures>> {
	let format = FORMATS
		.iter()
		.find_map(|&(known, format)| (known == extension).then_some(format))
		.ok_or_else(|| Error::unsupportedFormat(extension, "not a level file"))?;
	LoadOutcome::fromResult(match format {
		Format::Classic => classic::readLevel(level, extension, pool, cancel),
		Format::NextGen => ten::readLevel(level, pool, cancel),
	})
}

pub fn loadLevel(path: &Path, pool: &ArrayPool, cancel: &CancelToken) -> Result<LoadOutcome<LevelTextures>> {
	let (extension, _) = formatOf(path)?;
	let level = fs::read(path)?;
	info!("{path:?}: {} bytes", level.len());
	readLevel(&level, &extension, pool, cancel)
}

/// Deduplicates the level's tiles and packs them, or lays out whole pages when repacking is off
/// or no tile qualified.
pub fn buildAtlas(textures: &LevelTextures, config: &Config) -> Result<Atlas> {
	if textures.pages.is_empty() {
		return Err(Error::malformed("level has no texture pages"));
	}
	let tileRects = repack::dedup(textures.tileRects.iter().copied());
	let atlas = if config.repack && !tileRects.is_empty() {
		info!("repacking {} distinct tile(s) of {}", tileRects.len(), textures.tileRects.len());
		repack::repack(&textures.pages, &tileRects, config.canvasWidth(), config.maxAtlasHeight)?
	} else {
		info!("laying out {} whole page(s)", textures.pages.len());
		repack::pagePanel(&textures.pages, config.panelColumns, config.maxAtlasHeight)
	};
	let AtlasStatus { spaceInsufficient, resized } = atlas.status;
	if spaceInsufficient {
		warn!("atlas cut off at {} rows", config.maxAtlasHeight);
	}
	if resized {
		warn!("pages padded to multiples of the page size");
	}
	Ok(atlas)
}

/// Loads `path` and builds its atlas. The level's pages go back to `pool` before this returns.
pub fn loadAtlas(path: &Path, config: &Config, pool: &ArrayPool, cancel: &CancelToken) -> Result<LoadOutcome<Atlas>> {
	match loadLevel(path, pool, cancel)? {
		LoadOutcome::Loaded(textures) => buildAtlas(&textures, config).map(LoadOutcome::Loaded),
		LoadOutcome::Cancelled => Ok(LoadOutcome::Cancelled),
	}
}

/// An atlas being edited, with its history and the point it was last exported at.
#[derive(Debug)]
pub struct AtlasDocument {
	pub canvas: Image,
	pub status: AtlasStatus,
	pub history: UndoRedoManager,
	saved: Snapshot,
}

impl AtlasDocument {
	pub fn new(atlas: Atlas, config: &Config, pool: ArrayPool) -> Self {
		let history = UndoRedoManager::new(pool, config.undoMemoryBytes);
		let saved = history.snapshot();
		Self { canvas: atlas.image, status: atlas.status, history, saved }
	}

	pub fn undo(&mut self) -> Result<bool> {
		self.history.undo(&mut self.canvas)
	}

	pub fn redo(&mut self) -> Result<bool> {
		self.history.redo(&mut self.canvas)
	}

	pub fn hasUnsavedChanges(&self) -> bool {
		self.history.isChangedSince(&self.saved)
	}

	pub fn exportTGA(&mut self, path: impl AsRef<Path>) -> Result<()> {
		tga::exportTGA(&self.canvas, path)?;
		self.saved = self.history.snapshot();
		Ok(())
	}
}
