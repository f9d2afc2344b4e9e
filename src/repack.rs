//! Repacking of geometry-referenced tiles into one atlas.
//!
//! Tiles go into rows, tallest first. A tile only lands on an offset that is a multiple of its
//! own width and height, which keeps equally sized tiles on the grid the engine addresses them
//! by. A pass over the pending tiles that places nothing aborts the whole packing; there is no
//! backtracking.

use {
	crate::{Error, Image, Result, UsizeExt, Vec2, Vec2Ext, HEIGHT, MAX_TILE_SIZE, PAGE_SIZE, WIDTH, X, Y},
	core::cmp::max,
	log::{debug, warn},
	serde::Serialize,
	std::collections::HashSet,
};

/// Tiles of this size or smaller are not worth repacking.
pub const TOO_SMALL_TILE_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TileRect {
	pub pageIndex: usize,
	pub x: usize,
	pub y: usize,
	pub width: usize,
	pub height: usize,
}

impl TileRect {
	/// Tile covering the pixel bounds `[min, max)` of a page, if those bounds are power-of-two
	/// sized, larger than [`TOO_SMALL_TILE_SIZE`], at most [`MAX_TILE_SIZE`] and inside the page.
	pub fn fromBounds(pageIndex: usize, min: [i64; 2], max: [i64; 2], pageDimensions: Vec2) -> Option<Self> {
		let [x, y] = [usize::try_from(min[X]).ok()?, usize::try_from(min[Y]).ok()?];
		let [width, height] = [
			usize::try_from(max[X] - min[X]).ok()?,
			usize::try_from(max[Y] - min[Y]).ok()?,
		];
		let isTileSize = |size: usize| size.is_power_of_two() && size > TOO_SMALL_TILE_SIZE && size <= MAX_TILE_SIZE;
		(isTileSize(width)
			&& isTileSize(height)
			&& x + width <= pageDimensions[WIDTH]
			&& y + height <= pageDimensions[HEIGHT])
			.then_some(Self { pageIndex, x, y, width, height })
	}

	#[inline(always)]
	pub fn point(&self) -> Vec2 {
		[self.x, self.y]
	}

	#[inline(always)]
	pub fn dimensions(&self) -> Vec2 {
		[self.width, self.height]
	}
}

/// Distinct tiles in order of first appearance.
pub fn dedup(tileRects: impl IntoIterator<Item = TileRect>) -> Vec<TileRect> {
	let mut seen = HashSet::new();
	tileRects.into_iter().filter(|tileRect| seen.insert(*tileRect)).collect()
}

#[derive(Debug)]
pub struct Packing {
	/// Destination of each input rectangle, in input order.
	pub positions: Vec<Vec2>,
	/// Sum of the row heights.
	pub usedHeight: usize,
}

impl Packing {
	#[inline(always)]
	pub fn height(&self) -> usize {
		self.usedHeight.nextMultipleOf(PAGE_SIZE)
	}
}

pub fn pack(dimensions: &[Vec2], canvasWidth: usize) -> Result<Packing> {
	let mut pending = Vec::from_iter(0..dimensions.len());
	pending.sort_by(|&a, &b| {
		dimensions[b][HEIGHT].cmp(&dimensions[a][HEIGHT]).then(dimensions[b][WIDTH].cmp(&dimensions[a][WIDTH]))
	});
	let (mut positions, mut yOffset) = (vec![[0, 0]; dimensions.len()], 0_usize);
	while !pending.is_empty() {
		let (mut xOffset, mut rowHeight) = (0_usize, 0);
		pending.retain(|&i| {
			let [width, height] = dimensions[i];
			let fits = xOffset + width <= canvasWidth
				&& xOffset.checked_rem(width) == Some(0)
				&& yOffset.checked_rem(height) == Some(0);
			if fits {
				positions[i] = [xOffset, yOffset];
				xOffset += width;
				rowHeight = max(rowHeight, height);
			}
			!fits
		});
		if rowHeight == 0 {
			return Err(Error::Packing { remaining: pending.len(), y: yOffset });
		}
		debug!("row at y = {yOffset}: height {rowHeight}, {} tile(s) left", pending.len());
		yOffset += rowHeight;
	}
	Ok(Packing { positions, usedHeight: yOffset })
}

/// Non-fatal conditions that accompany a finished atlas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AtlasStatus {
	/// The atlas was taller than the maximum bitmap height and got cut off.
	pub spaceInsufficient: bool,
	/// Page dimensions were not multiples of the page size and got padded.
	pub resized: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Placement {
	pub position: Vec2,
	pub tile: TileRect,
}

#[derive(Debug)]
pub struct Atlas {
	pub image: Image,
	pub status: AtlasStatus,
	/// Empty when whole pages were laid out instead of repacked tiles.
	pub placements: Vec<Placement>,
}

fn capHeight(height: usize, maxHeight: usize, status: &mut AtlasStatus) -> usize {
	if height > maxHeight {
		warn!("atlas needs {height} rows, keeping the first {maxHeight}");
		status.spaceInsufficient = true;
		maxHeight
	} else {
		height
	}
}

/// Packs `tileRects` (already deduplicated) into a `canvasWidth`-wide atlas and copies their
/// pixels over. Tiles whose page does not exist are left blank.
pub fn repack<Data: AsRef<[u8]>>(
	pages: &[Image<Data>],
	tileRects: &[TileRect],
	canvasWidth: usize,
	maxHeight: usize,
) -> Result<Atlas> {
	let packing = pack(&Vec::from_iter(tileRects.iter().map(TileRect::dimensions)), canvasWidth)?;
	let mut status = AtlasStatus::default();
	let height = capHeight(packing.height(), maxHeight, &mut status);
	let mut image = Image::fromWidthHeight(canvasWidth, height);
	let mut placements = Vec::with_capacity(tileRects.len());
	for (&tile, position) in tileRects.iter().zip(packing.positions) {
		if let Some(page) = pages.get(tile.pageIndex) {
			image.blitPixelsRectangle(position, tile.dimensions(), page, tile.point());
		}
		placements.push(Placement { tile, position });
	}
	Ok(Atlas { image, status, placements })
}

/// Whole pages side by side, `columns` per row, each row as tall as its tallest page.
pub fn pagePanel<Data: AsRef<[u8]>>(pages: &[Image<Data>], columns: usize, maxHeight: usize) -> Atlas {
	let columns = max(columns, 1);
	let (mut points, mut rawDimensions) = (Vec::with_capacity(pages.len()), [0, 0]);
	for row in pages.chunks(columns) {
		let mut point = [0, rawDimensions[HEIGHT]];
		for page in row {
			points.push(point);
			point[X] += page.width;
		}
		rawDimensions = [
			max(rawDimensions[WIDTH], point[X]),
			rawDimensions[HEIGHT] + row.iter().map(|page| page.height).max().unwrap_or(0),
		];
	}
	let mut status = AtlasStatus {
		resized: pages.iter().any(|page| page.width % PAGE_SIZE != 0 || page.height % PAGE_SIZE != 0),
		..AtlasStatus::default()
	};
	let width = max(rawDimensions[WIDTH], PAGE_SIZE).nextMultipleOf(PAGE_SIZE);
	let height = capHeight(rawDimensions[HEIGHT].nextMultipleOf(PAGE_SIZE), maxHeight, &mut status);
	let mut image = Image::fromWidthHeight(width, height);
	for (page, point) in pages.iter().zip(points) {
		image.blitPixelsRectangle(point, page.dimensions(), page, [0, 0]);
	}
	debug!("page panel {:?} from {} page(s)", image.dimensions(), pages.len());
	Atlas { image, status, placements: Vec::new() }
}

/// Destination rectangles of two placements intersect.
pub fn overlaps(a: &Placement, b: &Placement) -> bool {
	let [aEnd, bEnd] = [a.position.add(a.tile.dimensions()), b.position.add(b.tile.dimensions())];
	a.position[X] < bEnd[X] && b.position[X] < aEnd[X] && a.position[Y] < bEnd[Y] && b.position[Y] < aEnd[Y]
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::BGRA_SIZE,
		rand::{rngs::StdRng, Rng, SeedableRng},
	};

	fn tile(pageIndex: usize, x: usize, y: usize, size: usize) -> TileRect {
		TileRect { pageIndex, x, y, width: size, height: size }
	}

	fn page(seed: u8) -> Image {
		let mut page = Image::fromWidthHeight(PAGE_SIZE, PAGE_SIZE);
		for (i, pixel) in page.data.chunks_exact_mut(BGRA_SIZE).enumerate() {
			pixel.copy_from_slice(&[seed, (i % PAGE_SIZE) as u8, (i / PAGE_SIZE) as u8, 0xFF]);
		}
		page
	}

	fn randomTiles(rng: &mut StdRng, count: usize) -> Vec<TileRect> {
		Vec::from_iter((0..count).map(|_| {
			let [width, height] = [1 << rng.gen_range(3..=8), 1 << rng.gen_range(3..=8)];
			TileRect {
				pageIndex: rng.gen_range(0..2),
				x: rng.gen_range(0..=PAGE_SIZE - width),
				y: rng.gen_range(0..=PAGE_SIZE - height),
				width,
				height,
			}
		}))
	}

	#[test]
	fn fromBounds_filtersTileSizes() {
		let page = [PAGE_SIZE, PAGE_SIZE];
		assert_eq!(TileRect::fromBounds(1, [64, 0], [128, 32], page), Some(TileRect { pageIndex: 1, x: 64, y: 0, width: 64, height: 32 }));
		assert_eq!(TileRect::fromBounds(0, [0, 0], [48, 64], page), None);
		assert_eq!(TileRect::fromBounds(0, [0, 0], [4, 4], page), None);
		assert_eq!(TileRect::fromBounds(0, [0, 0], [512, 256], [512, 512]), None);
		assert_eq!(TileRect::fromBounds(0, [192, 0], [320, 128], page), None);
		assert_eq!(TileRect::fromBounds(0, [-8, 0], [8, 16], page), None);
		assert_eq!(TileRect::fromBounds(0, [16, 16], [16, 32], page), None);
	}

	#[test]
	fn dedup_keepsFirstOccurrences() {
		let tiles = [tile(0, 0, 0, 64), tile(1, 0, 0, 64), tile(0, 0, 0, 64), tile(0, 64, 0, 64), tile(1, 0, 0, 64)];
		let distinct = dedup(tiles);
		assert_eq!(distinct, [tile(0, 0, 0, 64), tile(1, 0, 0, 64), tile(0, 64, 0, 64)]);
		let packing = pack(&Vec::from_iter(distinct.iter().map(TileRect::dimensions)), PAGE_SIZE).unwrap();
		assert_eq!(packing.positions.len(), distinct.len());
	}

	#[test]
	fn pack_placesTallestRowsFirst() {
		let packing = pack(&[[64, 64], [128, 128], [64, 64], [128, 64], [32, 32]], PAGE_SIZE).unwrap();
		assert_eq!(packing.positions, [[0, 128], [0, 0], [64, 128], [128, 0], [128, 128]]);
		assert_eq!(packing.usedHeight, 192);
		assert_eq!(packing.height(), PAGE_SIZE);
	}

	#[test]
	fn pack_skipsMisalignedOffsets() {
		// x = 96 after the first tile: the 64-wide one waits for the next row, the 32-wide one fits.
		let packing = pack(&[[96, 64], [64, 64], [32, 64]], PAGE_SIZE).unwrap();
		assert_eq!(packing.positions, [[0, 0], [0, 64], [96, 0]]);
		assert_eq!(packing.usedHeight, 128);
	}

	#[test]
	fn pack_failsWhenNothingFits() {
		assert!(matches!(pack(&[[512, 64]], PAGE_SIZE), Err(Error::Packing { remaining: 1, y: 0 })));
		assert!(matches!(pack(&[[64, 64], [0, 8]], PAGE_SIZE), Err(Error::Packing { remaining: 1, y: 64 })));
	}

	#[test]
	fn randomTiles_satisfyPackingInvariants() {
		let rng = &mut StdRng::seed_from_u64(0x7261_6374);
		for round in 0..50 {
			let canvasWidth = PAGE_SIZE * (1 + round % 4);
			let tiles = dedup(randomTiles(rng, 1 + round * 3));
			let pages = [page(1), page(2)];
			let atlas = repack(&pages, &tiles, canvasWidth, usize::MAX).unwrap();
			assert_eq!(atlas.placements.len(), tiles.len());
			assert_eq!(atlas.image.height % PAGE_SIZE, 0);
			let mut bottom = 0;
			for (i, placement) in atlas.placements.iter().enumerate() {
				let ([x, y], tile) = (placement.position, placement.tile);
				assert_eq!(x % tile.width, 0);
				assert_eq!(y % tile.height, 0);
				assert!(x + tile.width <= canvasWidth);
				bottom = max(bottom, y + tile.height);
				for other in &atlas.placements[i + 1..] {
					assert!(!overlaps(placement, other), "{placement:?} overlaps {other:?}");
				}
				assert_eq!(atlas.image.pixel([x, y]), pages[tile.pageIndex].pixel(tile.point()));
				let last = [tile.width - 1, tile.height - 1];
				assert_eq!(atlas.image.pixel(placement.position.add(last)), pages[tile.pageIndex].pixel(tile.point().add(last)));
			}
			assert!(atlas.image.height >= bottom);
		}
	}

	#[test]
	fn repack_capsTheHeight() {
		let tiles = [tile(0, 0, 0, 256), tile(0, 0, 0, 128), tile(1, 0, 0, 256)];
		let atlas = repack(&[page(1), page(2)], &tiles, PAGE_SIZE, PAGE_SIZE).unwrap();
		assert!(atlas.status.spaceInsufficient);
		assert_eq!(atlas.image.dimensions(), [PAGE_SIZE, PAGE_SIZE]);
		assert_eq!(atlas.image.pixel([0, 0]), page(1).pixel([0, 0]));
	}

	#[test]
	fn pagePanel_laysPagesOutInRows() {
		let pages = [page(1), page(2), page(3)];
		let atlas = pagePanel(&pages, 2, usize::MAX);
		assert_eq!(atlas.image.dimensions(), [512, 512]);
		assert_eq!(atlas.image.pixel([256, 0]), pages[1].pixel([0, 0]));
		assert_eq!(atlas.image.pixel([3, 256 + 5]), pages[2].pixel([3, 5]));
		assert_eq!(atlas.status, AtlasStatus::default());
	}

	#[test]
	fn pagePanel_padsOddSizes() {
		let odd = Image::fromWidthHeight(300, 100);
		let atlas = pagePanel(&[odd], 1, usize::MAX);
		assert_eq!(atlas.image.dimensions(), [512, 256]);
		assert!(atlas.status.resized);
	}
}
