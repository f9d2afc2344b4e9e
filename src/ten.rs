//! Next-gen `.ten` levels: a small header followed by a zlib-compressed media section (PNG
//! textures, sky, sounds) and a zlib-compressed geometry section.
//!
//! Both sections are plain forward scans. Nearly everything in them is skipped, so each skipped
//! record has to be consumed at its exact width or every later read lands in the wrong place.

use {
	crate::{
		cursor::{readCompressedChunk, Cursor, ReadExt},
		decodePagePNG,
		pipeline::{CancelToken, LevelTextures},
		pool::ArrayPool,
		repack::TileRect,
		Error, Page, Result,
	},
	byteorder::{ReadBytesExt, LE},
	const_format::formatcp,
	glam::Vec2,
	log::{debug, info},
};

pub const MAGIC: &str = "TEN\0";
pub const MINIMUM_VERSION: [u8; 4] = [1, 0, 0, 0];
const MINIMUM_VERSION_STRING: &str =
	formatcp!("{}.{}.{}.{}", MINIMUM_VERSION[0], MINIMUM_VERSION[1], MINIMUM_VERSION[2], MINIMUM_VERSION[3]);

/// Texture categories in stream order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Category {
	Room,
	Object,
	Static,
	Animated,
	Sprite,
}
const CATEGORIES: [Category; 5] = [Category::Room, Category::Object, Category::Static, Category::Animated, Category::Sprite];

/// Width, height, PNG size, normal-map flag.
const TEXTURE_HEADER_SIZE: usize = 3 * 4 + 1;
const SAMPLE_HEADER_SIZE: usize = 2 * 4;
const ROOM_POSITION_SIZE: usize = 4 * 4;
const VERTEX_SIZE: usize = 9 * 4;
/// Texture, blend mode, animated flag, polygon count.
const BUCKET_HEADER_SIZE: usize = 4 + 1 + 1 + 4;
/// Vertex index, UV, then normal, tangent and binormal.
const CORNER_SIZE: usize = 4 + 2 * 4 + 9 * 4;
const PORTAL_SIZE: usize = 64;
const FLOOR_CELL_SIZE: usize = 32;
const LIGHT_SIZE: usize = 60;

fn versionString(version: [u8; 4]) -> String {
	version.map(|part| part.to_string()).join(".")
}

pub fn readLevel(level: &[u8], pool: &ArrayPool, cancel: &CancelToken) -> Result<LevelTextures> {
	let cursor = &mut Cursor::new(level);
	if cursor.readBytes(MAGIC.len()).ok() != Some(MAGIC.as_bytes()) {
		return Err(Error::unsupportedFormat("ten", "missing TEN signature"));
	}
	let version = cursor.readArray::<4>()?;
	if version < MINIMUM_VERSION {
		return Err(Error::UnsupportedVersion {
			found: versionString(version),
			minimum: MINIMUM_VERSION_STRING.to_owned(),
		});
	}
	cursor.skip(2 * 4)?;
	let media = readCompressedChunk(cursor)?;
	let geometry = readCompressedChunk(cursor)?;

	let (pages, roomPageCount) = readMedia(&mut Cursor::new(&media[..]), pool, cancel)?;
	let tileRects = readGeometry(&mut Cursor::new(&geometry[..]), &pages, roomPageCount, cancel)?;
	info!(
		"TEN {}: {} page(s) ({roomPageCount} room), {} tile reference(s)",
		versionString(version),
		pages.len(),
		tileRects.len(),
	);
	Ok(LevelTextures { pages, tileRects })
}

/// Room pages followed by animated pages, and the number of room pages.
fn readMedia(media: &mut Cursor<'_>, pool: &ArrayPool, cancel: &CancelToken) -> Result<(Vec<Page>, usize)> {
	let (mut roomPages, mut animatedPages) = (Vec::new(), Vec::new());
	for category in CATEGORIES {
		let count = media.readCount::<i32>(TEXTURE_HEADER_SIZE)?;
		for _ in 0..count {
			let declared = [media.read_i32::<LE>()?, media.read_i32::<LE>()?];
			let size = media.readCount::<i32>(1)?;
			let png = media.readBytes(size)?;
			if media.read_u8()? != 0 {
				media.skipCounted::<i32>(1)?;
			}
			let pages = match category {
				Category::Room => &mut roomPages,
				Category::Animated => &mut animatedPages,
				Category::Object | Category::Static | Category::Sprite => continue,
			};
			cancel.check()?;
			let page = decodePagePNG(png, pool)?;
			if page.dimensions() != declared.map(|side| usize::try_from(side).unwrap_or(0)) {
				debug!("{category:?} texture declared as {declared:?}, PNG is {:?}", page.dimensions());
			}
			pages.push(page);
		}
		debug!("{category:?} textures: {count}");
	}
	// sky
	media.skip(2 * 4)?;
	media.skipCounted::<i32>(1)?;
	// sound map
	media.skipCounted::<i32>(2)?;
	let samples = media.readCount::<i32>(SAMPLE_HEADER_SIZE)?;
	for _ in 0..samples {
		media.skip(4)?;
		media.skipCounted::<i32>(1)?;
	}

	let roomPageCount = roomPages.len();
	roomPages.append(&mut animatedPages);
	Ok((roomPages, roomPageCount))
}

fn readGeometry(geometry: &mut Cursor<'_>, pages: &[Page], roomPageCount: usize, cancel: &CancelToken) -> Result<Vec<TileRect>> {
	let mut tileRects = Vec::new();
	let rooms = geometry.readCount::<i32>(ROOM_POSITION_SIZE)?;
	for room in 0..rooms {
		cancel.check()?;
		geometry.skip(ROOM_POSITION_SIZE)?;
		geometry.skipCounted::<i32>(VERTEX_SIZE)?;
		let buckets = geometry.readCount::<i32>(BUCKET_HEADER_SIZE)?;
		for _ in 0..buckets {
			let texture = geometry.read_i32::<LE>()?;
			let _blendMode = geometry.read_u8()?;
			let animated = geometry.read_u8()? != 0;
			let polygons = geometry.readCount::<i32>(4)?;
			let pageIndex = usize::try_from(texture).ok().map(|texture| if animated { texture + roomPageCount } else { texture });
			let page = pageIndex.and_then(|pageIndex| pages.get(pageIndex).map(|page| (pageIndex, page)));
			for _ in 0..polygons {
				let corners = match geometry.read_i32::<LE>()? {
					0 => 4,
					1 => 3,
					shape => return Err(Error::malformed(format!("room {room}: polygon shape {shape}"))),
				};
				let mut uvs = [Vec2::ZERO; 4];
				for uv in &mut uvs[..corners] {
					geometry.skip(4)?;
					*uv = Vec2::new(geometry.read_f32::<LE>()?, geometry.read_f32::<LE>()?);
					geometry.skip(CORNER_SIZE - 3 * 4)?;
				}
				let Some((pageIndex, page)) = page else {
					debug!("room {room}: bucket texture {texture} (animated: {animated}) has no page");
					continue;
				};
				if let Some(tileRect) = polygonTile(&uvs[..corners], pageIndex, page) {
					tileRects.push(tileRect);
				}
			}
		}
		geometry.skipCounted::<i32>(PORTAL_SIZE)?;
		let [xSize, zSize] = [geometry.readCount::<i32>(0)?, geometry.readCount::<i32>(0)?];
		geometry.skip(xSize.saturating_mul(zSize).saturating_mul(FLOOR_CELL_SIZE))?;
		geometry.skipCounted::<i32>(LIGHT_SIZE)?;
	}
	Ok(tileRects)
}

/// Bounding box of normalized UVs scaled to the page's pixels.
fn polygonTile(uvs: &[Vec2], pageIndex: usize, page: &Page) -> Option<TileRect> {
	let scale = Vec2::new(page.width as f32, page.height as f32);
	let pixels = uvs.iter().map(|&uv| (uv * scale).round());
	let (min, max) = pixels.fold((Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)), |(min, max), pixel| {
		(min.min(pixel), max.max(pixel))
	});
	TileRect::fromBounds(
		pageIndex,
		[min.x as i64, min.y as i64],
		[max.x as i64, max.y as i64],
		page.dimensions(),
	)
}


#[cfg(test)]
mod tests {
	use super::{fixtures::*, *};

	fn read(archive: &[u8]) -> Result<LevelTextures> {
		readLevel(archive, &ArrayPool::new(), &CancelToken::new())
	}

	fn standardMedia() -> Vec<u8> {
		media([
			&[texture(256, 256, &png(256, 256, [1, 2, 3, 0xFF]), None)],
			&[texture(64, 64, b"not decoded", Some(&b"normals"[..]))],
			&[],
			&[texture(128, 128, &png(128, 128, [9, 8, 7, 0xFF]), Some(&b"normals"[..]))],
			&[texture(16, 16, b"sprite", None)],
		])
	}

	#[test]
	fn roomAndAnimatedPages_yieldTiles() {
		let buckets = [
			bucket(0, false, &[
				polygon(&[[0.25, 0.0], [0.5, 0.0], [0.5, 0.25], [0.25, 0.25]]),
				polygon(&[[0.0, 0.5], [0.125, 0.5], [0.125, 0.625]]),
				polygon(&[[0.0, 0.0], [0.3, 0.0], [0.3, 0.3], [0.0, 0.3]]),
			]),
			bucket(5, false, &[polygon(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])]),
			bucket(0, true, &[polygon(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])]),
		];
		let level = read(&archive([1, 4, 0, 0], &standardMedia(), &geometry(&buckets))).unwrap();
		assert_eq!(level.pages.len(), 2);
		assert_eq!(level.pages[0].pixel([0, 0]), [1, 2, 3, 0xFF]);
		assert_eq!(level.pages[1].dimensions(), [128, 128]);
		assert_eq!(
			level.tileRects,
			[
				TileRect { pageIndex: 0, x: 64, y: 0, width: 64, height: 64 },
				TileRect { pageIndex: 0, x: 0, y: 128, width: 32, height: 32 },
				TileRect { pageIndex: 1, x: 0, y: 0, width: 128, height: 128 },
			]
		);
	}

	#[test]
	fn unknownPolygonShapes_areMalformed() {
		let mut bad = polygon(&[[0.0, 0.0], [0.5, 0.0], [0.5, 0.5]]);
		bad[..4].copy_from_slice(&7_i32.to_le_bytes());
		let level = archive([1, 0, 0, 0], &standardMedia(), &geometry(&[bucket(0, false, &[bad])]));
		assert!(matches!(read(&level), Err(Error::Malformed(_))));
	}

	#[test]
	fn oldVersions_areRejected() {
		let level = archive([0, 9, 9, 9], &standardMedia(), &geometry(&[]));
		match read(&level) {
			Err(Error::UnsupportedVersion { found, minimum }) => assert_eq!((found.as_str(), minimum.as_str()), ("0.9.9.9", "1.0.0.0")),
			other => panic!("unexpected {other:?}"),
		}
		assert!(matches!(read(b"TR4\0rest"), Err(Error::UnsupportedFormat { .. })));
	}

	#[test]
	fn truncatedMedia_isMalformed() {
		let mut media = standardMedia();
		media.truncate(media.len() - 3);
		assert!(matches!(read(&archive([1, 0, 0, 0], &media, &geometry(&[]))), Err(Error::Malformed(_))));
	}

	#[test]
	fn cancellation_returnsDecodedPages() {
		let pool = ArrayPool::new();
		let cancel = CancelToken::new();
		cancel.cancel();
		let level = archive([1, 0, 0, 0], &standardMedia(), &geometry(&[]));
		assert!(matches!(readLevel(&level, &pool, &cancel), Err(Error::Cancelled)));
		assert_eq!(pool.outstanding(), 0);
	}
}
