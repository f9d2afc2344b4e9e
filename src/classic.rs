//! Classic engine levels: TR1 (8-bit paletted pages), TR2/TR3 (16-bit 5-5-5-1 pages) and TR4
//! (32-bit pages in zlib chunks, optionally PNG per page, optionally encrypted).
//!
//! Only the texture pages and the faces' texture references matter here. Everything between
//! them is skipped by its declared element count times a fixed record size.

use {
	crate::{
		cursor::{readCompressedChunk, Cursor, ReadExt},
		decodePagePNG, decrypt,
		pipeline::{CancelToken, LevelTextures},
		pool::ArrayPool,
		rentPage,
		repack::TileRect,
		Error, Page, Result, BGRA_SIZE, PAGE_SIZE, X, Y,
	},
	byteorder::{ReadBytesExt, LE},
	log::{debug, info},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
	TR1,
	TR2,
	TR3,
	TR4,
}

const PAGE_AREA: usize = PAGE_SIZE * PAGE_SIZE;
const PALETTE_SIZE: usize = 256 * 3;
const PALETTE16_SIZE: usize = 256 * 4;
const LIGHT_MAP_SIZE: usize = 32 * 256;
const ROOM_INFO_SIZE: usize = 16;
const SECTOR_SIZE: usize = 8;
const PORTAL_SIZE: usize = 32;
const ROOM_SPRITE_SIZE: usize = 4;
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// `u32`-counted sections from floor data through static meshes, as element sizes: floor data,
/// mesh data, mesh pointers, animations, state changes, dispatches, commands, mesh trees, frames,
/// moveables, static meshes.
#[rustfmt::skip]
const TR1_MODEL_SECTIONS: [usize; 11] = [2, 2, 4, 32, 6, 8, 2, 4, 2, 18, 32];
#[rustfmt::skip]
const TR4_MODEL_SECTIONS: [usize; 11] = [2, 2, 4, 40, 6, 8, 2, 4, 2, 18, 32];
/// Sprite textures, sprite sequences, cameras, sound sources.
const TR1_SPRITE_SECTIONS: [usize; 4] = [16, 8, 16, 16];
/// Sprite textures, sprite sequences, cameras, flyby cameras, sound sources.
const TR4_SPRITE_SECTIONS: [usize; 5] = [16, 8, 16, 40, 16];

impl Version {
	pub fn fromMarker(marker: [u8; 4]) -> Option<Self> {
		match u32::from_le_bytes(marker) {
			0x0000_0020 => Some(Self::TR1),
			0x0000_002D => Some(Self::TR2),
			0xFF08_0038 | 0xFF18_0038 | 0xFF18_0034 => Some(Self::TR3),
			_ if marker == decrypt::PLAIN_VERSION => Some(Self::TR4),
			_ => None,
		}
	}

	/// File extensions a level of this version may carry.
	pub fn extensions(self) -> &'static [&'static str] {
		match self {
			Self::TR1 => &["phd", "tub"],
			Self::TR2 | Self::TR3 => &["tr2"],
			Self::TR4 => &["tr4"],
		}
	}

	fn vertexSize(self) -> usize {
		if self == Self::TR1 { 8 } else { 12 }
	}

	fn lightingHeaderSize(self) -> usize {
		match self {
			Self::TR1 => 2,
			Self::TR2 => 6,
			Self::TR3 | Self::TR4 => 4,
		}
	}

	fn lightSize(self) -> usize {
		match self {
			Self::TR1 => 18,
			Self::TR2 | Self::TR3 => 24,
			Self::TR4 => 46,
		}
	}

	fn roomStaticSize(self) -> usize {
		if self == Self::TR1 { 18 } else { 20 }
	}

	/// Alternate room and flags, plus water scheme, reverb and filter from TR3 on.
	fn roomTrailerSize(self) -> usize {
		match self {
			Self::TR1 | Self::TR2 => 4,
			Self::TR3 | Self::TR4 => 7,
		}
	}

	fn objectTextureSize(self) -> usize {
		if self == Self::TR4 { 38 } else { 20 }
	}

	fn zoneSize(self) -> usize {
		if self == Self::TR1 { 12 } else { 20 }
	}
}

/// A textured rectangle or triangle of room geometry.
#[derive(Clone, Copy, Debug)]
struct Face {
	texture: usize,
	corners: usize,
}

#[derive(Clone, Copy, Debug)]
struct ObjectTexture {
	page: usize,
	corners: [[i64; 2]; 4],
}

pub fn readLevel(level: &[u8], extension: &str, pool: &ArrayPool, cancel: &CancelToken) -> Result<LevelTextures> {
	if extension == "tr4" && decrypt::isEncrypted(level) {
		debug!("encrypted TR4, decrypting chunk headers");
		let plain = decrypt::decrypt(level).ok_or_else(|| Error::malformed("encrypted chunk runs past the end of the file"))?;
		return readLevel(&plain, extension, pool, cancel);
	}
	let marker = Cursor::new(level).readArray::<4>()?;
	let version = Version::fromMarker(marker)
		.ok_or_else(|| Error::unsupportedFormat(extension, format!("unknown version marker {marker:02X?}")))?;
	if !version.extensions().contains(&extension) {
		return Err(Error::unsupportedFormat(extension, format!("{version:?} level")));
	}
	let textures = match version {
		Version::TR1 => readTR1(level, pool, cancel),
		Version::TR2 | Version::TR3 => readTR23(level, version, pool, cancel),
		Version::TR4 => readTR4(level, pool, cancel),
	}?;
	info!("{version:?}: {} page(s), {} tile reference(s)", textures.pages.len(), textures.tileRects.len());
	Ok(textures)
}

fn skipSections(cursor: &mut Cursor<'_>, elementSizes: &[usize]) -> Result<()> {
	for &elementSize in elementSizes {
		cursor.skipCounted::<u32>(elementSize)?;
	}
	Ok(())
}

/// Boxes, overlaps, zones and animated textures.
fn skipBoxesThroughAnimatedTextures(cursor: &mut Cursor<'_>, version: Version, boxSize: usize) -> Result<()> {
	let boxes = cursor.skipCounted::<u32>(boxSize)?;
	cursor.skipCounted::<u32>(2)?;
	cursor.skip(boxes * version.zoneSize())?;
	cursor.skipCounted::<u32>(2)?;
	Ok(())
}

fn readRooms(cursor: &mut Cursor<'_>, version: Version, cancel: &CancelToken) -> Result<Vec<Face>> {
	let roomCount = cursor.read_u16::<LE>()?;
	let mut faces = Vec::new();
	for _ in 0..roomCount {
		cancel.check()?;
		readRoom(cursor, version, &mut faces)?;
	}
	debug!("{roomCount} room(s), {} textured face(s)", faces.len());
	Ok(faces)
}

fn readRoom(cursor: &mut Cursor<'_>, version: Version, faces: &mut Vec<Face>) -> Result<()> {
	cursor.skip(ROOM_INFO_SIZE)?;
	let dataWords = cursor.readCount::<u32>(2)?;
	let data = &mut Cursor::new(cursor.readBytes(dataWords * 2)?);
	data.skipCounted::<i16>(version.vertexSize())?;
	for corners in [4, 3] {
		let count = data.readCount::<i16>(corners * 2 + 2)?;
		for _ in 0..count {
			data.skip(corners * 2)?;
			faces.push(Face { texture: (data.read_u16::<LE>()? & 0x7FFF) as _, corners });
		}
	}
	data.skipCounted::<i16>(ROOM_SPRITE_SIZE)?;

	cursor.skipCounted::<u16>(PORTAL_SIZE)?;
	let [zSectors, xSectors] = [cursor.read_u16::<LE>()? as usize, cursor.read_u16::<LE>()? as usize];
	cursor.skip(zSectors * xSectors * SECTOR_SIZE)?;
	cursor.skip(version.lightingHeaderSize())?;
	cursor.skipCounted::<u16>(version.lightSize())?;
	cursor.skipCounted::<u16>(version.roomStaticSize())?;
	cursor.skip(version.roomTrailerSize())
}

#[inline(always)]
fn pixelCoordinate(sub: u8, pixel: u8) -> i64 {
	i64::from(pixel) + i64::from(sub >= 128)
}

fn readObjectTextures(cursor: &mut Cursor<'_>, version: Version) -> Result<Vec<ObjectTexture>> {
	let count = cursor.readCount::<u32>(version.objectTextureSize())?;
	(0..count)
		.map(|_| -> Result<ObjectTexture> {
			cursor.skip(2)?;
			let page = (cursor.read_u16::<LE>()? & 0x7FFF) as usize;
			if version == Version::TR4 {
				cursor.skip(2)?;
			}
			let mut corners = [[0; 2]; 4];
			for corner in &mut corners {
				let [xSub, xPixel, ySub, yPixel] = cursor.readArray()?;
				*corner = [pixelCoordinate(xSub, xPixel), pixelCoordinate(ySub, yPixel)];
			}
			if version == Version::TR4 {
				cursor.skip(16)?;
			}
			Ok(ObjectTexture { page, corners })
		})
		.collect()
}

fn tileRects(faces: &[Face], objectTextures: &[ObjectTexture], pages: &[Page]) -> Vec<TileRect> {
	faces
		.iter()
		.filter_map(|face| {
			let Some(texture) = objectTextures.get(face.texture) else {
				debug!("face references missing object texture {}", face.texture);
				return None;
			};
			let Some(page) = pages.get(texture.page) else {
				debug!("object texture {} references missing page {}", face.texture, texture.page);
				return None;
			};
			let corners = &texture.corners[..face.corners];
			let bound = |axis: usize, pick: fn(i64, i64) -> i64| {
				corners.iter().map(|corner| corner[axis]).reduce(pick).unwrap_or(0)
			};
			let (min, max) = ([bound(X, i64::min), bound(Y, i64::min)], [bound(X, i64::max), bound(Y, i64::max)]);
			TileRect::fromBounds(texture.page, min, max, page.dimensions())
		})
		.collect()
}

fn convertPages<'a>(
	pages: impl Iterator<Item = &'a [u8]>,
	pool: &ArrayPool,
	cancel: &CancelToken,
	convert: impl Fn(&[u8], &mut [u8]),
) -> Result<Vec<Page>> {
	pages
		.map(|src| -> Result<Page> {
			cancel.check()?;
			let mut page = rentPage(pool, PAGE_SIZE, PAGE_SIZE);
			convert(src, &mut page.data);
			Ok(page)
		})
		.collect()
}

/// 6-bit VGA palette as BGRA; index 0 is transparent.
fn readPalette(cursor: &mut Cursor<'_>) -> Result<[[u8; BGRA_SIZE]; 256]> {
	let mut palette = [[0; BGRA_SIZE]; 256];
	for (i, rgb) in cursor.readBytes(PALETTE_SIZE)?.chunks_exact(3).enumerate().skip(1) {
		palette[i] = [(rgb[2] & 0x3F) << 2, (rgb[1] & 0x3F) << 2, (rgb[0] & 0x3F) << 2, 0xFF];
	}
	Ok(palette)
}

fn readTR1(level: &[u8], pool: &ArrayPool, cancel: &CancelToken) -> Result<LevelTextures> {
	let cursor = &mut Cursor::new(level);
	cursor.skip(4)?;
	let pageCount = cursor.readCount::<u32>(PAGE_AREA)?;
	let indexedPages = cursor.readBytes(pageCount * PAGE_AREA)?;
	cursor.skip(4)?;
	let faces = readRooms(cursor, Version::TR1, cancel)?;
	skipSections(cursor, &TR1_MODEL_SECTIONS)?;
	let objectTextures = readObjectTextures(cursor, Version::TR1)?;
	skipSections(cursor, &TR1_SPRITE_SECTIONS)?;
	skipBoxesThroughAnimatedTextures(cursor, Version::TR1, 20)?;
	cursor.skipCounted::<u32>(22)?;
	cursor.skip(LIGHT_MAP_SIZE)?;
	let palette = readPalette(cursor)?;

	let pages = convertPages(indexedPages.chunks_exact(PAGE_AREA), pool, cancel, |indices, bgra| {
		for (pixel, &index) in bgra.chunks_exact_mut(BGRA_SIZE).zip(indices) {
			pixel.copy_from_slice(&palette[index as usize]);
		}
	})?;
	let tileRects = tileRects(&faces, &objectTextures, &pages);
	Ok(LevelTextures { pages, tileRects })
}

#[inline(always)]
fn expand5(channel: u16) -> u8 {
	let channel = (channel & 0x1F) as u8;
	channel << 3 | channel >> 2
}

fn readTR23(level: &[u8], version: Version, pool: &ArrayPool, cancel: &CancelToken) -> Result<LevelTextures> {
	let cursor = &mut Cursor::new(level);
	cursor.skip(4 + PALETTE_SIZE + PALETTE16_SIZE)?;
	let pageCount = cursor.readCount::<u32>(PAGE_AREA * 3)?;
	cursor.skip(pageCount * PAGE_AREA)?;
	let pages16 = cursor.readBytes(pageCount * PAGE_AREA * 2)?;
	let pages = convertPages(pages16.chunks_exact(PAGE_AREA * 2), pool, cancel, |argb1555, bgra| {
		for (pixel, src) in bgra.chunks_exact_mut(BGRA_SIZE).zip(argb1555.chunks_exact(2)) {
			let value = u16::from_le_bytes([src[0], src[1]]);
			let alpha = if value & 0x8000 == 0 { 0 } else { 0xFF };
			pixel.copy_from_slice(&[expand5(value), expand5(value >> 5), expand5(value >> 10), alpha]);
		}
	})?;
	cursor.skip(4)?;
	let faces = readRooms(cursor, version, cancel)?;
	skipSections(cursor, &TR1_MODEL_SECTIONS)?;
	if version == Version::TR3 {
		skipSections(cursor, &TR1_SPRITE_SECTIONS)?;
		skipBoxesThroughAnimatedTextures(cursor, version, 8)?;
	}
	let objectTextures = readObjectTextures(cursor, version)?;
	let tileRects = tileRects(&faces, &objectTextures, &pages);
	Ok(LevelTextures { pages, tileRects })
}

fn skipChunk(cursor: &mut Cursor<'_>) -> Result<()> {
	cursor.skip(4)?;
	cursor.skipCounted::<u32>(1).map(drop)
}

fn readTR4(level: &[u8], pool: &ArrayPool, cancel: &CancelToken) -> Result<LevelTextures> {
	let cursor = &mut Cursor::new(level);
	cursor.skip(4)?;
	let pageCount: usize = (0..3).map(|_| cursor.read_u16::<LE>().map(usize::from)).sum::<Result<_, _>>()?;
	let pageChunk = readCompressedChunk(cursor)?;
	skipChunk(cursor)?;
	skipChunk(cursor)?;
	let levelData = readCompressedChunk(cursor)?;

	let pages = if pageChunk.get(4..4 + PNG_SIGNATURE.len()) == Some(&PNG_SIGNATURE[..]) {
		debug!("TR4 pages stored as PNG");
		let pngs = &mut Cursor::new(&pageChunk[..]);
		(0..pageCount)
			.map(|_| {
				cancel.check()?;
				let len = pngs.readCount::<u32>(1)?;
				decodePagePNG(pngs.readBytes(len)?, pool)
			})
			.collect::<Result<Vec<_>>>()?
	} else {
		let bgraPages = Cursor::new(&pageChunk[..]).readBytes(pageCount * PAGE_AREA * BGRA_SIZE)?;
		convertPages(bgraPages.chunks_exact(PAGE_AREA * BGRA_SIZE), pool, cancel, |src, bgra| bgra.copy_from_slice(src))?
	};

	let data = &mut Cursor::new(&levelData[..]);
	data.skip(4)?;
	let faces = readRooms(data, Version::TR4, cancel)?;
	skipSections(data, &TR4_MODEL_SECTIONS)?;
	data.readMarker("SPR")?;
	skipSections(data, &TR4_SPRITE_SECTIONS)?;
	skipBoxesThroughAnimatedTextures(data, Version::TR4, 8)?;
	data.skip(1)?;
	data.readMarker("TEX")?;
	let objectTextures = readObjectTextures(data, Version::TR4)?;
	let tileRects = tileRects(&faces, &objectTextures, &pages);
	Ok(LevelTextures { pages, tileRects })
}


#[cfg(test)]
mod tests {
	use {
		super::{fixtures::*, *},
		byteorder::WriteBytesExt,
	};

	fn read(level: &[u8], extension: &str) -> Result<LevelTextures> {
		readLevel(level, extension, &ArrayPool::new(), &CancelToken::new())
	}

	fn tile(pageIndex: usize, [x, y]: [usize; 2], [width, height]: [usize; 2]) -> TileRect {
		TileRect { pageIndex, x, y, width, height }
	}

	fn tr1Fixture() -> Vec<u8> {
		let mut indices = vec![1; PAGE_AREA];
		indices[0] = 0;
		indices[PAGE_AREA - 1] = 255;
		let mut palette = [0; PALETTE_SIZE];
		palette[3..6].copy_from_slice(&[63, 32, 0]);
		palette[255 * 3..].copy_from_slice(&[1, 2, 3]);
		let textures = [
			objectTexture(Version::TR1, 0, boxCorners([64, 0], [64, 64])),
			objectTexture(Version::TR1, 0, boxCorners([0, 0], [48, 64])),
			objectTexture(Version::TR1, 3, boxCorners([0, 0], [64, 64])),
		];
		tr1Level(&indices, &[room(Version::TR1, &[0, 1, 2, 7, 0x8000], &[])], &textures, &palette, 0)
	}

	#[test]
	fn tr1_pagesGoThroughThePalette() {
		let level = read(&tr1Fixture(), "phd").unwrap();
		let page = &level.pages[0];
		assert_eq!(page.pixel([0, 0]), [0, 0, 0, 0]);
		assert_eq!(page.pixel([1, 0]), [0, 128, 252, 0xFF]);
		assert_eq!(page.pixel([255, 255]), [12, 8, 4, 0xFF]);
	}

	#[test]
	fn tr1_keepsOnlyValidTiles() {
		// Texture 1 is not a power of two, texture 2 names a missing page, texture 7 does not
		// exist, and 0x8000 masks down to texture 0.
		let level = read(&tr1Fixture(), "tub").unwrap();
		assert_eq!(level.tileRects, [tile(0, [64, 0], [64, 64]), tile(0, [64, 0], [64, 64])]);
	}

	#[test]
	fn tr2_pagesUnpack5551() {
		let mut pages16 = Vec::with_capacity(PAGE_AREA * 2);
		for i in 0..PAGE_AREA {
			let value: u16 = if i == 0 { 0x8000 | 31 << 10 | 16 << 5 | 1 } else { 0x7FFF };
			pages16.write_u16::<LE>(value).unwrap();
		}
		// The rectangle's fourth corner makes it 168 pixels wide; the triangle ignores it.
		let mut corners = boxCorners([32, 32], [32, 32]);
		corners[3] = [0, 200, 0, 200];
		let textures = [objectTexture(Version::TR2, 0, corners)];
		let level = read(&tr2Level(&pages16, &[room(Version::TR2, &[0], &[0])], &textures), "tr2").unwrap();
		assert_eq!(level.pages[0].pixel([0, 0]), [8, 132, 255, 0xFF]);
		assert_eq!(level.pages[0].pixel([1, 0]), [255, 255, 255, 0]);
		assert_eq!(level.tileRects, [tile(0, [32, 32], [32, 32])]);
	}

	#[test]
	fn tr3_readsTexturesAfterBoxesAndZones() {
		let pages16 = vec![0xFF; PAGE_AREA * 2];
		let textures = [
			objectTexture(Version::TR3, 0, boxCorners([0, 64], [64, 64])),
			objectTexture(Version::TR3, 0, boxCorners([128, 0], [128, 128])),
		];
		let level = read(&tr3Level(&pages16, &[room(Version::TR3, &[0], &[1])], &textures, 3), "tr2").unwrap();
		assert_eq!(level.pages[0].pixel([0, 0]), [0xFF; BGRA_SIZE]);
		assert_eq!(level.tileRects, [tile(0, [0, 64], [64, 64]), tile(0, [128, 0], [128, 128])]);
	}

	#[test]
	fn tr1_skipsTwelveByteZonesPerBox() {
		let (indices, palette) = (vec![1; PAGE_AREA], [0x3F; PALETTE_SIZE]);
		let textures = [objectTexture(Version::TR1, 0, boxCorners([32, 32], [32, 32]))];
		let level = read(&tr1Level(&indices, &[room(Version::TR1, &[0], &[])], &textures, &palette, 5), "phd").unwrap();
		assert_eq!(level.pages[0].pixel([7, 7]), [0xFC, 0xFC, 0xFC, 0xFF]);
		assert_eq!(level.tileRects, [tile(0, [32, 32], [32, 32])]);
	}

	#[test]
	fn tr4_readsBGRAPages() {
		let mut pages = vec![0; 2 * PAGE_AREA * BGRA_SIZE];
		pages[PAGE_AREA * BGRA_SIZE..][..4].copy_from_slice(&[1, 2, 3, 4]);
		let textures = [objectTexture(Version::TR4, 1, boxCorners([128, 128], [128, 128]))];
		let level = read(&tr4Level(2, &pages, &[room(Version::TR4, &[0], &[])], &textures), "tr4").unwrap();
		assert_eq!(level.pages.len(), 2);
		assert_eq!(level.pages[1].pixel([0, 0]), [1, 2, 3, 4]);
		assert_eq!(level.tileRects, [tile(1, [128, 128], [128, 128])]);
	}

	#[test]
	fn tr4_readsPNGPages() {
		let png = &mut Vec::new();
		crate::writePNG(&crate::Image::fromRaw(64, 64, [0xC0, 0x80, 0x40, 0xFF].repeat(64 * 64)).unwrap(), &mut *png).unwrap();
		let mut pageChunk = (png.len() as u32).to_le_bytes().to_vec();
		pageChunk.extend_from_slice(png);
		let textures = [
			objectTexture(Version::TR4, 0, boxCorners([0, 0], [64, 64])),
			objectTexture(Version::TR4, 0, boxCorners([64, 0], [64, 64])),
		];
		let level = read(&tr4Level(1, &pageChunk, &[room(Version::TR4, &[0, 1], &[])], &textures), "tr4").unwrap();
		assert_eq!(level.pages[0].dimensions(), [64, 64]);
		assert_eq!(level.pages[0].pixel([5, 5]), [0xC0, 0x80, 0x40, 0xFF]);
		assert_eq!(level.tileRects, [tile(0, [0, 0], [64, 64])]);
	}

	#[test]
	fn encryptedTR4_readsLikeThePlainFile() {
		let pages = vec![7; PAGE_AREA * BGRA_SIZE];
		let textures = [objectTexture(Version::TR4, 0, boxCorners([0, 0], [256, 256]))];
		let plain = tr4Level(1, &pages, &[room(Version::TR4, &[0], &[0])], &textures);
		let encrypted = decrypt::encrypt(&plain).unwrap();
		assert_ne!(encrypted, plain);
		let level = read(&encrypted, "tr4").unwrap();
		assert_eq!(level.tileRects, read(&plain, "tr4").unwrap().tileRects);
		assert_eq!(level.pages[0].pixel([9, 9]), [7; 4]);
		assert!(matches!(read(&encrypted[..20], "tr4"), Err(Error::Malformed(_))));
	}

	#[test]
	fn versionMarkers_mustMatchTheExtension() {
		assert!(matches!(read(&tr1Fixture(), "tr2"), Err(Error::UnsupportedFormat { extension, .. }) if extension == "tr2"));
		assert!(matches!(read(b"TR5\0....", "tr4"), Err(Error::UnsupportedFormat { .. })));
		assert_eq!(Version::fromMarker(0xFF18_0034_u32.to_le_bytes()), Some(Version::TR3));
	}

	#[test]
	fn truncatedLevels_areMalformed() {
		let level = tr1Fixture();
		assert!(matches!(read(&level[..level.len() - 10], "phd"), Err(Error::Malformed(_))));
	}

	#[test]
	fn cancellation_returnsEveryPage() {
		let pool = ArrayPool::new();
		let cancel = CancelToken::new();
		cancel.cancel();
		assert!(matches!(readLevel(&tr1Fixture(), "phd", &pool, &cancel), Err(Error::Cancelled)));
		assert_eq!(pool.outstanding(), 0);
	}
}
