//! Forward-only little-endian reads over an in-memory level file, plus zlib inflation of the
//! size-prefixed chunks both level formats use.

use {
	crate::{Error, Result},
	byteorder::{ReadBytesExt, LE},
	flate2::read::ZlibDecoder,
	std::io::{self, Read},
};

pub type Cursor<'a> = io::Cursor<&'a [u8]>;

/// Integer types a count prefix can be stored as.
pub trait CountPrefix {
	fn readCount(cursor: &mut Cursor<'_>) -> Result<usize>;
}
impl CountPrefix for u16 {
	fn readCount(cursor: &mut Cursor<'_>) -> Result<usize> {
		Ok(cursor.read_u16::<LE>()? as _)
	}
}
impl CountPrefix for u32 {
	fn readCount(cursor: &mut Cursor<'_>) -> Result<usize> {
		Ok(cursor.read_u32::<LE>()? as _)
	}
}
impl CountPrefix for i16 {
	fn readCount(cursor: &mut Cursor<'_>) -> Result<usize> {
		let count = cursor.read_i16::<LE>()?;
		usize::try_from(count).map_err(|_| Error::malformed(format!("negative count {count}")))
	}
}
impl CountPrefix for i32 {
	fn readCount(cursor: &mut Cursor<'_>) -> Result<usize> {
		let count = cursor.read_i32::<LE>()?;
		usize::try_from(count).map_err(|_| Error::malformed(format!("negative count {count}")))
	}
}

pub trait ReadExt<'a> {
	fn remaining(&self) -> usize;
	fn readBytes(&mut self, len: usize) -> Result<&'a [u8]>;
	fn readArray<const N: usize>(&mut self) -> Result<[u8; N]>;
	fn skip(&mut self, len: usize) -> Result<()>;

	/// Reads a count prefix and checks that `count` elements of `elementSize` bytes can still
	/// follow; a larger count is treated as corruption rather than trusted.
	fn readCount<C: CountPrefix>(&mut self, elementSize: usize) -> Result<usize>;

	fn skipCounted<C: CountPrefix>(&mut self, elementSize: usize) -> Result<usize> {
		let count = self.readCount::<C>(elementSize)?;
		self.skip(count * elementSize)?;
		Ok(count)
	}

	fn readAsciiString(&mut self, len: usize) -> Result<&'a str> {
		let bytes = self.readBytes(len)?;
		if !bytes.is_ascii() {
			return Err(Error::malformed("non-ASCII string"));
		}
		core::str::from_utf8(bytes).map_err(|err| Error::malformed(err.to_string()))
	}

	fn readMarker(&mut self, expected: &str) -> Result<()> {
		let found = self.readAsciiString(expected.len())?;
		if found == expected {
			Ok(())
		} else {
			Err(Error::malformed(format!("expected marker {expected:?}, found {found:?}")))
		}
	}
}

impl<'a> ReadExt<'a> for Cursor<'a> {
	#[inline]
	fn remaining(&self) -> usize {
		self.get_ref().len().saturating_sub(self.position() as usize)
	}

	fn readBytes(&mut self, len: usize) -> Result<&'a [u8]> {
		if len > self.remaining() {
			return Err(Error::malformed(format!(
				"unexpected end of stream: need {len} bytes at offset {}, have {}",
				self.position(),
				self.remaining(),
			)));
		}
		let position = self.position() as usize;
		self.set_position((position + len) as _);
		let underlyingSlice: &'a [u8] = *(self.get_ref());
		Ok(&underlyingSlice[position..position + len])
	}

	fn readArray<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut array = [0; N];
		array.copy_from_slice(self.readBytes(N)?);
		Ok(array)
	}

	#[inline]
	fn skip(&mut self, len: usize) -> Result<()> {
		self.readBytes(len).map(drop)
	}

	fn readCount<C: CountPrefix>(&mut self, elementSize: usize) -> Result<usize> {
		let count = C::readCount(self)?;
		if count.saturating_mul(elementSize) > self.remaining() {
			return Err(Error::malformed(format!(
				"declared count {count} (x{elementSize} bytes) exceeds the {} remaining bytes",
				self.remaining(),
			)));
		}
		Ok(count)
	}
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
	decompressWithCapacity(bytes, bytes.len() * 2)
}

fn decompressWithCapacity(bytes: &[u8], capacity: usize) -> Result<Vec<u8>> {
	let mut inflated = Vec::with_capacity(capacity);
	ZlibDecoder::new(bytes)
		.read_to_end(&mut inflated)
		.map_err(|err| Error::malformed(format!("zlib: {err}")))?;
	Ok(inflated)
}

/// `u32 uncompressedSize, u32 compressedSize, compressed bytes`.
pub fn readCompressedChunk(cursor: &mut Cursor<'_>) -> Result<Vec<u8>> {
	let uncompressedSize = cursor.read_u32::<LE>()? as usize;
	let compressedSize = cursor.read_u32::<LE>()? as usize;
	let inflated = decompressWithCapacity(cursor.readBytes(compressedSize)?, uncompressedSize)?;
	if inflated.len() != uncompressedSize {
		return Err(Error::malformed(format!(
			"chunk inflated to {} bytes, header declares {uncompressedSize}",
			inflated.len(),
		)));
	}
	Ok(inflated)
}
