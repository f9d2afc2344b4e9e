//! Uncompressed 24-bit TGA 2.0 output, the form level editors import atlases in.

use {
	crate::{Error, Image, Result, BGRA_SIZE, BGR_SIZE},
	byteorder::{WriteBytesExt, LE},
	std::{
		fs::File,
		io::{BufWriter, Write},
		path::Path,
	},
};

const HEADER_SIZE: usize = 18;
const UNCOMPRESSED_TRUECOLOR: u8 = 2;
const BITS_PER_PIXEL: u8 = (BGR_SIZE * 8) as _;
/// Extension offset, developer directory offset, signature.
pub const FOOTER: [u8; 26] = *b"\0\0\0\0\0\0\0\0TRUEVISION-XFILE.\0";

/// Fails without writing anything when a side does not fit the header's 16-bit fields.
pub fn writeTGA<Data: AsRef<[u8]>>(image: &Image<Data>, writer: &mut impl Write) -> Result<()> {
	let (Ok(width), Ok(height)) = (u16::try_from(image.width), u16::try_from(image.height)) else {
		return Err(Error::InvalidUsage("TGA sides are at most 65535 pixels"));
	};
	let mut header = Vec::with_capacity(HEADER_SIZE);
	header.extend_from_slice(&[0, 0, UNCOMPRESSED_TRUECOLOR]);
	header.extend_from_slice(&[0; 5]);
	header.write_u16::<LE>(0)?;
	header.write_u16::<LE>(0)?;
	header.write_u16::<LE>(width)?;
	header.write_u16::<LE>(height)?;
	header.extend_from_slice(&[BITS_PER_PIXEL, 0]);
	writer.write_all(&header)?;

	let row = &mut Vec::with_capacity(image.width * BGR_SIZE);
	for srcRow in image.bytes().chunks_exact(image.stride().max(1)).rev() {
		row.clear();
		for pixel in srcRow.chunks_exact(BGRA_SIZE) {
			row.extend_from_slice(&pixel[..BGR_SIZE]);
		}
		writer.write_all(row)?;
	}
	writer.write_all(&FOOTER)?;
	Ok(())
}

pub fn exportTGA<Data: AsRef<[u8]>>(image: &Image<Data>, path: impl AsRef<Path>) -> Result<()> {
	let writer = &mut BufWriter::new(File::create(path)?);
	writeTGA(image, writer)?;
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn footer_isExact() {
		for dimensions in [[0, 0], [1, 1], [3, 2]] {
			let tga = &mut Vec::new();
			writeTGA(&Image::fromDimensions(dimensions), tga).unwrap();
			assert_eq!(tga.len(), HEADER_SIZE + dimensions[0] * dimensions[1] * BGR_SIZE + FOOTER.len());
			assert_eq!(tga[tga.len() - 26..tga.len() - 18], [0; 8]);
			assert_eq!(&tga[tga.len() - 18..], b"TRUEVISION-XFILE.\0");
		}
	}

	#[test]
	fn rows_areWrittenBottomUpAsBGR() {
		let image = Image::fromRaw(2, 2, (1..=16).collect::<Vec<u8>>()).unwrap();
		let tga = &mut Vec::new();
		writeTGA(&image, tga).unwrap();
		assert_eq!(tga[..HEADER_SIZE], [0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 2, 0, 24, 0]);
		assert_eq!(tga[HEADER_SIZE..HEADER_SIZE + 12], [9, 10, 11, 13, 14, 15, 1, 2, 3, 5, 6, 7]);
	}

	#[test]
	fn oversizedSides_areRejected() {
		for dimensions in [[70_000, 1], [1, 65_536]] {
			let tga = &mut Vec::new();
			assert!(matches!(writeTGA(&Image::fromDimensions(dimensions), tga), Err(Error::InvalidUsage(_))));
			assert!(tga.is_empty());
		}
		let tga = &mut Vec::new();
		writeTGA(&Image::fromWidthHeight(65_535, 1), tga).unwrap();
		assert_eq!(tga[12..14], [0xFF, 0xFF]);
	}

	#[test]
	fn exportTGA_writesAFile() {
		let path = std::env::temp_dir().join(format!("tga_builder_export_{}.tga", std::process::id()));
		exportTGA(&Image::fromWidthHeight(4, 4), &path).unwrap();
		assert_eq!(std::fs::metadata(&path).unwrap().len(), (HEADER_SIZE + 48 + FOOTER.len()) as u64);
		std::fs::remove_file(path).unwrap();
	}
}
