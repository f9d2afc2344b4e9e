#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

pub mod classic;
pub mod config;
pub mod cursor;
pub mod decrypt;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod repack;
pub mod ten;
pub mod tga;
pub mod undo;

pub use error::{Error, Result};

use {
	png::{ColorType, Transformations},
	pool::{ArrayPool, PooledBuffer},
	std::{fs::File, io::Write},
};

/// Side of a legacy texture page; atlas widths and heights are multiples of it.
pub const PAGE_SIZE: usize = 256;
pub const MAX_TILE_SIZE: usize = PAGE_SIZE;
pub const BGRA_SIZE: usize = 4;
pub const BGR_SIZE: usize = 3;
pub const FULLY_TRANSPARENT: [u8; BGRA_SIZE] = [0; BGRA_SIZE];

pub type Vec2 = [usize; 2];
pub const X: usize = 0;
pub const Y: usize = 1;
pub const WIDTH: usize = 0;
pub const HEIGHT: usize = 1;

pub trait Vec2Ext {
	fn add(self, other: Vec2) -> Vec2;
	fn area(self) -> usize;
}
impl Vec2Ext for Vec2 {
	#[inline(always)]
	fn add(self, other: Vec2) -> Vec2 {
		[self[X] + other[X], self[Y] + other[Y]]
	}
	#[inline(always)]
	fn area(self) -> usize {
		self[WIDTH] * self[HEIGHT]
	}
}

pub trait UsizeExt {
	fn nextMultipleOf(self, multiple: usize) -> usize;
}
impl UsizeExt for usize {
	#[inline(always)]
	fn nextMultipleOf(self, multiple: usize) -> usize {
		(self + multiple - 1) / multiple * multiple
	}
}

/// BGRA bitmap, rows top to bottom, `width * BGRA_SIZE` bytes per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image<Data = Vec<u8>> {
	pub width: usize,
	pub height: usize,
	pub data: Data,
}

impl Image {
	pub fn fromWidthHeight(width: usize, height: usize) -> Self {
		Self { width, height, data: vec![0; width * height * BGRA_SIZE] }
	}

	pub fn fromDimensions(dimensions: Vec2) -> Self {
		Self::fromWidthHeight(dimensions[WIDTH], dimensions[HEIGHT])
	}
}

impl<Data: AsRef<[u8]>> Image<Data> {
	/// Wraps raw BGRA bytes; `None` when the buffer is too short for the dimensions.
	pub fn fromRaw(width: usize, height: usize, data: Data) -> Option<Self> {
		(data.as_ref().len() >= width * height * BGRA_SIZE).then_some(Self { width, height, data })
	}

	#[inline(always)]
	pub fn stride(&self) -> usize {
		self.width * BGRA_SIZE
	}

	#[inline(always)]
	pub fn dimensions(&self) -> Vec2 {
		[self.width, self.height]
	}

	#[inline(always)]
	pub fn bytes(&self) -> &[u8] {
		&self.data.as_ref()[..self.height * self.stride()]
	}

	pub fn pixel(&self, point: Vec2) -> [u8; BGRA_SIZE] {
		let offset = point[Y] * self.stride() + point[X] * BGRA_SIZE;
		let mut pixel = FULLY_TRANSPARENT;
		pixel.copy_from_slice(&self.data.as_ref()[offset..offset + BGRA_SIZE]);
		pixel
	}

	/// Byte range of `width` pixels of row `y` starting at column `x`, if it lies inside the image.
	#[inline]
	fn rowRange(&self, [x, y]: Vec2, width: usize) -> Option<core::ops::Range<usize>> {
		(x + width <= self.width && y < self.height).then(|| {
			let start = y * self.stride() + x * BGRA_SIZE;
			start..start + width * BGRA_SIZE
		})
	}

	pub fn copyRegion(&self, origin: Vec2, dimensions: Vec2, into: &mut [u8]) {
		let rowLength = dimensions[WIDTH] * BGRA_SIZE;
		for row in 0..dimensions[HEIGHT] {
			let Some(range) = self.rowRange([origin[X], origin[Y] + row], dimensions[WIDTH]) else {
				continue;
			};
			if let Some(destination) = into.get_mut(row * rowLength..(row + 1) * rowLength) {
				destination.copy_from_slice(&self.data.as_ref()[range]);
			}
		}
	}
}

impl<Data: AsRef<[u8]> + AsMut<[u8]>> Image<Data> {
	/// Copies a `dimensions`-sized rectangle row by row. Rows that would leave either image are
	/// skipped.
	pub fn blitPixelsRectangle<Src: AsRef<[u8]>>(
		&mut self,
		destPoint: Vec2,
		dimensions: Vec2,
		srcImage: &Image<Src>,
		srcPoint: Vec2,
	) {
		for row in 0..dimensions[HEIGHT] {
			let (Some(destRange), Some(srcRange)) = (
				self.rowRange([destPoint[X], destPoint[Y] + row], dimensions[WIDTH]),
				srcImage.rowRange([srcPoint[X], srcPoint[Y] + row], dimensions[WIDTH]),
			) else {
				continue;
			};
			self.data.as_mut()[destRange].copy_from_slice(&srcImage.data.as_ref()[srcRange]);
		}
	}

	pub fn writeRegion(&mut self, origin: Vec2, dimensions: Vec2, from: &[u8]) {
		let rowLength = dimensions[WIDTH] * BGRA_SIZE;
		for row in 0..dimensions[HEIGHT] {
			let Some(range) = self.rowRange([origin[X], origin[Y] + row], dimensions[WIDTH]) else {
				continue;
			};
			if let Some(source) = from.get(row * rowLength..(row + 1) * rowLength) {
				self.data.as_mut()[range].copy_from_slice(source);
			}
		}
	}

	pub fn flipHorizontal(&mut self) {
		let stride = self.stride();
		for row in self.data.as_mut()[..self.height * stride].chunks_exact_mut(stride) {
			let (mut left, mut right) = (0, self.width);
			while left + 1 < right {
				right -= 1;
				for channel in 0..BGRA_SIZE {
					row.swap(left * BGRA_SIZE + channel, right * BGRA_SIZE + channel);
				}
				left += 1;
			}
		}
	}

	pub fn flipVertical(&mut self) {
		let (stride, height) = (self.stride(), self.height);
		let data = &mut self.data.as_mut()[..height * stride];
		for y in 0..height / 2 {
			let (top, bottom) = data.split_at_mut((height - 1 - y) * stride);
			top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
		}
	}

	/// Exchanges two equally sized, non-overlapping regions.
	pub fn swapRegions(&mut self, a: Vec2, b: Vec2, dimensions: Vec2) {
		let temporary = &mut vec![0; dimensions.area() * BGRA_SIZE];
		self.copyRegion(a, dimensions, temporary);
		let other = &mut vec![0; temporary.len()];
		self.copyRegion(b, dimensions, other);
		self.writeRegion(a, dimensions, other);
		self.writeRegion(b, dimensions, temporary);
	}
}

impl Image {
	/// Quarter turn; width and height swap.
	#[must_use]
	pub fn rotated(&self, clockwise: bool) -> Self {
		let mut rotated = Self::fromWidthHeight(self.height, self.width);
		for y in 0..self.height {
			for x in 0..self.width {
				let [destX, destY] = if clockwise { [self.height - 1 - y, x] } else { [y, self.width - 1 - x] };
				let dest = destY * rotated.stride() + destX * BGRA_SIZE;
				rotated.data[dest..dest + BGRA_SIZE].copy_from_slice(&self.pixel([x, y]));
			}
		}
		rotated
	}

	/// Anchored at the top-left corner: growing pads with transparent pixels, shrinking crops.
	#[must_use]
	pub fn resized(&self, dimensions: Vec2) -> Self {
		let mut resized = Self::fromDimensions(dimensions);
		resized.blitPixelsRectangle(
			[0, 0],
			[self.width.min(dimensions[WIDTH]), self.height.min(dimensions[HEIGHT])],
			self,
			[0, 0],
		);
		resized
	}

	/// Re-lays out square cells of `cellSize` in row-major order into an image of `dimensions`.
	/// Cells that do not fit the new layout are dropped.
	#[must_use]
	pub fn reflowed(&self, cellSize: usize, dimensions: Vec2) -> Self {
		let mut reflowed = Self::fromDimensions(dimensions);
		let (fromColumns, toColumns) = (self.width / cellSize, dimensions[WIDTH] / cellSize);
		if fromColumns == 0 || toColumns == 0 {
			return reflowed;
		}
		let count = (fromColumns * (self.height / cellSize)).min(toColumns * (dimensions[HEIGHT] / cellSize));
		for i in 0..count {
			reflowed.blitPixelsRectangle(
				[i % toColumns * cellSize, i / toColumns * cellSize],
				[cellSize, cellSize],
				self,
				[i % fromColumns * cellSize, i / fromColumns * cellSize],
			);
		}
		reflowed
	}
}

/// Decoded level texture page, backed by a pooled buffer.
pub type Page = Image<PooledBuffer>;

pub fn rentPage(pool: &ArrayPool, width: usize, height: usize) -> Page {
	Image { width, height, data: pool.rent(width * height * BGRA_SIZE) }
}

/// Decodes a PNG of any colour type into a BGRA page.
pub fn decodePagePNG(bytes: &[u8], pool: &ArrayPool) -> Result<Page> {
	let mut decoder = png::Decoder::new(bytes);
	decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
	let png = &mut decoder.read_info()?;
	let mut vec = vec![0; png.output_buffer_size()];
	let info = png.next_frame(&mut vec)?;
	let [width, height] = [info.width as usize, info.height as usize];
	let channels = match info.color_type {
		ColorType::Grayscale => 1,
		ColorType::GrayscaleAlpha => 2,
		ColorType::Rgb => 3,
		ColorType::Rgba => 4,
		ColorType::Indexed => return Err(Error::malformed("indexed PNG was not expanded")),
	};
	let mut page = rentPage(pool, width, height);
	for (y, row) in vec.chunks_exact(info.line_size).take(height).enumerate() {
		let destRow = &mut page.data[y * width * BGRA_SIZE..(y + 1) * width * BGRA_SIZE];
		for (dest, src) in destRow.chunks_exact_mut(BGRA_SIZE).zip(row.chunks_exact(channels)) {
			dest.copy_from_slice(&match *src {
				[l] => [l, l, l, 0xFF],
				[l, a] => [l, l, l, a],
				[r, g, b] => [b, g, r, 0xFF],
				[r, g, b, a] => [b, g, r, a],
				_ => FULLY_TRANSPARENT,
			});
		}
	}
	Ok(page)
}

/// RGBA PNG of a BGRA image.
pub fn writePNG<Data: AsRef<[u8]>>(image: &Image<Data>, writer: impl Write) -> Result<()> {
	let mut png = png::Encoder::new(writer, image.width as _, image.height as _);
	png.set_color(ColorType::Rgba);
	png.set_depth(png::BitDepth::Eight);
	let mut rgba = image.bytes().to_vec();
	for pixel in rgba.chunks_exact_mut(BGRA_SIZE) {
		pixel.swap(0, 2);
	}
	png.write_header()?.write_image_data(&rgba)?;
	Ok(())
}

#[cfg(unix)]
pub fn stdoutRaw() -> File {
	use std::os::unix::io::FromRawFd;
	unsafe { File::from_raw_fd(1) }
}

#[cfg(windows)]
pub fn stdoutRaw() -> File {
	use std::{
		io,
		os::windows::io::{AsRawHandle, FromRawHandle},
	};
	unsafe { File::from_raw_handle(io::stdout().as_raw_handle()) }
}
