//! Shared byte-array pool. Arrays are kept per power-of-two size class and handed out as
//! [`PooledBuffer`]s, which go back to their class when dropped, so every rent is paired with
//! exactly one return.

use {
	array_macro::array,
	core::{
		fmt,
		ops::{Deref, DerefMut},
	},
	std::sync::{Arc, Mutex, MutexGuard, PoisonError},
};

const NUM_SIZE_CLASSES: usize = usize::BITS as _;
/// Returned arrays beyond this many per size class are freed instead of kept.
pub const MAX_RETAINED_PER_CLASS: usize = 4;

struct Shelves {
	freeLists: [Vec<Vec<u8>>; NUM_SIZE_CLASSES],
	outstanding: usize,
}

#[derive(Clone)]
pub struct ArrayPool(Arc<Mutex<Shelves>>);

impl Default for ArrayPool {
	fn default() -> Self {
		Self(Arc::new(Mutex::new(Shelves { freeLists: array![Vec::new(); NUM_SIZE_CLASSES], outstanding: 0 })))
	}
}

#[inline(always)]
fn sizeClass(len: usize) -> usize {
	len.max(1).next_power_of_two().trailing_zeros() as _
}

impl ArrayPool {
	pub fn new() -> Self {
		Self::default()
	}

	fn shelves(&self) -> MutexGuard<'_, Shelves> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Zero-filled buffer of exactly `len` visible bytes, backed by an array of the next
	/// power-of-two size.
	pub fn rent(&self, len: usize) -> PooledBuffer {
		let class = sizeClass(len);
		let array = {
			let mut shelves = self.shelves();
			shelves.outstanding += 1;
			shelves.freeLists[class].pop()
		};
		let array = match array {
			Some(mut array) => {
				array[..len].fill(0);
				array
			}
			None => vec![0; 1 << class],
		};
		PooledBuffer { array, len, pool: self.clone() }
	}

	/// Buffers rented and not yet returned.
	pub fn outstanding(&self) -> usize {
		self.shelves().outstanding
	}

	/// Returned arrays kept for reuse.
	pub fn retained(&self) -> usize {
		self.shelves().freeLists.iter().map(Vec::len).sum()
	}

	/// Drops every retained array.
	pub fn trim(&self) {
		for freeList in &mut self.shelves().freeLists {
			*freeList = Vec::new();
		}
	}

	fn giveBack(&self, array: Vec<u8>) {
		let mut shelves = self.shelves();
		shelves.outstanding -= 1;
		let freeList = &mut shelves.freeLists[sizeClass(array.len())];
		if freeList.len() < MAX_RETAINED_PER_CLASS {
			freeList.push(array);
		}
	}
}

impl fmt::Debug for ArrayPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ArrayPool")
			.field("outstanding", &self.outstanding())
			.field("retained", &self.retained())
			.finish()
	}
}

pub struct PooledBuffer {
	array: Vec<u8>,
	len: usize,
	pool: ArrayPool,
}

impl PooledBuffer {
	/// Size of the backing array, which is what the pool accounts for.
	#[inline(always)]
	pub fn capacity(&self) -> usize {
		self.array.len()
	}
}

impl Deref for PooledBuffer {
	type Target = [u8];
	#[inline(always)]
	fn deref(&self) -> &[u8] {
		&self.array[..self.len]
	}
}
impl DerefMut for PooledBuffer {
	#[inline(always)]
	fn deref_mut(&mut self) -> &mut [u8] {
		&mut self.array[..self.len]
	}
}
impl AsRef<[u8]> for PooledBuffer {
	#[inline(always)]
	fn as_ref(&self) -> &[u8] {
		self
	}
}
impl AsMut<[u8]> for PooledBuffer {
	#[inline(always)]
	fn as_mut(&mut self) -> &mut [u8] {
		self
	}
}

impl fmt::Debug for PooledBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PooledBuffer").field("len", &self.len).field("capacity", &self.capacity()).finish()
	}
}

impl Drop for PooledBuffer {
	fn drop(&mut self) {
		self.pool.giveBack(core::mem::take(&mut self.array));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rent_roundsUpToAPowerOfTwo() {
		let pool = ArrayPool::new();
		let buffer = pool.rent(1000);
		assert_eq!(buffer.len(), 1000);
		assert_eq!(buffer.capacity(), 1024);
		assert_eq!(pool.outstanding(), 1);
	}

	#[test]
	fn droppedBuffers_areReused() {
		let pool = ArrayPool::new();
		{
			let mut buffer = pool.rent(64);
			buffer.fill(0xAB);
		}
		assert_eq!((pool.outstanding(), pool.retained()), (0, 1));
		let buffer = pool.rent(40);
		assert_eq!(buffer.capacity(), 64);
		assert!(buffer.iter().all(|&byte| byte == 0));
		assert_eq!(pool.retained(), 0);
	}

	#[test]
	fn retention_isCappedPerSizeClass() {
		let pool = ArrayPool::new();
		let buffers = Vec::from_iter((0..MAX_RETAINED_PER_CLASS + 3).map(|_| pool.rent(64)));
		let other = pool.rent(8);
		drop(buffers);
		assert_eq!((pool.outstanding(), pool.retained()), (1, MAX_RETAINED_PER_CLASS));
		drop(other);
		assert_eq!((pool.outstanding(), pool.retained()), (0, MAX_RETAINED_PER_CLASS + 1));
	}

	#[test]
	fn sizeClasses_doNotMix() {
		let pool = ArrayPool::new();
		drop(pool.rent(16));
		let buffer = pool.rent(17);
		assert_eq!(buffer.capacity(), 32);
		assert_eq!(pool.retained(), 1);
		drop(buffer);
		pool.trim();
		assert_eq!(pool.retained(), 0);
	}
}
