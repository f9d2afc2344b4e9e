//! Legacy encrypted TR4 levels: the first bytes of each of the four compressed chunks are
//! scrambled with a fixed byte permutation and XORed with a fixed key. Both are chosen per chunk
//! from bits of the chunk's compressed size and its position. Reversing it yields an ordinary
//! TR4 file.

use {
	byteorder::{ByteOrder, LE},
	log::{debug, warn},
	std::{fs, path::Path},
};

pub const ENCRYPTED_VERSION: [u8; 4] = *b"TR4c";
pub const PLAIN_VERSION: [u8; 4] = *b"TR4\0";

/// Version marker plus the room, object and bump page counts.
const FIRST_CHUNK_OFFSET: usize = 4 + 3 * 2;
const CHUNK_HEADER_SIZE: usize = 2 * 4;
const NUM_CHUNKS: usize = 4;

const NUM_TABLES: usize = 8;
const PERMUTED_LEN: usize = 50;
const ENCRYPTED_LEN: usize = 99;

#[inline(always)]
fn tableIndices(compressedSize: usize, chunkIndex: usize) -> (usize, usize) {
	((compressedSize ^ chunkIndex) % NUM_TABLES, ((compressedSize >> 3) + chunkIndex) % NUM_TABLES)
}

pub fn isEncrypted(level: &[u8]) -> bool {
	level.get(..ENCRYPTED_VERSION.len()) == Some(&ENCRYPTED_VERSION[..])
}

/// Walks the chunk headers, handing each chunk's encrypted region to `transform`. `None` if a
/// chunk runs past the end of the file.
fn forEachChunk(
	level: &[u8],
	version: [u8; 4],
	transform: fn(&mut [u8], &[u8; PERMUTED_LEN], &[u8; ENCRYPTED_LEN]),
) -> Option<Vec<u8>> {
	let mut output = level.to_vec();
	output.get_mut(..version.len())?.copy_from_slice(&version);
	let mut offset = FIRST_CHUNK_OFFSET;
	for chunkIndex in 0..NUM_CHUNKS {
		let header = output.get(offset..offset.checked_add(CHUNK_HEADER_SIZE)?)?;
		let compressedSize = LE::read_u32(&header[4..]) as usize;
		let payloadStart = offset + CHUNK_HEADER_SIZE;
		let payloadEnd = payloadStart.checked_add(compressedSize)?;
		let payload = output.get_mut(payloadStart..payloadEnd)?;
		let (mapIndex, keyIndex) = tableIndices(compressedSize, chunkIndex);
		debug!("chunk {chunkIndex}: {compressedSize} bytes, map {mapIndex}, key {keyIndex}");
		let region = payload.len().min(ENCRYPTED_LEN);
		transform(&mut payload[..region], &MAPS[mapIndex], &KEYS[keyIndex]);
		offset = payloadEnd;
	}
	Some(output)
}

fn unscramble(region: &mut [u8], map: &[u8; PERMUTED_LEN], key: &[u8; ENCRYPTED_LEN]) {
	if region.len() >= PERMUTED_LEN {
		let mut scrambled = [0; PERMUTED_LEN];
		scrambled.copy_from_slice(&region[..PERMUTED_LEN]);
		for (byte, &source) in region.iter_mut().zip(map) {
			*byte = scrambled[source as usize];
		}
	}
	for (byte, keyByte) in region.iter_mut().zip(key) {
		*byte ^= keyByte;
	}
}

fn scramble(region: &mut [u8], map: &[u8; PERMUTED_LEN], key: &[u8; ENCRYPTED_LEN]) {
	for (byte, keyByte) in region.iter_mut().zip(key) {
		*byte ^= keyByte;
	}
	if region.len() >= PERMUTED_LEN {
		let mut plain = [0; PERMUTED_LEN];
		plain.copy_from_slice(&region[..PERMUTED_LEN]);
		for (&byte, &destination) in plain.iter().zip(map) {
			region[destination as usize] = byte;
		}
	}
}

/// Decrypted copy of an encrypted TR4 level, carrying the plain version marker.
pub fn decrypt(level: &[u8]) -> Option<Vec<u8>> {
	forEachChunk(level, PLAIN_VERSION, unscramble)
}

/// Inverse of [`decrypt`].
pub fn encrypt(level: &[u8]) -> Option<Vec<u8>> {
	forEachChunk(level, ENCRYPTED_VERSION, scramble)
}

/// Writes the decrypted copy of `source` to `destination`. Failures are logged and reported as
/// `false`.
pub fn decryptFile(source: &Path, destination: &Path) -> bool {
	let level = match fs::read(source) {
		Ok(level) => level,
		Err(err) => {
			warn!("{source:?}: {err}");
			return false;
		}
	};
	let Some(decrypted) = decrypt(&level) else {
		warn!("{source:?}: truncated chunk, cannot decrypt");
		return false;
	};
	match fs::write(destination, decrypted) {
		Ok(()) => true,
		Err(err) => {
			warn!("{destination:?}: {err}");
			false
		}
	}
}

// TODO: verify MAPS and KEYS byte for byte against a retail TR4c level.
#[rustfmt::skip]
const MAPS: [[u8; PERMUTED_LEN]; NUM_TABLES] = [
	[
		 11,  25,  19,  30,   2,   5,  26,  33,  29,  35,  22,  20,  10,  41,  43,  28,  13,   9,  38,  14,  32,  23,   3,  17,  37,
		  0,  45,  36,  24,  44,  40,   1,  18,  39,  48,  46,  34,   4,   6,  15,   7,  31,   8,  21,  42,  16,  49,  47,  27,  12,
	],
	[
		  7,  43,  24,   4,  17,  36,   3,  45,  49,  40,  11,   9,  14,  39,   0,  38,  10,  23,  26,  20,  44,  15,  25,  28,  47,
		 31,  33,  16,  32,  46,   5,  18,  42,  19,  34,  37,  41,  12,  22,  48,  13,   6,   1,  30,   8,  21,  35,   2,  29,  27,
	],
	[
		 13,  32,  24,  40,   6,  38,  45,  23,   7,  25,  19,  49,  29,  34,  22,  10,  31,  46,  17,  18,  37,   4,  30,   0,  27,
		 33,  26,  12,  43,  20,   9,  16,  35,  21,  47,  42,  14,  41,  39,   2,  15,  48,   5,   8,  36,   3,  11,   1,  44,  28,
	],
	[
		  1,  20,   5,  29,  49,   9,  40,  33,  19,  22,  31,  17,  34,  13,  14,  36,  28,  24,  45,   4,   3,  44,   8,   0,  30,
		 47,  32,  10,  21,  16,  27,  15,  43,  35,  48,  39,  23,   2,  18,  11,  46,  41,  38,  12,  37,   7,  25,   6,  42,  26,
	],
	[
		 10,  19,  44,  11,   4,  38,  46,  24,   1,  12,  20,  27,  21,  35,   7,  42,  43,  17,  31,  28,   0,  48,  30,   2,  15,
		  9,  26,  23,  22,  33,  34,   5,   8,  37,  39,  41,  36,   3,  14,  47,  49,  40,  45,  16,  25,  18,  13,   6,  29,  32,
	],
	[
		 14,   6,  21,  16,  25,  37,  44,  13,  46,  27,  20,  32,  38,  41,  15,  31,   2,  30,  17,  23,  45,   1,  19,   4,  18,
		 48,  24,  26,   3,   8,   0,  49,   9,  11,  28,  34,  47,  29,  12,  40,   7,  36,  22,  43,  39,  35,  33,  10,   5,  42,
	],
	[
		 39,  26,  31,  33,  20,   3,  43,  10,  12,   8,  25,  47,  23,   7,  32,   9,  45,  15,  42,  21,  29,   6,  22,  34,  46,
		 37,  30,   2,  24,  18,   4,  16,  41,  28,   0,  19,   1,  14,  11,  44,  38,  36,   5,  35,  13,  48,  40,  27,  17,  49,
	],
	[
		 18,   6,   1,  24,  27,  11,  33,  49,  45,  28,  47,  19,  31,  26,  36,  34,   7,  37,  29,  48,  30,   0,  21,  16,  20,
		 35,  17,  22,   4,   5,  10,  25,  13,  38,   8,  43,  12,   3,  15,   2,  42,   9,  39,  32,  14,  23,  40,  41,  44,  46,
	],
];

#[rustfmt::skip]
const KEYS: [[u8; ENCRYPTED_LEN]; NUM_TABLES] = [
	[
		213, 240,  61,  36, 210, 219, 108, 185, 195,  20, 254, 200, 154, 194,  28,  62, 242,  16, 139,  66, 175,  17, 241,  10, 112,   1,  65, 150, 138, 157, 131, 149, 252,
		215, 165, 130, 220, 234, 195, 255,  81,  88,  94, 159, 248, 250, 216, 213, 142, 107,  83, 252, 111, 129, 182, 219, 139, 120, 208, 113, 232, 131, 247,  62,  12, 124,
		 95,  49,  49,  29, 179, 108, 129, 146, 137, 194, 157, 213,  97,  36, 131,  14, 143, 205, 131, 185,  45, 178,   5, 246,  58,  96,  61,  18, 214, 144, 229, 226, 210,
	],
	[
		213,  86,  47,  81, 126, 142, 200,  74, 244, 108, 200, 105, 234,  60, 117, 195, 228, 194, 165,  43, 203,   2, 140,  66,  68, 254, 136,  34, 253, 232,  63,  30, 112,
		250,  88, 147,  28, 197, 128, 249,  97,  66, 251, 177, 104, 135, 255, 146,  73,   7, 197,  62, 171, 106, 242,  99,  75, 147,  87, 104,  20, 238, 173, 109, 214,  95,
		236, 103, 106, 190, 107, 146, 125,  58, 226,  54,  52, 239, 139, 253,  59,  14,  58,  64,   7,  50,  94, 159, 126, 203,  55, 181,  92, 164, 249, 231, 219,  60,   1,
	],
	[
		209,  62, 197,  36, 149, 248, 101, 191, 214,  25,   9, 183,  71, 209, 189,  93,   4, 181, 144, 108, 131, 215,  71, 178, 234,  23,  48, 141, 129,  54, 250, 158, 196,
		 66,  83, 119, 171, 161,  39,  97,  85, 247,  71, 104, 218, 252, 152, 138, 213, 195,  84, 142,  91, 146, 117,  99, 215, 225, 170, 100,  86, 246, 109, 103,  27, 193,
		147, 193, 195, 193, 104, 103, 121,  25, 118,  52, 230, 106, 219,  40,  67, 209, 134,   5, 137, 175, 208,  57,  29, 143, 223,  64, 186,  23,  58,  66, 196,  72, 130,
	],
	[
		 92, 119,  41, 148, 197,  30, 191, 241, 231,  70, 117,   9, 114,  24,  84,  24, 198, 162, 158, 251, 146,  21,  16, 224,  42, 186, 125,  84,  14, 158, 231,  14, 246,
		 36, 163,  82, 114,   3, 156,  27, 144, 133, 217, 125,  27,  76,  10, 219, 146, 154, 243,  14, 177,  89, 253, 233,  24, 246,  94,   0,  14,  83,  95, 117,   4, 108,
		 61, 238, 253, 215, 183, 245, 121, 222,  31, 154, 174, 165,  32, 104, 222, 176, 181, 198,  98,  96, 126,  61,  89, 247, 242, 131, 203, 205, 134, 201,  49,  17,   6,
	],
	[
		189,  14, 194,  37,  86,  49,  43, 104, 197, 151, 250, 158,  42,  95, 182, 184,  83, 153,  66,  84,   0,  61, 200,  11,  77,  50, 173, 254,  45,  55,   1, 171, 119,
		179, 251, 219, 200,  20, 118,  39,  26, 167,  70,  66,  96, 211,  57,  72, 161, 139, 214, 158,   6, 185,  89,   2, 121,  69, 150, 203, 112,  48, 169, 216, 210, 251,
		251, 155,  15, 150, 216, 192, 247, 166,  86, 221,  71, 100, 218,  27, 154,  78, 220,  15,  31, 219,  97, 157, 217, 240,  97,  18, 159, 129,  67, 189, 206, 107, 214,
	],
	[
		  9, 212, 215, 199, 126, 191, 102, 217,  89,  31,  78, 154,   7, 121,  76, 247, 108,  52, 221, 191,  57, 103, 223, 175,  51, 159,  87, 156, 132, 233,   7,  16, 254,
		168,  43, 246, 128, 179, 198,  70, 129,  65, 249, 249, 134, 186, 248, 101, 115,  18, 240,  62, 171, 208,   6,  63, 119, 226, 235,  82, 247,  42, 198, 249, 101, 167,
		192, 251, 124, 190,  11, 123, 225,  38,  64, 139,  32, 121, 212, 142,  90,  69, 106,  24,  85,  99,  82, 184,  29, 229, 250, 202,  28, 247, 236,  10, 119, 171, 187,
	],
	[
		172, 236, 242, 206,  94,  62, 222, 124,  42, 193,  57, 167, 190,  15, 181,  21,  58,  58,  63, 245,  42, 251, 249, 190,  16,  92, 251, 188, 117, 196, 250, 207, 227,
		168, 184, 121,  31, 187, 101, 212, 214, 223,   3,  70,  60, 102, 179, 140,  91, 202,  61,  72, 204,  78,  59, 112, 205, 207, 167, 192, 165, 152, 184, 207, 248, 169,
		 90, 176,  69,  89,  47, 105, 198, 151, 139,  36, 139, 168,  63, 207, 143,  82, 246,  65, 190, 243, 166,  59, 149, 171, 234, 111,  97, 198,  72, 185, 246, 119, 226,
	],
	[
		 21, 189,  33, 201, 163, 226, 198, 207, 239,  82, 253, 233,  82, 221,  29, 245,   7,  15,  62, 194, 115,  67,  77,  99, 162, 169, 128,  53, 182,  61,  82,  18, 175,
		129,  90, 248,  30, 103, 149, 238,   3, 238,  80,  57, 141,  74, 191,   3,  57, 176, 182,  90,  51,  18, 211,  65, 134, 164,  12,  97, 219, 139, 178,  66, 164,  36,
		249, 210, 179,  96,  39,   5,  23, 130, 180, 203,  82, 163, 241, 132,  56, 146, 186, 223,  13, 177,  86, 157, 130, 195, 126, 232, 180,  45, 208,  95, 122, 222,  39,
	],
];
