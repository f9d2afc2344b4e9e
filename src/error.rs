use {std::io, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
	#[error("unsupported format: .{extension} ({reason})")]
	UnsupportedFormat { extension: String, reason: String },

	#[error("unsupported version {found} (minimum supported is {minimum})")]
	UnsupportedVersion { found: String, minimum: String },

	#[error("malformed stream: {0}")]
	Malformed(String),

	/// A whole pass over the pending tiles placed nothing.
	#[error("packing failed: {remaining} tile(s) cannot be placed in the row at y = {y}")]
	Packing { remaining: usize, y: usize },

	#[error("cancelled")]
	Cancelled,

	#[error("invalid usage: {0}")]
	InvalidUsage(&'static str),

	#[error(transparent)]
	Io(io::Error),

	#[error("png: {0}")]
	Png(#[from] png::DecodingError),

	#[error("png: {0}")]
	PngEncoding(#[from] png::EncodingError),

	#[error("config: {0}")]
	Config(#[from] toml::de::Error),
}

impl Error {
	pub fn malformed(message: impl Into<String>) -> Self {
		Self::Malformed(message.into())
	}

	pub fn unsupportedFormat(extension: &str, reason: impl Into<String>) -> Self {
		Self::UnsupportedFormat { extension: extension.to_owned(), reason: reason.into() }
	}
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Self {
		match err.kind() {
			io::ErrorKind::UnexpectedEof => Self::malformed("unexpected end of stream"),
			_ => Self::Io(err),
		}
	}
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
