use {
	crate::{Result, PAGE_SIZE},
	serde::{Deserialize, Serialize},
	std::{fs, path::Path},
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
	/// Pack only the tiles the geometry references instead of laying out whole pages.
	pub repack: bool,
	/// Repacked atlas width, in pages.
	pub widthPages: usize,
	/// Pages per row when whole pages are laid out.
	pub panelColumns: usize,
	pub maxAtlasHeight: usize,
	pub undoMemoryBytes: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self { repack: true, widthPages: 1, panelColumns: 1, maxAtlasHeight: 16384, undoMemoryBytes: 256 << 20 }
	}
}

impl Config {
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		Self::parse(&fs::read_to_string(path)?)
	}

	pub fn parse(toml: &str) -> Result<Self> {
		Ok(toml::from_str(toml)?)
	}

	#[inline(always)]
	pub fn canvasWidth(&self) -> usize {
		self.widthPages.max(1) * PAGE_SIZE
	}
}

#[cfg(test)]
mod tests {
	use {super::*, crate::Error};

	#[test]
	fn missingKeys_takeDefaults() {
		let config = Config::parse("widthPages = 4\nrepack = false\n").unwrap();
		assert_eq!(config, Config { widthPages: 4, repack: false, ..Config::default() });
		assert_eq!(config.canvasWidth(), 1024);
		assert_eq!(Config::parse("").unwrap(), Config::default());
	}

	#[test]
	fn badValues_areConfigErrors() {
		assert!(matches!(Config::parse("widthPages = \"wide\""), Err(Error::Config(_))));
	}

	#[test]
	fn serializedDefaults_parseBack() {
		let text = toml::to_string(&Config::default()).unwrap();
		assert_eq!(Config::parse(&text).unwrap(), Config::default());
	}
}
