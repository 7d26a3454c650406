use std::env;
use std::path::{Path, PathBuf};

use crate::constants::{MECAB_CHARSET_ENV, MECAB_PATH_ENV};
use crate::error::Result;
use crate::options::MecabOptions;

/// Settings used to open a [`crate::Mecab`] session.
///
/// [`MecabConfig::default`] reads `MECAB_PATH` and `MECAB_CHARSET` once; the
/// session never consults the environment again.
#[derive(Debug, Clone)]
pub struct MecabConfig {
    /// Explicit library path. When `None` the platform locators are tried.
    pub library_path: Option<PathBuf>,
    /// Explicit dictionary charset. When `None` the default dictionary is probed.
    pub charset: Option<String>,
    /// Options handed to the engine.
    pub options: MecabOptions,
}

impl Default for MecabConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl MecabConfig {
    /// Config with no overrides, ignoring the environment.
    pub fn empty() -> Self {
        Self {
            library_path: None,
            charset: None,
            options: MecabOptions::default(),
        }
    }

    /// Config seeded from `MECAB_PATH` and `MECAB_CHARSET`.
    pub fn from_env() -> Self {
        Self {
            library_path: env::var_os(MECAB_PATH_ENV)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            charset: env::var(MECAB_CHARSET_ENV)
                .ok()
                .filter(|charset| !charset.trim().is_empty()),
            options: MecabOptions::default(),
        }
    }

    /// Sets the library path.
    pub fn with_library_path(mut self, library_path: impl AsRef<Path>) -> Self {
        self.library_path = Some(library_path.as_ref().to_path_buf());
        self
    }

    /// Sets the dictionary charset.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets typed options.
    pub fn with_options(mut self, options: MecabOptions) -> Self {
        self.options = options;
        self
    }

    /// Parses and sets an option string.
    pub fn with_option_string(mut self, options: &str) -> Result<Self> {
        self.options = MecabOptions::parse(options)?;
        Ok(self)
    }
}
