#![deny(missing_docs)]

//! Rust bindings for the MeCab morphological analyzer.
//!
//! The MeCab shared library is located and loaded at runtime, so the crate
//! builds without MeCab headers or link-time configuration.
//!
//! ## Quick Start
//! ```no_run
//! use mecab_rs::Mecab;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mecab = Mecab::new("")?;
//!     print!("{}", mecab.parse_to_string("すもももももももものうち")?);
//!
//!     for node in mecab.parse_to_nodes("卓球なんて死ぬまでの暇つぶしだよ。", None)? {
//!         let node = node?;
//!         if !node.is_eos() {
//!             println!("{}\t{}", node.surface, node.feature);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Constraints
//! A single call to [`Mecab::parse_to_nodes`] may carry one [`Constraint`]:
//! either a boundary pattern whose matches become single morphemes, or an
//! ordered list of literal/feature pairs forcing the feature of each match.
//!
//! ```no_run
//! use mecab_rs::{Constraint, Mecab};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mecab = Mecab::new("-F '%m\\t%f[0]\\n'")?;
//!     let constraint = Constraint::features([("ポケモン", "固有名詞")])?;
//!     for node in mecab.parse_to_nodes("ポケモンが好き", Some(&constraint))? {
//!         println!("{}", node?.feature);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Explicit Setup
//! ```no_run
//! use mecab_rs::{Mecab, MecabConfig, MecabOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MecabConfig::default()
//!         .with_library_path("/usr/local/lib/libmecab.so")
//!         .with_charset("EUC-JP")
//!         .with_options(MecabOptions::default().with_nbest(2));
//!     let mut mecab = Mecab::from_config(config)?;
//!     let _ = mecab.parse_to_string("形態素解析の例")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Threads
//! [`Mecab`] is not `Send`. Open one session per thread.
//!
//! ## Environment Variables
//! - `MECAB_PATH`: explicit dynamic library path.
//! - `MECAB_CHARSET`: explicit dictionary charset, skipping the probe.
//!
//! Both are read once, by [`MecabConfig::default`].

mod config;
mod constants;
mod constraint;
mod discovery;
mod encoding;
mod error;
mod model;
mod native;
mod options;
mod runtime;
mod types;

pub use constants::*;
pub use constraint::{BoundaryPattern, Constraint};
pub use encoding::EncodingBridge;
pub use error::{ErrorKind, MecabError, Result};
pub use model::{CharType, DictionaryInfo, DictionaryType, Node, NodeStatus};
pub use options::MecabOptions;
pub use runtime::{Mecab, MecabLibrary, Nodes};
pub use types::MecabConfig;

#[cfg(test)]
mod test_support;
