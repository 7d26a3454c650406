//! Constants mirrored from MeCab C API values and crate-level settings.

/// Node status: normal node defined in a dictionary.
pub const MECAB_NOR_NODE: u8 = 0;
/// Node status: unknown node not defined in any dictionary.
pub const MECAB_UNK_NODE: u8 = 1;
/// Node status: virtual beginning-of-sentence node.
pub const MECAB_BOS_NODE: u8 = 2;
/// Node status: virtual end-of-sentence node.
pub const MECAB_EOS_NODE: u8 = 3;
/// Node status: virtual end of an N-best node list.
pub const MECAB_EON_NODE: u8 = 4;

/// Dictionary type: system dictionary.
pub const MECAB_SYS_DIC: i32 = 0;
/// Dictionary type: user dictionary.
pub const MECAB_USR_DIC: i32 = 1;
/// Dictionary type: unknown-word dictionary.
pub const MECAB_UNK_DIC: i32 = 2;

/// Lattice request: one-best analysis.
pub const MECAB_ONE_BEST: i32 = 1;
/// Lattice request: N-best analysis.
pub const MECAB_NBEST: i32 = 2;
/// Lattice request: partial parsing mode.
pub const MECAB_PARTIAL: i32 = 4;
/// Lattice request: marginal probabilities.
pub const MECAB_MARGINAL_PROB: i32 = 8;
/// Lattice request: alternative results.
pub const MECAB_ALTERNATIVE: i32 = 16;
/// Lattice request: output all morphemes.
pub const MECAB_ALL_MORPHS: i32 = 32;
/// Lattice request: copy the input sentence into the lattice.
pub const MECAB_ALLOCATE_SENTENCE: i32 = 64;

/// Boundary constraint: no constraint at this byte position.
pub const MECAB_ANY_BOUNDARY: i32 = 0;
/// Boundary constraint: a token must begin or end at this byte position.
pub const MECAB_TOKEN_BOUNDARY: i32 = 1;
/// Boundary constraint: this byte position is inside a token.
pub const MECAB_INSIDE_TOKEN: i32 = 2;

/// Largest N accepted for N-best analysis.
pub const MECAB_NBEST_MAX: usize = 512;

/// Environment variable holding an explicit library path.
pub const MECAB_PATH_ENV: &str = "MECAB_PATH";
/// Environment variable holding an explicit dictionary charset.
pub const MECAB_CHARSET_ENV: &str = "MECAB_CHARSET";

/// Program name placed in `argv[0]` when opening a model.
pub(crate) const MECAB_PROGRAM_NAME: &str = "mecab";
