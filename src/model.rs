use std::path::PathBuf;

use crate::constants::{
    MECAB_BOS_NODE, MECAB_EON_NODE, MECAB_EOS_NODE, MECAB_NOR_NODE, MECAB_SYS_DIC,
    MECAB_UNK_DIC, MECAB_UNK_NODE, MECAB_USR_DIC,
};

/// Status of a node in the analysis chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Morpheme found in a dictionary.
    Normal,
    /// Morpheme produced by unknown-word processing.
    Unknown,
    /// Virtual beginning-of-sentence node.
    Bos,
    /// Virtual end-of-sentence node.
    Eos,
    /// Virtual end of an N-best list.
    Eon,
}

impl NodeStatus {
    pub(crate) fn from_raw(stat: u8) -> Self {
        match stat {
            MECAB_NOR_NODE => Self::Normal,
            MECAB_UNK_NODE => Self::Unknown,
            MECAB_BOS_NODE => Self::Bos,
            MECAB_EOS_NODE => Self::Eos,
            MECAB_EON_NODE => Self::Eon,
            // Values past EON are not produced by any released engine.
            _ => Self::Unknown,
        }
    }

    /// Returns whether this status marks a sentence boundary rather than a morpheme.
    pub fn is_boundary(self) -> bool {
        matches!(self, Self::Bos | Self::Eos | Self::Eon)
    }
}

/// Character class of a node, as defined by the dictionary's `char.def`.
///
/// Named variants follow the IPA dictionary's numbering; other dictionaries
/// may define extra classes, reported as [`CharType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharType {
    /// `DEFAULT`
    Default,
    /// `SPACE`
    Space,
    /// `KANJI`
    Kanji,
    /// `SYMBOL`
    Symbol,
    /// `NUMERIC`
    Numeric,
    /// `ALPHA`
    Alpha,
    /// `HIRAGANA`
    Hiragana,
    /// `KATAKANA`
    Katakana,
    /// `KANJINUMERIC`
    KanjiNumeric,
    /// `GREEK`
    Greek,
    /// `CYRILLIC`
    Cyrillic,
    /// Dictionary-defined class without a named variant.
    Other(u8),
}

impl From<u8> for CharType {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Default,
            1 => Self::Space,
            2 => Self::Kanji,
            3 => Self::Symbol,
            4 => Self::Numeric,
            5 => Self::Alpha,
            6 => Self::Hiragana,
            7 => Self::Katakana,
            8 => Self::KanjiNumeric,
            9 => Self::Greek,
            10 => Self::Cyrillic,
            other => Self::Other(other),
        }
    }
}

impl From<CharType> for u8 {
    fn from(char_type: CharType) -> Self {
        match char_type {
            CharType::Default => 0,
            CharType::Space => 1,
            CharType::Kanji => 2,
            CharType::Symbol => 3,
            CharType::Numeric => 4,
            CharType::Alpha => 5,
            CharType::Hiragana => 6,
            CharType::Katakana => 7,
            CharType::KanjiNumeric => 8,
            CharType::Greek => 9,
            CharType::Cyrillic => 10,
            CharType::Other(code) => code,
        }
    }
}

/// One node of an analysis, copied out of the engine's lattice.
///
/// Surface and feature are decoded into owned strings when the node is
/// produced, so a `Node` stays valid after the next analysis call.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Surface text of the morpheme (empty for boundary nodes).
    pub surface: String,
    /// Feature string, or the node-format output when one is configured.
    pub feature: String,
    /// Unique node id within the lattice.
    pub id: u32,
    /// Surface length in dictionary-charset bytes.
    pub length: u16,
    /// Surface length including leading whitespace.
    pub rlength: u16,
    /// Right context attribute id.
    pub rcattr: u16,
    /// Left context attribute id.
    pub lcattr: u16,
    /// Part-of-speech id.
    pub posid: u16,
    /// Character class.
    pub char_type: CharType,
    /// Node status.
    pub status: NodeStatus,
    /// Whether this node is on the best path.
    pub is_best: bool,
    /// Forward log summation (marginal mode only).
    pub alpha: f32,
    /// Backward log summation (marginal mode only).
    pub beta: f32,
    /// Marginal probability (marginal mode only).
    pub prob: f32,
    /// Word cost.
    pub wcost: i16,
    /// Accumulated cost from BOS to this node.
    pub cost: i64,
}

impl Node {
    /// Dictionary morpheme.
    pub fn is_normal(&self) -> bool {
        self.status == NodeStatus::Normal
    }

    /// Unknown-word morpheme, including constrained spans.
    pub fn is_unknown(&self) -> bool {
        self.status == NodeStatus::Unknown
    }

    /// Beginning of sentence.
    pub fn is_bos(&self) -> bool {
        self.status == NodeStatus::Bos
    }

    /// End of sentence.
    pub fn is_eos(&self) -> bool {
        self.status == NodeStatus::Eos
    }

    /// End of an N-best list.
    pub fn is_eon(&self) -> bool {
        self.status == NodeStatus::Eon
    }
}

/// Kind of a loaded dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryType {
    /// System dictionary.
    System,
    /// User dictionary.
    User,
    /// Unknown-word dictionary.
    Unknown,
    /// Type code not known to this crate.
    Other(i32),
}

impl From<i32> for DictionaryType {
    fn from(code: i32) -> Self {
        match code {
            MECAB_SYS_DIC => Self::System,
            MECAB_USR_DIC => Self::User,
            MECAB_UNK_DIC => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl DictionaryType {
    /// System dictionary type code.
    pub fn is_system(self) -> bool {
        self == Self::System
    }

    /// User dictionary type code.
    pub fn is_user(self) -> bool {
        self == Self::User
    }

    /// Unknown-word dictionary type code.
    pub fn is_unknown(self) -> bool {
        self == Self::Unknown
    }
}

/// Snapshot of one dictionary in the session's dictionary chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryInfo {
    /// Dictionary file path.
    pub filename: PathBuf,
    /// Charset label the dictionary was compiled with.
    pub charset: String,
    /// Number of entries.
    pub size: u32,
    /// Dictionary type.
    pub dic_type: DictionaryType,
    /// Left attribute size.
    pub lsize: u32,
    /// Right attribute size.
    pub rsize: u32,
    /// Dictionary format version.
    pub version: u16,
    pub(crate) position: usize,
}

impl DictionaryInfo {
    /// Returns whether this is the session's primary (system) dictionary.
    ///
    /// Only the first element of the chain is the system dictionary.
    pub fn is_system(&self) -> bool {
        self.position == 0
    }

    /// Position of this dictionary in the chain.
    pub fn position(&self) -> usize {
        self.position
    }
}
