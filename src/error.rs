use thiserror::Error;

/// Error type returned by mecab-rs public APIs.
#[derive(Debug, Error)]
pub enum MecabError {
    /// No candidate path yielded a loadable MeCab library.
    #[error("mecab library not found: {0}")]
    LibraryNotFound(String),
    /// Required symbol could not be resolved from the library.
    #[error("failed to load symbol: {0}")]
    SymbolLoad(String),
    /// The dictionary charset could not be determined or is not supported.
    #[error("dictionary charset unresolved: {0}")]
    CharsetUnresolved(String),
    /// The option string was rejected, either locally or by the engine.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// Text contained characters that the dictionary charset cannot represent.
    #[error("cannot encode text as {charset}: {message}")]
    Encoding {
        /// Charset the text was being encoded into.
        charset: String,
        /// Description of the failure.
        message: String,
    },
    /// Bytes returned by the engine were not valid in the dictionary charset.
    #[error("cannot decode engine output as {charset}: {message}")]
    Decoding {
        /// Charset used for decoding.
        charset: String,
        /// Description of the failure.
        message: String,
    },
    /// A boundary or feature constraint was malformed.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
    /// The engine reported a failed analysis.
    #[error("analysis failed: {0}")]
    Analysis(String),
    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,
    /// Rust string contained an interior `NUL` byte for C interop.
    #[error("string contains NUL byte: {0}")]
    NulByte(#[from] std::ffi::NulError),
}

/// Fieldless classification of [`MecabError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`MecabError::LibraryNotFound`] and [`MecabError::SymbolLoad`].
    LibraryNotFound,
    /// See [`MecabError::CharsetUnresolved`].
    CharsetUnresolved,
    /// See [`MecabError::InvalidOptions`].
    InvalidOptions,
    /// See [`MecabError::Encoding`] and [`MecabError::NulByte`].
    Encoding,
    /// See [`MecabError::Decoding`].
    Decoding,
    /// See [`MecabError::InvalidConstraint`].
    InvalidConstraint,
    /// See [`MecabError::Analysis`].
    Analysis,
    /// See [`MecabError::SessionClosed`].
    SessionClosed,
}

impl MecabError {
    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MecabError::LibraryNotFound(_) | MecabError::SymbolLoad(_) => ErrorKind::LibraryNotFound,
            MecabError::CharsetUnresolved(_) => ErrorKind::CharsetUnresolved,
            MecabError::InvalidOptions(_) => ErrorKind::InvalidOptions,
            MecabError::Encoding { .. } | MecabError::NulByte(_) => ErrorKind::Encoding,
            MecabError::Decoding { .. } => ErrorKind::Decoding,
            MecabError::InvalidConstraint(_) => ErrorKind::InvalidConstraint,
            MecabError::Analysis(_) => ErrorKind::Analysis,
            MecabError::SessionClosed => ErrorKind::SessionClosed,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MecabError>;
