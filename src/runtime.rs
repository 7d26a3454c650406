use std::ffi::CString;
use std::fmt;
use std::iter::FusedIterator;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::ptr;
use std::rc::Rc;

use crate::config::{MecabLatticeHandle, MecabModelHandle, MecabTaggerHandle};
use crate::constants::{
    MECAB_BOS_NODE, MECAB_EOS_NODE, MECAB_NBEST, MECAB_NBEST_MAX, MECAB_PATH_ENV,
    MECAB_PROGRAM_NAME,
};
use crate::constraint::{ConstrainedRequest, Constraint};
use crate::discovery::{library_locators, probe_dictionary_charset, resolve_charset};
use crate::encoding::EncodingBridge;
use crate::error::{MecabError, Result};
use crate::model::{CharType, DictionaryInfo, DictionaryType, Node, NodeStatus};
use crate::native::{
    cstr_bytes, read_lattice_error, read_mecab_error, span_bytes, DynamicLibrary, LoadedLibrary,
    MecabApi, MecabNodeRaw,
};
use crate::options::MecabOptions;
use crate::types::MecabConfig;

/// Handle to a loaded MeCab dynamic library plus resolved function table.
///
/// Cloning is cheap; every clone shares the same loaded library, which stays
/// loaded until the last clone and the last session using it are dropped.
#[derive(Clone)]
pub struct MecabLibrary {
    inner: Rc<LoadedLibrary>,
    path: PathBuf,
}

impl MecabLibrary {
    /// Loads a MeCab dynamic library from an explicit path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = DynamicLibrary::open(&path)?;
        let api = unsafe { MecabApi::load(&library)? };
        tracing::debug!(path = %path.display(), "loaded mecab library");
        Ok(Self::from_loaded(
            LoadedLibrary {
                _library: Some(library),
                api,
            },
            path,
        ))
    }

    /// Loads MeCab through the platform locators (`mecab-config`, the
    /// registry, then well-known file names).
    pub fn load_default() -> Result<Self> {
        Self::resolve(None)
    }

    /// Loads from `MECAB_PATH` if set, otherwise falls back to
    /// [`Self::load_default`].
    pub fn load_from_env_or_default() -> Result<Self> {
        Self::resolve(MecabConfig::from_env().library_path.as_deref())
    }

    pub(crate) fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut errors = Vec::new();

        for locator in library_locators(explicit) {
            let Some(path) = locator.locate() else {
                errors.push(format!("{}: no path", locator.describe()));
                continue;
            };
            match Self::load(&path) {
                Ok(library) => return Ok(library),
                Err(error) => {
                    if path.exists() {
                        tracing::warn!(path = %path.display(), %error, "mecab library present but unusable");
                    } else {
                        tracing::debug!(path = %path.display(), %error, "mecab library candidate rejected");
                    }
                    errors.push(format!("{}: {}", path.display(), error));
                }
            }
        }

        Err(MecabError::LibraryNotFound(format!(
            "set {MECAB_PATH_ENV} to the libmecab path. tried: {}",
            errors.join(" | ")
        )))
    }

    pub(crate) fn from_loaded(loaded: LoadedLibrary, path: PathBuf) -> Self {
        Self {
            inner: Rc::new(loaded),
            path,
        }
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Engine version string, e.g. `0.996`.
    pub fn version(&self) -> String {
        let version = unsafe { (self.inner.api.mecab_version)() };
        String::from_utf8_lossy(&cstr_bytes(version)).into_owned()
    }

    /// Returns whether N-best string output is available.
    pub fn supports_nbest(&self) -> bool {
        self.inner.api.mecab_lattice_nbest_tostr.is_some()
    }

    /// Reads the charset of the engine's default dictionary.
    pub fn probe_charset(&self) -> Result<String> {
        probe_dictionary_charset(&self.inner.api)
    }
}

impl fmt::Debug for MecabLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MecabLibrary")
            .field("path", &self.path)
            .field("supports_nbest", &self.supports_nbest())
            .finish()
    }
}

/// Model, tagger and lattice owned by one session.
struct NativeHandle {
    library: Rc<LoadedLibrary>,
    model: MecabModelHandle,
    tagger: MecabTaggerHandle,
    lattice: MecabLatticeHandle,
}

impl NativeHandle {
    fn open(library: Rc<LoadedLibrary>, args: &[String]) -> Result<Self> {
        let api = library.api;

        let mut owned = Vec::with_capacity(args.len() + 1);
        owned.push(CString::new(MECAB_PROGRAM_NAME)?);
        for arg in args {
            owned.push(CString::new(arg.as_str())?);
        }
        let argc = c_int::try_from(owned.len()).map_err(|_| {
            MecabError::InvalidOptions(format!("too many arguments: {}", owned.len()))
        })?;
        let mut argv: Vec<*mut c_char> = owned
            .iter()
            .map(|arg| arg.as_ptr() as *mut c_char)
            .chain(std::iter::once(ptr::null_mut()))
            .collect();

        let model = unsafe { (api.mecab_model_new)(argc, argv.as_mut_ptr()) };
        if model.is_null() {
            let detail = read_mecab_error(&api, ptr::null_mut())
                .unwrap_or_else(|| format!("engine rejected arguments {args:?}"));
            return Err(MecabError::InvalidOptions(detail));
        }

        let mut handle = Self {
            library,
            model,
            tagger: ptr::null_mut(),
            lattice: ptr::null_mut(),
        };

        handle.tagger = unsafe { (api.mecab_model_new_tagger)(model) };
        if handle.tagger.is_null() {
            let detail = read_mecab_error(&api, ptr::null_mut())
                .unwrap_or_else(|| "engine could not create a tagger".to_string());
            return Err(MecabError::InvalidOptions(detail));
        }

        handle.lattice = unsafe { (api.mecab_model_new_lattice)(model) };
        if handle.lattice.is_null() {
            return Err(MecabError::Analysis(
                "engine could not create a lattice".to_string(),
            ));
        }

        Ok(handle)
    }

    fn api(&self) -> &MecabApi {
        &self.library.api
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        let api = self.library.api;
        unsafe {
            if !self.lattice.is_null() {
                (api.mecab_lattice_destroy)(self.lattice);
            }
            if !self.tagger.is_null() {
                (api.mecab_destroy)(self.tagger);
            }
            if !self.model.is_null() {
                (api.mecab_model_destroy)(self.model);
            }
        }
        self.lattice = ptr::null_mut();
        self.tagger = ptr::null_mut();
        self.model = ptr::null_mut();
    }
}

/// One open MeCab session.
///
/// A session is not `Send`: the engine's tagger and lattice must not be used
/// from two threads. Open one session per thread instead.
///
/// # Examples
/// ```no_run
/// use mecab_rs::Mecab;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut mecab = Mecab::new("-F '%m\\t%f[0]\\n'")?;
/// for node in mecab.parse_to_nodes("卓球なんて死ぬまでの暇つぶしだよ。", None)? {
///     let node = node?;
///     if !node.is_eos() {
///         println!("{}", node.feature);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Mecab {
    handle: Option<NativeHandle>,
    // Sentence and feature buffers referenced by the lattice.
    request: Option<ConstrainedRequest>,
    library: MecabLibrary,
    bridge: EncodingBridge,
    charset: String,
    options: MecabOptions,
}

impl Mecab {
    /// Opens a session from an option string, resolving the library and
    /// charset from `MECAB_PATH`, `MECAB_CHARSET` or the platform defaults.
    pub fn new(options: &str) -> Result<Self> {
        Self::from_config(MecabConfig::default().with_option_string(options)?)
    }

    /// Opens a session from an explicit config.
    pub fn from_config(config: MecabConfig) -> Result<Self> {
        config.options.validate()?;
        let library = MecabLibrary::resolve(config.library_path.as_deref())?;
        Self::with_library(library, config)
    }

    /// Opens a session on an already loaded library.
    ///
    /// `config.library_path` is ignored.
    pub fn with_library(library: MecabLibrary, config: MecabConfig) -> Result<Self> {
        let MecabConfig {
            charset, options, ..
        } = config;
        options.validate()?;
        if options.lattice_level.is_some() {
            tracing::warn!("lattice-level is deprecated, use marginal or nbest instead");
        }

        let charset = resolve_charset(charset.as_deref(), || library.probe_charset())?;
        let bridge = EncodingBridge::for_charset(&charset)?;
        let handle = NativeHandle::open(library.inner.clone(), &options.to_args())?;

        tracing::debug!(
            library = %library.path().display(),
            charset = %charset,
            options = %options,
            "opened mecab session"
        );

        let mecab = Self {
            handle: Some(handle),
            request: None,
            library,
            bridge,
            charset,
            options,
        };
        if let Some(loaded) = mecab.dictionary_charset_mismatch() {
            tracing::warn!(
                session = %mecab.charset,
                dictionary = %loaded,
                "session charset differs from the loaded system dictionary; set MECAB_CHARSET to match"
            );
        }
        Ok(mecab)
    }

    /// Releases the native handle. Later analysis calls fail with
    /// [`MecabError::SessionClosed`]. Calling `close` twice is a no-op.
    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The lattice goes before the buffers it points into.
        drop(handle);
        self.request = None;
        tracing::debug!(library = %self.library.path().display(), "closed mecab session");
    }

    /// Returns whether [`Self::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Charset label resolved for this session, as reported or overridden.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Codec used for this session's text.
    pub fn encoding(&self) -> EncodingBridge {
        self.bridge
    }

    /// Path of the loaded library.
    pub fn library_path(&self) -> &Path {
        self.library.path()
    }

    /// Library this session runs on.
    pub fn library(&self) -> &MecabLibrary {
        &self.library
    }

    /// Options the session was opened with.
    pub fn options(&self) -> &MecabOptions {
        &self.options
    }

    /// Engine version string.
    pub fn version(&self) -> String {
        self.library.version()
    }

    /// Dictionaries loaded by this session, system dictionary first.
    pub fn dictionaries(&self) -> Result<Vec<DictionaryInfo>> {
        let handle = self.open_handle()?;
        let mut dictionaries = Vec::new();
        let mut info = unsafe { (handle.api().mecab_model_dictionary_info)(handle.model) };
        while !info.is_null() {
            let raw = unsafe { &*info };
            dictionaries.push(DictionaryInfo {
                filename: PathBuf::from(
                    String::from_utf8_lossy(&cstr_bytes(raw.filename)).into_owned(),
                ),
                charset: String::from_utf8_lossy(&cstr_bytes(raw.charset)).into_owned(),
                size: raw.size,
                dic_type: DictionaryType::from(raw.dic_type),
                lsize: raw.lsize,
                rsize: raw.rsize,
                version: raw.version,
                position: dictionaries.len(),
            });
            info = raw.next;
        }
        Ok(dictionaries)
    }

    /// Analyzes `text` and returns the engine's formatted output unchanged.
    ///
    /// With `--nbest` greater than one this returns the N-best output.
    pub fn parse_to_string(&mut self, text: &str) -> Result<String> {
        if let Some(nbest) = self.options.nbest.filter(|nbest| *nbest > 1) {
            if self.library.supports_nbest() {
                return self.parse_nbest(nbest, text);
            }
        }
        self.analyze(text, None, false)?;
        let handle = self.open_handle()?;
        let output = unsafe { (handle.api().mecab_lattice_tostr)(handle.lattice) };
        self.read_output(output)
    }

    /// Returns the `n` best analyses of `text` as one formatted string.
    pub fn parse_nbest(&mut self, n: usize, text: &str) -> Result<String> {
        self.open_handle()?;
        if n == 0 || n > MECAB_NBEST_MAX {
            return Err(MecabError::InvalidOptions(format!(
                "nbest must be within 1..={MECAB_NBEST_MAX}, got {n}"
            )));
        }
        let nbest_tostr = self.library.inner.api.mecab_lattice_nbest_tostr.ok_or_else(|| {
            MecabError::Analysis(
                "loaded library does not export mecab_lattice_nbest_tostr".to_string(),
            )
        })?;

        self.analyze(text, None, true)?;
        let handle = self.open_handle()?;
        let output = unsafe { nbest_tostr(handle.lattice, n) };
        self.read_output(output)
    }

    /// Analyzes `text` and returns a lazy walk over the resulting nodes.
    ///
    /// The beginning-of-sentence node is skipped; the walk ends with the
    /// end-of-sentence node. With `--nbest` greater than one the walk goes on
    /// through up to that many paths, each closed by its own end-of-sentence
    /// node. The iterator borrows the session mutably, so the next analysis
    /// can only start once it is dropped.
    pub fn parse_to_nodes(
        &mut self,
        text: &str,
        constraint: Option<&Constraint>,
    ) -> Result<Nodes<'_>> {
        let paths = self.node_paths();
        self.analyze(text, constraint, paths > 1)?;
        let handle = self.open_handle()?;
        let bos = unsafe { (handle.api().mecab_lattice_get_bos_node)(handle.lattice) };
        if bos.is_null() {
            return Err(MecabError::Analysis(
                read_lattice_error(handle.api(), handle.lattice)
                    .unwrap_or_else(|| "lattice has no nodes".to_string()),
            ));
        }
        Ok(Nodes {
            session: self,
            current: bos,
            remaining_paths: paths,
        })
    }

    fn open_handle(&self) -> Result<&NativeHandle> {
        self.handle.as_ref().ok_or(MecabError::SessionClosed)
    }

    // Paths walked by `parse_to_nodes`; best only without `mecab_lattice_next`.
    fn node_paths(&self) -> usize {
        match self.options.nbest {
            Some(nbest) if nbest > 1 && self.library.inner.api.mecab_lattice_next.is_some() => {
                nbest
            }
            _ => 1,
        }
    }

    // Moves the lattice to its next best path and returns that path's BOS node.
    fn next_path(&self) -> *const MecabNodeRaw {
        let (Ok(handle), Some(lattice_next)) =
            (self.open_handle(), self.library.inner.api.mecab_lattice_next)
        else {
            return ptr::null();
        };
        unsafe {
            if lattice_next(handle.lattice) == 0 {
                return ptr::null();
            }
            (handle.api().mecab_lattice_get_bos_node)(handle.lattice)
        }
    }

    /// Charset reported by the loaded system dictionary when it names a
    /// different encoding than the one this session uses.
    pub(crate) fn dictionary_charset_mismatch(&self) -> Option<String> {
        let system = self.dictionaries().ok()?.into_iter().next()?;
        let loaded = EncodingBridge::for_charset(&system.charset).ok()?;
        (loaded != self.bridge).then_some(system.charset)
    }

    fn analyze(
        &mut self,
        text: &str,
        constraint: Option<&Constraint>,
        nbest: bool,
    ) -> Result<()> {
        let request_type = self.options.request_type();
        let handle = self.handle.as_ref().ok_or(MecabError::SessionClosed)?;
        let request = ConstrainedRequest::build(text, constraint, &self.bridge)?;
        let api = handle.api();
        let lattice = handle.lattice;

        // Drop the old buffers only after the lattice stops referencing them.
        unsafe { (api.mecab_lattice_clear)(lattice) };
        let request = self.request.insert(request);
        let sentence = request.sentence();
        unsafe {
            (api.mecab_lattice_set_sentence2)(lattice, sentence.as_ptr().cast(), sentence.len());
            (api.mecab_lattice_set_request_type)(lattice, request_type);
            if nbest {
                (api.mecab_lattice_add_request_type)(lattice, MECAB_NBEST);
            }
            for &(position, boundary) in &request.boundaries {
                (api.mecab_lattice_set_boundary_constraint)(lattice, position, boundary);
            }
            for mark in &request.features {
                (api.mecab_lattice_set_feature_constraint)(
                    lattice,
                    mark.begin,
                    mark.end,
                    mark.feature.as_ptr(),
                );
            }
        }
        tracing::trace!(
            bytes = sentence.len(),
            constrained = request.is_constrained(),
            request_type,
            nbest,
            "parsing lattice"
        );

        let parsed = unsafe { (api.mecab_parse_lattice)(handle.tagger, lattice) };
        if parsed == 0 {
            let detail = read_lattice_error(api, lattice)
                .or_else(|| read_mecab_error(api, handle.tagger))
                .unwrap_or_else(|| "engine reported a failed analysis".to_string());
            return Err(MecabError::Analysis(detail));
        }
        Ok(())
    }

    fn read_output(&self, output: *const c_char) -> Result<String> {
        let handle = self.open_handle()?;
        if output.is_null() {
            return Err(MecabError::Analysis(
                read_lattice_error(handle.api(), handle.lattice)
                    .unwrap_or_else(|| "engine returned no output".to_string()),
            ));
        }
        self.bridge.from_engine_bytes(&cstr_bytes(output))
    }

    fn read_node(&self, raw: &MecabNodeRaw) -> Result<Node> {
        let handle = self.open_handle()?;
        let surface = self
            .bridge
            .from_engine_bytes(&unsafe { span_bytes(raw.surface, usize::from(raw.length)) })?;

        let feature = if self.options.formats_node_feature() {
            let formatted = unsafe { (handle.api().mecab_format_node)(handle.tagger, raw) };
            if formatted.is_null() {
                return Err(MecabError::Analysis(
                    read_mecab_error(handle.api(), handle.tagger)
                        .unwrap_or_else(|| "engine could not format node".to_string()),
                ));
            }
            let mut bytes = cstr_bytes(formatted);
            while matches!(bytes.last(), Some(b'\n' | b'\r')) {
                bytes.pop();
            }
            bytes
        } else {
            cstr_bytes(raw.feature)
        };

        Ok(Node {
            surface,
            feature: self.bridge.from_engine_bytes(&feature)?,
            id: raw.id,
            length: raw.length,
            rlength: raw.rlength,
            rcattr: raw.rc_attr,
            lcattr: raw.lc_attr,
            posid: raw.posid,
            char_type: CharType::from(raw.char_type),
            status: NodeStatus::from_raw(raw.stat),
            is_best: raw.isbest == 1,
            alpha: raw.alpha,
            beta: raw.beta,
            prob: raw.prob,
            wcost: raw.wcost,
            cost: i64::from(raw.cost),
        })
    }
}

impl Drop for Mecab {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Mecab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mecab")
            .field("library", &self.library.path())
            .field("charset", &self.charset)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Single-pass walk over the nodes of one analysis.
///
/// Produced by [`Mecab::parse_to_nodes`]. Each item is decoded when it is
/// reached; a decoding failure is yielded once and ends the walk.
pub struct Nodes<'a> {
    session: &'a Mecab,
    current: *const MecabNodeRaw,
    remaining_paths: usize,
}

impl Nodes<'_> {
    fn advance_path(&mut self) -> *const MecabNodeRaw {
        if self.remaining_paths <= 1 {
            return ptr::null();
        }
        self.remaining_paths -= 1;
        self.session.next_path()
    }
}

impl Iterator for Nodes<'_> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.current.is_null() {
            let raw = unsafe { &*self.current };
            if raw.stat == MECAB_BOS_NODE {
                self.current = raw.next;
                continue;
            }

            // Decode before moving on: the next path reuses the lattice.
            let node = self.session.read_node(raw);
            self.current = if node.is_err() {
                ptr::null()
            } else if raw.stat == MECAB_EOS_NODE {
                self.advance_path()
            } else {
                raw.next
            };
            return Some(node);
        }
        None
    }
}

impl FusedIterator for Nodes<'_> {}

impl fmt::Debug for Nodes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nodes")
            .field("exhausted", &self.current.is_null())
            .field("remaining_paths", &self.remaining_paths)
            .finish()
    }
}
