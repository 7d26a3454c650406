use std::cell::RefCell;
use std::env;
use std::ffi::{CStr, CString, OsString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;
use std::sync::{Mutex, OnceLock};

use crate::config::{MecabLatticeHandle, MecabModelHandle, MecabTaggerHandle};
use crate::constants::{
    MECAB_ANY_BOUNDARY, MECAB_BOS_NODE, MECAB_EOS_NODE, MECAB_INSIDE_TOKEN, MECAB_NBEST,
    MECAB_NOR_NODE, MECAB_SYS_DIC, MECAB_TOKEN_BOUNDARY, MECAB_UNK_NODE, MECAB_USR_DIC,
};
use crate::native::{LoadedLibrary, MecabApi, MecabDictionaryInfoRaw, MecabNodeRaw};
use crate::runtime::MecabLibrary;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn set_env_var(key: &str, value: &str) {
    #[allow(unused_unsafe)]
    unsafe {
        env::set_var(key, value);
    }
}

fn remove_env_var(key: &str) {
    #[allow(unused_unsafe)]
    unsafe {
        env::remove_var(key);
    }
}

/// Runs a closure while holding a global environment lock and applying overrides.
pub(crate) fn with_env_vars<T>(overrides: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    let _guard = env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let backups: Vec<(&str, Option<OsString>)> = overrides
        .iter()
        .map(|(key, _)| (*key, env::var_os(key)))
        .collect();

    for (key, value) in overrides {
        match value {
            Some(value) => set_env_var(key, value),
            None => remove_env_var(key),
        }
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (key, value) in backups.into_iter().rev() {
        match value {
            Some(value) => {
                #[allow(unused_unsafe)]
                unsafe {
                    env::set_var(key, value);
                }
            }
            None => remove_env_var(key),
        }
    }

    match result {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

// In-process engine behind the same function table as libmecab.
//
// Segmentation: runs of ASCII letters become normal nodes, every other
// character becomes its own unknown node. The second best path splits each
// letter run into single letters; there is no third. Boundary and feature
// constraints are honored the way the lattice API describes them. Sentences
// containing BEL (0x07) fail to parse, DEL (0x7F) tokens carry a malformed
// feature, and any model argument containing "/missing" fails to open. State
// is per thread, so parallel tests do not interfere.

const FAKE_VERSION: &[u8] = b"0.996-fake\0";
const FAKE_CHARSET: &[u8] = b"utf8\0";
const FAKE_SYS_DIC: &[u8] = b"/fake/sys.dic\0";
const FEATURE_WORD: &[u8] = b"word,fake\0";
const FEATURE_UNKNOWN: &[u8] = b"unknown,fake\0";
const FEATURE_BOS_EOS: &[u8] = b"BOS/EOS,*\0";
const FEATURE_MALFORMED: &[u8] = b"\xff\xfe,fake\0";

#[derive(Default)]
struct FakeState {
    models: usize,
    taggers: usize,
    lattices: usize,
    parses: usize,
    fail_model: bool,
    last_request_type: i32,
    global_error: Option<CString>,
}

thread_local! {
    static STATE: RefCell<FakeState> = RefCell::new(FakeState::default());
}

fn with_state<T>(f: impl FnOnce(&mut FakeState) -> T) -> T {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Resets the calling thread's fake engine state on creation and on drop.
pub(crate) struct FakeEngine {
    _private: (),
}

impl FakeEngine {
    pub(crate) fn install() -> Self {
        with_state(|state| *state = FakeState::default());
        Self { _private: () }
    }

    pub(crate) fn fail_model_creation(&self, fail: bool) {
        with_state(|state| state.fail_model = fail);
    }

    pub(crate) fn parse_calls(&self) -> usize {
        with_state(|state| state.parses)
    }

    pub(crate) fn last_request_type(&self) -> i32 {
        with_state(|state| state.last_request_type)
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        with_state(|state| *state = FakeState::default());
    }
}

/// Live `(models, taggers, lattices)` on the calling thread.
pub(crate) fn live_handles() -> (usize, usize, usize) {
    with_state(|state| (state.models, state.taggers, state.lattices))
}

pub(crate) fn fake_api() -> MecabApi {
    MecabApi {
        mecab_version: fake_version,
        mecab_strerror: fake_strerror,
        mecab_model_new: fake_model_new,
        mecab_model_destroy: fake_model_destroy,
        mecab_model_new_tagger: fake_model_new_tagger,
        mecab_model_new_lattice: fake_model_new_lattice,
        mecab_model_dictionary_info: fake_model_dictionary_info,
        mecab_destroy: fake_destroy,
        mecab_format_node: fake_format_node,
        mecab_lattice_destroy: fake_lattice_destroy,
        mecab_lattice_clear: fake_lattice_clear,
        mecab_lattice_set_sentence2: fake_lattice_set_sentence2,
        mecab_lattice_set_request_type: fake_lattice_set_request_type,
        mecab_lattice_add_request_type: fake_lattice_add_request_type,
        mecab_lattice_set_boundary_constraint: fake_lattice_set_boundary_constraint,
        mecab_lattice_set_feature_constraint: fake_lattice_set_feature_constraint,
        mecab_parse_lattice: fake_parse_lattice,
        mecab_lattice_tostr: fake_lattice_tostr,
        mecab_lattice_nbest_tostr: Some(fake_lattice_nbest_tostr),
        mecab_lattice_next: Some(fake_lattice_next),
        mecab_lattice_get_bos_node: fake_lattice_get_bos_node,
        mecab_lattice_strerror: fake_lattice_strerror,
    }
}

pub(crate) fn fake_library() -> MecabLibrary {
    fake_library_with(fake_api())
}

pub(crate) fn fake_library_with(api: MecabApi) -> MecabLibrary {
    MecabLibrary::from_loaded(
        LoadedLibrary {
            _library: None,
            api,
        },
        PathBuf::from("/fake/libmecab.so"),
    )
}

struct FakeModel {
    // Boxed so the chain's `next` pointers stay valid.
    dictionaries: Box<[MecabDictionaryInfoRaw]>,
    _user_dic: Option<CString>,
}

struct FakeTagger {
    formatted: CString,
}

struct FakeLattice {
    sentence: *const c_char,
    length: usize,
    request_type: i32,
    path: usize,
    boundaries: Vec<i32>,
    features: Vec<(usize, usize, *const c_char)>,
    nodes: Vec<Box<MecabNodeRaw>>,
    output: CString,
    error: CString,
}

impl FakeLattice {
    fn new() -> Self {
        Self {
            sentence: ptr::null(),
            length: 0,
            request_type: 1,
            path: 0,
            boundaries: Vec::new(),
            features: Vec::new(),
            nodes: Vec::new(),
            output: CString::default(),
            error: CString::default(),
        }
    }

    fn reset(&mut self) {
        self.sentence = ptr::null();
        self.length = 0;
        self.path = 0;
        self.boundaries.clear();
        self.features.clear();
        self.nodes.clear();
        self.output = CString::default();
        self.error = CString::default();
    }

    fn boundary(&self, position: usize) -> i32 {
        self.boundaries
            .get(position)
            .copied()
            .unwrap_or(MECAB_ANY_BOUNDARY)
    }

    fn ensure_boundaries(&mut self) {
        if self.boundaries.is_empty() {
            self.boundaries = vec![MECAB_ANY_BOUNDARY; self.length + 4];
        }
    }

    fn bytes(&self) -> &[u8] {
        if self.sentence.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.sentence.cast::<u8>(), self.length) }
    }
}

fn static_cstr(bytes: &'static [u8]) -> *const c_char {
    bytes.as_ptr().cast()
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

fn char_type_of(bytes: &[u8]) -> u8 {
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() => 5,
        Some(b) if b.is_ascii_digit() => 4,
        Some(b) if b.is_ascii_whitespace() => 1,
        Some(b) if b.is_ascii() => 3,
        // U+30A1..U+30FF
        Some(0xe3) if matches!(bytes.get(1), Some(0x82 | 0x83)) => 7,
        _ => 0,
    }
}

fn new_node(stat: u8) -> Box<MecabNodeRaw> {
    Box::new(MecabNodeRaw {
        prev: ptr::null_mut(),
        next: ptr::null_mut(),
        enext: ptr::null_mut(),
        bnext: ptr::null_mut(),
        rpath: ptr::null_mut(),
        lpath: ptr::null_mut(),
        surface: ptr::null(),
        feature: ptr::null(),
        id: 0,
        length: 0,
        rlength: 0,
        rc_attr: 0,
        lc_attr: 0,
        posid: 0,
        char_type: 0,
        stat,
        isbest: 1,
        alpha: 0.0,
        beta: 0.0,
        prob: 0.0,
        wcost: 0,
        cost: 0,
    })
}

unsafe extern "C" fn fake_version() -> *const c_char {
    static_cstr(FAKE_VERSION)
}

unsafe extern "C" fn fake_strerror(tagger: MecabTaggerHandle) -> *const c_char {
    if !tagger.is_null() {
        return static_cstr(b"\0");
    }
    with_state(|state| {
        state
            .global_error
            .as_ref()
            .map_or(static_cstr(b"\0"), |error| error.as_ptr())
    })
}

unsafe extern "C" fn fake_model_new(argc: c_int, argv: *mut *mut c_char) -> MecabModelHandle {
    let args: Vec<String> = (0..usize::try_from(argc).unwrap_or(0))
        .map(|index| {
            CStr::from_ptr(*argv.add(index))
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    let fail_model = with_state(|state| state.fail_model);
    if fail_model || args.iter().any(|arg| arg.contains("/missing")) {
        with_state(|state| {
            state.global_error = CString::new(format!(
                "fake: cannot open dictionary ({})",
                args.join(" ")
            ))
            .ok();
        });
        return ptr::null_mut();
    }

    let user_dic = args
        .iter()
        .find_map(|arg| arg.strip_prefix("--userdic="))
        .and_then(|path| CString::new(path).ok());

    let system = MecabDictionaryInfoRaw {
        filename: static_cstr(FAKE_SYS_DIC),
        charset: static_cstr(FAKE_CHARSET),
        size: 392_126,
        dic_type: MECAB_SYS_DIC,
        lsize: 1316,
        rsize: 1316,
        version: 102,
        next: ptr::null(),
    };
    let mut dictionaries = vec![system];
    if let Some(path) = &user_dic {
        dictionaries.push(MecabDictionaryInfoRaw {
            filename: path.as_ptr(),
            charset: static_cstr(FAKE_CHARSET),
            size: 3,
            dic_type: MECAB_USR_DIC,
            lsize: 1316,
            rsize: 1316,
            version: 102,
            next: ptr::null(),
        });
    }
    let mut dictionaries = dictionaries.into_boxed_slice();
    for index in 1..dictionaries.len() {
        let next: *const MecabDictionaryInfoRaw = &dictionaries[index];
        dictionaries[index - 1].next = next;
    }

    with_state(|state| state.models += 1);
    Box::into_raw(Box::new(FakeModel {
        dictionaries,
        _user_dic: user_dic,
    }))
    .cast()
}

unsafe extern "C" fn fake_model_destroy(model: MecabModelHandle) {
    drop(Box::from_raw(model.cast::<FakeModel>()));
    with_state(|state| state.models = state.models.saturating_sub(1));
}

unsafe extern "C" fn fake_model_new_tagger(_model: MecabModelHandle) -> MecabTaggerHandle {
    with_state(|state| state.taggers += 1);
    Box::into_raw(Box::new(FakeTagger {
        formatted: CString::default(),
    }))
    .cast()
}

unsafe extern "C" fn fake_model_new_lattice(_model: MecabModelHandle) -> MecabLatticeHandle {
    with_state(|state| state.lattices += 1);
    Box::into_raw(Box::new(FakeLattice::new())).cast()
}

unsafe extern "C" fn fake_model_dictionary_info(
    model: MecabModelHandle,
) -> *const MecabDictionaryInfoRaw {
    let model = &*model.cast::<FakeModel>();
    model.dictionaries.as_ptr()
}

unsafe extern "C" fn fake_destroy(tagger: MecabTaggerHandle) {
    drop(Box::from_raw(tagger.cast::<FakeTagger>()));
    with_state(|state| state.taggers = state.taggers.saturating_sub(1));
}

unsafe extern "C" fn fake_format_node(
    tagger: MecabTaggerHandle,
    node: *const MecabNodeRaw,
) -> *const c_char {
    let tagger = &mut *tagger.cast::<FakeTagger>();
    let node = &*node;
    let mut formatted = Vec::new();
    if !node.surface.is_null() {
        formatted.extend_from_slice(std::slice::from_raw_parts(
            node.surface.cast::<u8>(),
            usize::from(node.length),
        ));
    }
    formatted.push(b'|');
    if !node.feature.is_null() {
        formatted.extend_from_slice(CStr::from_ptr(node.feature).to_bytes());
    }
    formatted.push(b'\n');
    tagger.formatted = CString::new(formatted).unwrap_or_default();
    tagger.formatted.as_ptr()
}

unsafe extern "C" fn fake_lattice_destroy(lattice: MecabLatticeHandle) {
    drop(Box::from_raw(lattice.cast::<FakeLattice>()));
    with_state(|state| state.lattices = state.lattices.saturating_sub(1));
}

unsafe extern "C" fn fake_lattice_clear(lattice: MecabLatticeHandle) {
    (*lattice.cast::<FakeLattice>()).reset();
}

unsafe extern "C" fn fake_lattice_set_sentence2(
    lattice: MecabLatticeHandle,
    sentence: *const c_char,
    length: usize,
) {
    let lattice = &mut *lattice.cast::<FakeLattice>();
    lattice.reset();
    lattice.sentence = sentence;
    lattice.length = length;
}

unsafe extern "C" fn fake_lattice_set_request_type(lattice: MecabLatticeHandle, request: c_int) {
    (*lattice.cast::<FakeLattice>()).request_type = request;
}

unsafe extern "C" fn fake_lattice_add_request_type(lattice: MecabLatticeHandle, request: c_int) {
    (*lattice.cast::<FakeLattice>()).request_type |= request;
}

unsafe extern "C" fn fake_lattice_set_boundary_constraint(
    lattice: MecabLatticeHandle,
    position: usize,
    boundary: c_int,
) {
    let lattice = &mut *lattice.cast::<FakeLattice>();
    lattice.ensure_boundaries();
    if let Some(slot) = lattice.boundaries.get_mut(position) {
        *slot = boundary;
    }
}

unsafe extern "C" fn fake_lattice_set_feature_constraint(
    lattice: MecabLatticeHandle,
    begin: usize,
    end: usize,
    feature: *const c_char,
) {
    let lattice = &mut *lattice.cast::<FakeLattice>();
    if begin >= end || feature.is_null() {
        return;
    }
    lattice.ensure_boundaries();
    lattice.boundaries[begin] = MECAB_TOKEN_BOUNDARY;
    lattice.boundaries[end] = MECAB_TOKEN_BOUNDARY;
    for position in begin + 1..end {
        lattice.boundaries[position] = MECAB_INSIDE_TOKEN;
    }
    lattice.features.push((begin, end, feature));
}

struct Token {
    begin: usize,
    end: usize,
    stat: u8,
    feature: *const c_char,
}

fn segment(lattice: &FakeLattice, split_words: bool) -> Vec<Token> {
    let bytes = lattice.bytes();
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < bytes.len() {
        if let Some(&(begin, end, feature)) = lattice
            .features
            .iter()
            .find(|(begin, _, _)| *begin == position)
        {
            tokens.push(Token {
                begin,
                end,
                stat: MECAB_NOR_NODE,
                feature,
            });
            position = end;
            continue;
        }

        if lattice.boundary(position) == MECAB_TOKEN_BOUNDARY
            && lattice.boundary(position + 1) == MECAB_INSIDE_TOKEN
        {
            let mut end = position + 1;
            while end < bytes.len() && lattice.boundary(end) == MECAB_INSIDE_TOKEN {
                end += 1;
            }
            tokens.push(Token {
                begin: position,
                end,
                stat: MECAB_UNK_NODE,
                feature: static_cstr(FEATURE_UNKNOWN),
            });
            position = end;
            continue;
        }

        if bytes[position].is_ascii_alphabetic() {
            let mut end = position + 1;
            while !split_words
                && end < bytes.len()
                && bytes[end].is_ascii_alphabetic()
                && lattice.boundary(end) != MECAB_TOKEN_BOUNDARY
            {
                end += 1;
            }
            tokens.push(Token {
                begin: position,
                end,
                stat: MECAB_NOR_NODE,
                feature: static_cstr(FEATURE_WORD),
            });
            position = end;
            continue;
        }

        let end = (position + utf8_width(bytes[position])).min(bytes.len());
        let feature = if bytes[position] == 0x7f {
            FEATURE_MALFORMED
        } else {
            FEATURE_UNKNOWN
        };
        tokens.push(Token {
            begin: position,
            end,
            stat: MECAB_UNK_NODE,
            feature: static_cstr(feature),
        });
        position = end;
    }
    tokens
}

unsafe extern "C" fn fake_parse_lattice(
    _tagger: MecabTaggerHandle,
    lattice: MecabLatticeHandle,
) -> c_int {
    let lattice = &mut *lattice.cast::<FakeLattice>();
    with_state(|state| {
        state.parses += 1;
        state.last_request_type = lattice.request_type;
    });

    if lattice.bytes().contains(&0x07) {
        lattice.error = CString::new("fake: BEL is not analyzable").unwrap_or_default();
        return 0;
    }

    let tokens = segment(lattice, false);
    lattice.path = 0;
    fill_path(lattice, &tokens);
    1
}

// Replaces the lattice's node chain and string output with `tokens`.
unsafe fn fill_path(lattice: &mut FakeLattice, tokens: &[Token]) {
    let sentence = lattice.sentence;
    let mut nodes = Vec::with_capacity(tokens.len() + 2);
    let mut output = Vec::new();
    let mut cost: i64 = 0;

    let mut bos = new_node(MECAB_BOS_NODE);
    bos.surface = sentence;
    bos.feature = static_cstr(FEATURE_BOS_EOS);
    nodes.push(bos);

    for (index, token) in tokens.iter().enumerate() {
        let mut node = new_node(token.stat);
        let surface = &lattice.bytes()[token.begin..token.end];
        let wcost: i16 = if token.stat == MECAB_NOR_NODE { 100 } else { 500 };
        cost += i64::from(wcost);
        node.surface = sentence.add(token.begin);
        node.feature = token.feature;
        node.id = u32::try_from(index + 1).unwrap_or(u32::MAX);
        node.length = u16::try_from(surface.len()).unwrap_or(u16::MAX);
        node.rlength = node.length;
        node.posid = u16::from(token.stat == MECAB_NOR_NODE);
        node.char_type = char_type_of(surface);
        node.wcost = wcost;
        node.cost = cost as _;
        node.prob = 1.0;
        node.isbest = u8::from(lattice.path == 0);

        output.extend_from_slice(surface);
        output.push(b'\t');
        output.extend_from_slice(CStr::from_ptr(token.feature).to_bytes());
        output.push(b'\n');
        nodes.push(node);
    }

    let mut eos = new_node(MECAB_EOS_NODE);
    eos.surface = sentence.add(lattice.length);
    eos.feature = static_cstr(FEATURE_BOS_EOS);
    eos.id = u32::try_from(tokens.len() + 1).unwrap_or(u32::MAX);
    eos.cost = cost as _;
    nodes.push(eos);
    output.extend_from_slice(b"EOS\n");

    for index in 1..nodes.len() {
        let next: *mut MecabNodeRaw = &mut *nodes[index];
        let prev: *mut MecabNodeRaw = &mut *nodes[index - 1];
        nodes[index - 1].next = next;
        nodes[index].prev = prev;
    }

    lattice.nodes = nodes;
    lattice.output = CString::new(output).unwrap_or_default();
}

// Moves to the second path when it differs from the best one.
unsafe fn advance_path(lattice: &mut FakeLattice) -> bool {
    if lattice.request_type & MECAB_NBEST == 0 {
        lattice.error =
            CString::new("fake: MECAB_NBEST request type is not set").unwrap_or_default();
        return false;
    }
    if lattice.nodes.is_empty() || lattice.path > 0 {
        return false;
    }
    let tokens = segment(lattice, true);
    if tokens.len() + 2 == lattice.nodes.len() {
        return false;
    }
    lattice.path = 1;
    fill_path(lattice, &tokens);
    true
}

unsafe extern "C" fn fake_lattice_next(lattice: MecabLatticeHandle) -> c_int {
    c_int::from(advance_path(&mut *lattice.cast::<FakeLattice>()))
}

unsafe extern "C" fn fake_lattice_tostr(lattice: MecabLatticeHandle) -> *const c_char {
    let lattice = &*lattice.cast::<FakeLattice>();
    if lattice.nodes.is_empty() {
        return ptr::null();
    }
    lattice.output.as_ptr()
}

unsafe extern "C" fn fake_lattice_nbest_tostr(
    lattice: MecabLatticeHandle,
    n: usize,
) -> *const c_char {
    let lattice = &mut *lattice.cast::<FakeLattice>();
    if lattice.request_type & MECAB_NBEST == 0 {
        lattice.error = CString::new("fake: MECAB_NBEST request type is not set").unwrap_or_default();
        return ptr::null();
    }
    if lattice.nodes.is_empty() {
        return ptr::null();
    }
    let mut combined = lattice.output.as_bytes().to_vec();
    for _ in 1..n {
        if !advance_path(lattice) {
            break;
        }
        combined.extend_from_slice(lattice.output.as_bytes());
    }
    lattice.output = CString::new(combined).unwrap_or_default();
    lattice.output.as_ptr()
}

unsafe extern "C" fn fake_lattice_get_bos_node(lattice: MecabLatticeHandle) -> *const MecabNodeRaw {
    let lattice = &*lattice.cast::<FakeLattice>();
    lattice
        .nodes
        .first()
        .map_or(ptr::null(), |node| &**node as *const MecabNodeRaw)
}

unsafe extern "C" fn fake_lattice_strerror(lattice: MecabLatticeHandle) -> *const c_char {
    (*lattice.cast::<FakeLattice>()).error.as_ptr()
}
