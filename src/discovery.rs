use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::ptr;

use crate::constants::MECAB_PROGRAM_NAME;
use crate::error::{MecabError, Result};
use crate::native::{read_mecab_error, MecabApi};

/// One way of finding the MeCab library on this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LibraryLocator {
    /// Path given by the caller or `MECAB_PATH`, used verbatim.
    Explicit(PathBuf),
    /// Companion executable printing the library directory.
    #[cfg_attr(windows, allow(dead_code))]
    ConfigHelper {
        program: &'static str,
        args: &'static [&'static str],
        file_name: &'static str,
    },
    /// Registry value pointing at the installation's `mecabrc`.
    #[cfg_attr(not(windows), allow(dead_code))]
    Registry {
        key: &'static str,
        value: &'static str,
        file_name: &'static str,
    },
    /// Plain file name or absolute path handed to the platform loader.
    Candidate(&'static str),
}

#[cfg(target_os = "windows")]
const PLATFORM_LOCATORS: &[LibraryLocator] = &[LibraryLocator::Registry {
    key: "HKEY_CURRENT_USER\\Software\\MeCab",
    value: "mecabrc",
    file_name: "libmecab.dll",
}];

#[cfg(target_os = "macos")]
const PLATFORM_LOCATORS: &[LibraryLocator] = &[LibraryLocator::ConfigHelper {
    program: "mecab-config",
    args: &["--libs-only-L"],
    file_name: "libmecab.dylib",
}];

#[cfg(all(unix, not(target_os = "macos")))]
const PLATFORM_LOCATORS: &[LibraryLocator] = &[LibraryLocator::ConfigHelper {
    program: "mecab-config",
    args: &["--libs-only-L"],
    file_name: "libmecab.so",
}];

pub(crate) fn default_library_candidates() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &[
            "libmecab.dll",
            "C:\\Program Files\\MeCab\\bin\\libmecab.dll",
            "C:\\Program Files (x86)\\MeCab\\bin\\libmecab.dll",
        ]
    }
    #[cfg(target_os = "macos")]
    {
        &[
            "libmecab.dylib",
            "/usr/local/lib/libmecab.dylib",
            "/opt/homebrew/lib/libmecab.dylib",
            "/opt/local/lib/libmecab.dylib",
        ]
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        &[
            "libmecab.so",
            "libmecab.so.2",
            "/usr/local/lib/libmecab.so",
            "/usr/lib/libmecab.so",
            "/usr/lib/x86_64-linux-gnu/libmecab.so.2",
            "/usr/lib/aarch64-linux-gnu/libmecab.so.2",
            "/usr/lib64/libmecab.so.2",
        ]
    }
}

/// Ordered locators for one resolution attempt.
///
/// An explicit path short-circuits every other source.
pub(crate) fn library_locators(explicit: Option<&Path>) -> Vec<LibraryLocator> {
    if let Some(path) = explicit {
        return vec![LibraryLocator::Explicit(path.to_path_buf())];
    }
    PLATFORM_LOCATORS
        .iter()
        .cloned()
        .chain(
            default_library_candidates()
                .iter()
                .copied()
                .map(LibraryLocator::Candidate),
        )
        .collect()
}

impl LibraryLocator {
    /// Turns this locator into a loadable path, running helpers as needed.
    pub(crate) fn locate(&self) -> Option<PathBuf> {
        match self {
            Self::Explicit(path) => Some(path.clone()),
            Self::Candidate(candidate) => Some(PathBuf::from(candidate)),
            Self::ConfigHelper {
                program,
                args,
                file_name,
            } => {
                let stdout = run_helper(program, args)?;
                parse_config_helper_output(&stdout, file_name)
            }
            Self::Registry {
                key,
                value,
                file_name,
            } => {
                let stdout = run_helper("reg", &["query", *key, "/v", *value])?;
                parse_registry_output(&stdout, file_name)
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Explicit(path) => path.display().to_string(),
            Self::Candidate(candidate) => (*candidate).to_string(),
            Self::ConfigHelper { program, args, .. } => {
                format!("{program} {}", args.join(" "))
            }
            Self::Registry { key, value, .. } => format!("registry {key}\\{value}"),
        }
    }
}

fn run_helper(program: &str, args: &[&str]) -> Option<String> {
    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(error) => {
            tracing::debug!(program, %error, "library locator helper unavailable");
            return None;
        }
    };
    if !output.status.success() {
        tracing::debug!(
            program,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "library locator helper failed"
        );
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parses `mecab-config --libs-only-L` output into a library path.
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn parse_config_helper_output(stdout: &str, file_name: &str) -> Option<PathBuf> {
    let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
    let directory = line.strip_prefix("-L").unwrap_or(line).trim();
    if directory.is_empty() {
        return None;
    }
    Some(PathBuf::from(directory).join(file_name))
}

/// Parses `reg query ... /v mecabrc` output into a library path.
///
/// The registry stores `<root>\etc\mecabrc`; the library lives in `<root>\bin`.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_registry_output(stdout: &str, file_name: &str) -> Option<PathBuf> {
    let value = stdout.lines().find_map(|line| {
        line.split_once("REG_SZ")
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    })?;
    let root = value.split("etc").next()?.trim_end_matches(['\\', '/']);
    if root.is_empty() {
        return None;
    }
    Some(PathBuf::from(root).join("bin").join(file_name))
}

/// Chooses the dictionary charset: the override when set, else the probe.
pub(crate) fn resolve_charset(
    explicit: Option<&str>,
    probe: impl FnOnce() -> Result<String>,
) -> Result<String> {
    if let Some(charset) = explicit.map(str::trim).filter(|charset| !charset.is_empty()) {
        tracing::debug!(charset, "using explicit dictionary charset");
        return Ok(charset.to_string());
    }
    let charset = probe()?;
    tracing::debug!(charset = %charset, "probed dictionary charset");
    Ok(charset)
}

/// Opens a throwaway model with no options and reads its primary dictionary charset.
pub(crate) fn probe_dictionary_charset(api: &MecabApi) -> Result<String> {
    let program = CString::new(MECAB_PROGRAM_NAME)?;
    let mut argv: Vec<*mut c_char> = vec![program.as_ptr() as *mut c_char, ptr::null_mut()];
    let model = unsafe { (api.mecab_model_new)(1, argv.as_mut_ptr()) };
    if model.is_null() {
        let detail = read_mecab_error(api, ptr::null_mut())
            .unwrap_or_else(|| "engine could not open its default dictionary".to_string());
        return Err(MecabError::CharsetUnresolved(detail));
    }

    let charset = unsafe {
        let info = (api.mecab_model_dictionary_info)(model);
        let charset = if info.is_null() || (*info).charset.is_null() {
            None
        } else {
            Some(
                CStr::from_ptr((*info).charset)
                    .to_string_lossy()
                    .trim()
                    .to_string(),
            )
        };
        (api.mecab_model_destroy)(model);
        charset
    };

    charset
        .filter(|charset| !charset.is_empty())
        .ok_or_else(|| {
            MecabError::CharsetUnresolved("default dictionary reports no charset".to_string())
        })
}
