//! Locating the Python runtime to embed in the engine core.
//!
//! The engine core is compiled as a dynamic library, so it cannot be linked
//! against a static Python library. If we try, the failure mode on macOS is
//!
//! ```text
//! Fatal Python error: PyThreadState_Get: no current thread
//! ```
//!
//! while on Linux the link step fails with something like
//!
//! ```text
//! relocation R_X86_64_32 against `a local symbol' can not be used when
//! making a shared object; recompile with -fPIC
//! ```
//!
//! On Windows the Python library is always dynamic (an import library to be
//! exact). On other platforms Python must have been compiled with
//! `--enable-shared` (Linux) or `--enable-framework` (macOS). So resolution
//! proceeds like this:
//!
//! - look for a dynamic library and return its path;
//! - if only a static library is found, fail with instructions on how to
//!   rebuild Python as a dynamic library;
//! - if no libraries are found, fail with a generic error.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Regex;
use thiserror::Error;

use crate::util::process::ProcessBuilder;

/// Target platform for library-name conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Cygwin,
}

impl Platform {
    /// Platform of the current build host.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "cygwin") {
            Platform::Cygwin
        } else {
            Platform::Linux
        }
    }

    /// The configure flag a user needs to rebuild Python with a shared
    /// runtime library on this platform.
    fn shared_library_flag(self) -> &'static str {
        match self {
            Platform::MacOs => "--enable-framework",
            _ => "--enable-shared",
        }
    }
}

/// Version and platform of the interpreter we are resolving for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub major: u32,
    pub minor: u32,
    pub platform: Platform,
}

impl RuntimeDescriptor {
    pub fn new(major: u32, minor: u32, platform: Platform) -> Self {
        RuntimeDescriptor {
            major,
            minor,
            platform,
        }
    }

    /// Pattern matching dynamic library names on every supported platform.
    ///
    /// Python 3 library names may carry an `m` ABI suffix on Unix platforms
    /// (for instance `libpython3.4m.so`), and the linker name without the
    /// version suffix does not always exist, so versioned `.so.N` names are
    /// accepted too.
    fn dynamic_pattern(&self) -> Regex {
        let pattern = format!(
            r"^(?:libpython{major}\.{minor}m?\.so(\.\d+)*|libpython{major}\.{minor}m?\.dylib|python{major}{minor}\.lib|libpython{major}\.{minor}\.dll\.a)$",
            major = self.major,
            minor = self.minor,
        );
        Regex::new(&pattern).expect("dynamic library pattern is valid")
    }

    /// Pattern matching static archive names.
    fn static_pattern(&self) -> Regex {
        let pattern = format!(
            r"^libpython{major}\.{minor}m?\.a$",
            major = self.major,
            minor = self.minor,
        );
        Regex::new(&pattern).expect("static library pattern is valid")
    }
}

/// The dynamic library and header directory the build will link against.
///
/// `library` always refers to a dynamic artifact; a static-only runtime is
/// surfaced as [`ResolveError::StaticOnly`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRuntime {
    pub library: PathBuf,
    pub include_dir: PathBuf,
}

/// Failure to locate a usable dynamic Python library.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "found static Python library ({library}) but a dynamic one is required. \
         You must use a Python compiled with the {flag} flag. \
         If using pyenv, you need to run the command:\n  \
         export PYTHON_CONFIGURE_OPTS=\"{flag}\"\n\
         before installing a Python version.",
        library = library.display()
    )]
    StaticOnly {
        library: PathBuf,
        flag: &'static str,
    },

    #[error("unable to find an appropriate Python library")]
    NotFound,
}

/// Search the given directories for a dynamic Python library.
///
/// Directories are tried in priority order and missing ones are skipped
/// silently. Within a directory, entries are scanned in explicit
/// lexicographic order so that an unversioned `.so` is preferred over a
/// versioned `.so.1` sibling; the scan short-circuits on the first dynamic
/// match across all directories.
pub fn resolve(
    runtime: &RuntimeDescriptor,
    search_dirs: &[PathBuf],
    include_dir: &Path,
) -> Result<ResolvedRuntime, ResolveError> {
    let dynamic = runtime.dynamic_pattern();
    let static_ = runtime.static_pattern();
    let mut static_libraries = Vec::new();

    for dir in search_dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        for name in names {
            // Dynamic classification takes precedence; the extensions are
            // disjoint so a filename never matches both patterns.
            if dynamic.is_match(&name) {
                tracing::debug!("found dynamic Python library: {}", name);
                return Ok(ResolvedRuntime {
                    library: dir.join(name),
                    include_dir: include_dir.to_path_buf(),
                });
            }

            if static_.is_match(&name) {
                static_libraries.push(dir.join(name));
            }
        }
    }

    // Import libraries on Windows are always dynamic, so a static-only
    // diagnostic would be misleading there.
    if let Some(library) = static_libraries.into_iter().next() {
        if runtime.platform != Platform::Windows {
            return Err(ResolveError::StaticOnly {
                library,
                flag: runtime.platform.shared_library_flag(),
            });
        }
    }

    Err(ResolveError::NotFound)
}

/// Candidate library directories for an interpreter installation.
///
/// On Windows the import library always lives in `{prefix}/libs`. Elsewhere,
/// pyenv and some distributions do not put the dynamic library in the
/// directory reported by the `LIBPL` config variable, so the `lib64` and
/// `lib` directories of the base installation are searched as fallbacks.
/// The base prefix is used rather than a virtualenv prefix because the
/// dynamic library never lives inside an isolated environment.
pub fn library_search_dirs(
    platform: Platform,
    base_prefix: &Path,
    libpl: Option<&Path>,
) -> Vec<PathBuf> {
    if platform == Platform::Windows {
        return vec![base_prefix.join("libs")];
    }

    let mut dirs = Vec::new();
    if let Some(libpl) = libpl {
        dirs.push(libpl.to_path_buf());
    }
    dirs.push(base_prefix.join("lib64"));
    dirs.push(base_prefix.join("lib"));
    dirs
}

/// Facts about a Python interpreter, gathered by running it.
#[derive(Debug, Clone)]
pub struct Interpreter {
    pub executable: PathBuf,
    pub major: u32,
    pub minor: u32,
    pub include_dir: PathBuf,
    pub base_prefix: PathBuf,
    pub libpl: Option<PathBuf>,
}

impl Interpreter {
    /// Query the given Python executable for the facts resolution needs.
    pub fn probe(executable: &Path) -> Result<Self> {
        const PROBE: &str = "import sys, sysconfig\n\
            print(sys.version_info[0])\n\
            print(sys.version_info[1])\n\
            print(sysconfig.get_paths()['include'])\n\
            print(getattr(sys, 'real_prefix', None) or getattr(sys, 'base_prefix', sys.prefix))\n\
            print(sysconfig.get_config_var('LIBPL') or '')";

        let stdout = ProcessBuilder::new(executable)
            .args(["-c", PROBE])
            .capture()
            .with_context(|| format!("failed to query interpreter {}", executable.display()))?;

        let lines: Vec<&str> = stdout.lines().collect();
        if lines.len() < 5 {
            bail!(
                "unexpected probe output from {}: {:?}",
                executable.display(),
                stdout
            );
        }

        let major: u32 = lines[0]
            .trim()
            .parse()
            .with_context(|| format!("invalid major version: {}", lines[0]))?;
        let minor: u32 = lines[1]
            .trim()
            .parse()
            .with_context(|| format!("invalid minor version: {}", lines[1]))?;

        let libpl = lines[4].trim();
        let libpl = if libpl.is_empty() {
            None
        } else {
            Some(PathBuf::from(libpl))
        };

        Ok(Interpreter {
            executable: executable.to_path_buf(),
            major,
            minor,
            include_dir: PathBuf::from(lines[2].trim()),
            base_prefix: PathBuf::from(lines[3].trim()),
            libpl,
        })
    }

    /// The runtime descriptor for this interpreter on the current host.
    pub fn descriptor(&self) -> RuntimeDescriptor {
        RuntimeDescriptor::new(self.major, self.minor, Platform::current())
    }

    /// Resolve the dynamic library and headers for this interpreter.
    pub fn resolve_runtime(&self) -> Result<ResolvedRuntime, ResolveError> {
        let descriptor = self.descriptor();
        let dirs = library_search_dirs(
            descriptor.platform,
            &self.base_prefix,
            self.libpl.as_deref(),
        );
        resolve(&descriptor, &dirs, &self.include_dir)
    }
}
