//! CLI definitions using clap.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use berth::build::BuildOptions;
use berth::installers::Backend;
use berth::ops::install::InstallOptions;
use berth::util::shell;

/// Build the engine core and install completion backends
#[derive(Parser)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable the C-family semantic completion engine
    #[arg(long)]
    pub clang_completer: bool,

    /// Enable the C# semantic completion engine
    #[arg(long)]
    pub cs_completer: bool,

    /// Enable the Go semantic completion engine
    #[arg(long)]
    pub go_completer: bool,

    /// Enable the JavaScript semantic completion engine
    #[arg(long)]
    pub js_completer: bool,

    /// Enable the Rust semantic completion engine
    #[arg(long)]
    pub rust_completer: bool,

    /// Enable the Java semantic completion engine
    #[arg(long)]
    pub java_completer: bool,

    /// Enable all supported backends
    #[arg(long = "all")]
    pub all_completers: bool,

    /// Use the system boost instead of the bundled one (not recommended)
    #[arg(long)]
    pub system_boost: bool,

    /// Use the system libclang instead of downloading one (not recommended)
    #[arg(long)]
    pub system_libclang: bool,

    /// Microsoft Visual Studio version to generate projects for
    #[arg(long, default_value_t = 15)]
    pub msvc: u16,

    /// Build the engine core with debug symbols
    #[arg(long)]
    pub enable_debug: bool,

    /// Enable gcov coverage for the native module (implies --enable-debug)
    #[arg(long)]
    pub enable_coverage: bool,

    /// Perform the build in this directory and keep the build output;
    /// useful for incremental builds and required for coverage data
    #[arg(long)]
    pub build_dir: Option<PathBuf>,

    /// Quiet installation mode: print only overall progress and errors
    #[arg(long)]
    pub quiet: bool,

    /// Don't build the engine core, just install backends
    #[arg(long)]
    pub skip_build: bool,

    /// Python interpreter to build against (defaults to python3 on PATH)
    #[arg(long, env = "BERTH_PYTHON")]
    pub python: Option<PathBuf>,

    /// Worker-count override for the native compiler
    #[arg(long, env = "BERTH_CORES")]
    pub jobs: Option<usize>,
}

impl Cli {
    /// Cross-flag validation clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if ![12, 14, 15].contains(&self.msvc) {
            bail!("invalid --msvc version {}; expected 12, 14, or 15", self.msvc);
        }

        if self.system_libclang && !self.clang_completer && !self.all_completers {
            bail!(
                "you can't pass --system-libclang without also passing \
                 --clang-completer or --all as well"
            );
        }

        Ok(())
    }

    /// Backends selected by flags, in install order.
    fn selected_backends(&self) -> Vec<Backend> {
        Backend::ALL
            .into_iter()
            .filter(|backend| {
                self.all_completers
                    || match backend {
                        Backend::CSharp => self.cs_completer,
                        Backend::Go => self.go_completer,
                        Backend::JavaScript => self.js_completer,
                        Backend::Rust => self.rust_completer,
                        Backend::Java => self.java_completer,
                    }
            })
            .collect()
    }

    /// Assemble install options, folding in environment-provided flags.
    pub fn into_install_options(self) -> InstallOptions {
        let build = BuildOptions {
            build_dir: self.build_dir.clone(),
            msvc: self.msvc,
            // Coverage requires a debug build.
            enable_debug: self.enable_debug || self.enable_coverage,
            enable_coverage: self.enable_coverage,
            clang_completer: self.clang_completer || self.all_completers,
            system_libclang: self.system_libclang,
            system_boost: self.system_boost,
            quiet: self.quiet,
            run_tests: std::env::var_os("BERTH_TESTRUN").is_some(),
            run_benchmarks: std::env::var_os("BERTH_BENCHMARK").is_some(),
            ci: std::env::var_os("CI").is_some(),
            jobs: self.jobs,
            extra_cmake_args: std::env::var("EXTRA_CMAKE_ARGS")
                .map(|args| shell::split(&args))
                .unwrap_or_default(),
        };

        InstallOptions {
            backends: self.selected_backends(),
            build,
            python: self.python,
            skip_build: self.skip_build,
        }
    }
}
