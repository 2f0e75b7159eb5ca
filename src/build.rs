//! The native engine-core build pipeline.
//!
//! A linear sequence: configure with CMake, compile the core target, then
//! optionally compile and run the test and benchmark targets. The first
//! failure aborts the remaining steps. The scratch build directory is always
//! cleaned up, except when the caller supplied its own directory or when a
//! failed build runs in a CI context, where it is kept for inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::layout::Layout;
use crate::python::{Platform, ResolvedRuntime};
use crate::util::fs::ensure_dir;
use crate::util::process::{find_executable, ProcessBuilder, ProcessError};

/// Name of the core library CMake target.
pub const CORE_TARGET: &str = "engine_core";
/// Name of the test binary CMake target.
pub const TEST_TARGET: &str = "engine_core_tests";
/// Name of the benchmark binary CMake target.
pub const BENCHMARK_TARGET: &str = "engine_core_benchmarks";

/// Shown whenever configuration or compilation fails.
pub const BUILD_FAILURE_ADVICE: &str = "\
ERROR: the build failed.

NOTE: it is *highly* unlikely that this is a bug but rather
that this is a problem with the configuration of your system
or a missing dependency. Please carefully read CONTRIBUTING.md
and if you're sure that it is a bug, please raise an issue on the
issue tracker, including the entire output of this tool
and the invocation line used to run it.";

/// Options controlling the native build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Perform the build in this directory and keep it afterwards.
    pub build_dir: Option<PathBuf>,
    /// Visual Studio generator version on Windows.
    pub msvc: u16,
    pub enable_debug: bool,
    pub enable_coverage: bool,
    pub clang_completer: bool,
    pub system_libclang: bool,
    pub system_boost: bool,
    pub quiet: bool,
    /// Compile and run the test target.
    pub run_tests: bool,
    /// Compile and run the benchmark target.
    pub run_benchmarks: bool,
    /// Running in a continuous-integration context.
    pub ci: bool,
    /// Worker-count override for the native compiler.
    pub jobs: Option<usize>,
    /// Extra configure flags, appended last so user overrides win.
    pub extra_cmake_args: Vec<String>,
}

/// One external command of the pipeline.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
    pub quiet: bool,
    pub status_message: String,
    pub failure_message: Option<String>,
}

/// Execution seam for build steps, so sequencing is testable with fakes.
pub trait Runner {
    fn run(&self, step: &BuildStep) -> Result<(), ProcessError>;
}

/// Runs steps as real subprocesses.
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, step: &BuildStep) -> Result<(), ProcessError> {
        let mut builder = ProcessBuilder::new(&step.program)
            .args(&step.args)
            .cwd(&step.cwd);

        for (key, value) in &step.env {
            builder = builder.env(key, value);
        }

        if let Some(ref message) = step.failure_message {
            builder = builder.failure_message(message.clone());
        }

        if step.quiet {
            builder.run_quiet(&step.status_message)
        } else {
            builder.run()
        }
    }
}

/// Select the CMake generator for the given host.
///
/// Windows always uses the versioned Visual Studio generator; elsewhere Ninja
/// is preferred when available, with Unix Makefiles as the universal
/// fallback.
pub fn generator(platform: Platform, msvc: u16, wide: bool, has_ninja: bool) -> String {
    if platform == Platform::Windows {
        let arch = if wide { " Win64" } else { "" };
        return format!("Visual Studio {}{}", msvc, arch);
    }
    if has_ninja {
        return "Ninja".to_string();
    }
    "Unix Makefiles".to_string()
}

fn host_generator(msvc: u16) -> String {
    generator(
        Platform::current(),
        msvc,
        cfg!(target_pointer_width = "64"),
        find_executable("ninja").is_some(),
    )
}

/// Worker count for the native compiler: explicit override, else the
/// detected core count, else one.
pub fn worker_count(override_jobs: Option<usize>) -> usize {
    override_jobs
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}

/// Prepend `dir` to a path-style environment variable, preserving any
/// existing value.
pub fn prepend_path_env(var: &str, dir: &Path) -> (String, String) {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let value = match std::env::var(var) {
        Ok(existing) if !existing.is_empty() => {
            format!("{}{}{}", dir.display(), separator, existing)
        }
        _ => dir.display().to_string(),
    };
    (var.to_string(), value)
}

/// The variable the dynamic loader consults for the core library.
fn runtime_library_path_var() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// The configure → compile → test → benchmark sequence.
pub struct BuildPipeline<'a> {
    opts: &'a BuildOptions,
    layout: &'a Layout,
    cmake: PathBuf,
    runner: &'a dyn Runner,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        opts: &'a BuildOptions,
        layout: &'a Layout,
        cmake: PathBuf,
        runner: &'a dyn Runner,
    ) -> Self {
        BuildPipeline {
            opts,
            layout,
            cmake,
            runner,
        }
    }

    /// Run the whole pipeline.
    pub fn run(&self, runtime: &ResolvedRuntime) -> Result<()> {
        let (build_dir, scratch) = self.prepare_build_dir()?;

        let result = self.run_steps(&build_dir, runtime);

        match scratch {
            Some(dir) => {
                if result.is_err() && self.opts.ci {
                    // Keep the scratch directory for inspection.
                    let kept = dir.into_path();
                    tracing::debug!("keeping scratch build directory: {}", kept.display());
                }
            }
            None => println!("The build files are in: {}", build_dir.display()),
        }

        result
    }

    fn prepare_build_dir(&self) -> Result<(PathBuf, Option<tempfile::TempDir>)> {
        if let Some(ref dir) = self.opts.build_dir {
            ensure_dir(dir)?;
            return Ok((dir.clone(), None));
        }

        let scratch = tempfile::Builder::new()
            .prefix("engine_build_")
            .tempdir()
            .context("failed to create scratch build directory")?;
        let path = scratch.path().to_path_buf();
        Ok((path, Some(scratch)))
    }

    fn run_steps(&self, build_dir: &Path, runtime: &ResolvedRuntime) -> Result<()> {
        self.runner
            .run(&self.configure_step(build_dir, runtime))
            .map_err(anyhow::Error::from)?;

        for target in self.targets() {
            self.runner
                .run(&self.compile_step(build_dir, target))
                .map_err(anyhow::Error::from)?;
        }

        if self.opts.run_tests {
            self.runner
                .run(&self.test_step(build_dir))
                .map_err(anyhow::Error::from)?;
        }

        if self.opts.run_benchmarks {
            self.runner
                .run(&self.benchmark_step(build_dir))
                .map_err(anyhow::Error::from)?;
        }

        Ok(())
    }

    /// Targets in strict build order: core first, then tests, then
    /// benchmarks.
    fn targets(&self) -> Vec<&'static str> {
        let mut targets = vec![CORE_TARGET];
        if self.opts.run_tests {
            targets.push(TEST_TARGET);
        }
        if self.opts.run_benchmarks {
            targets.push(BENCHMARK_TARGET);
        }
        targets
    }

    fn configure_step(&self, build_dir: &Path, runtime: &ResolvedRuntime) -> BuildStep {
        let mut args = vec!["-G".to_string(), host_generator(self.opts.msvc)];

        // The CMake FindPythonLibs module does not work reliably, so its job
        // is done for it.
        args.push(format!("-DPYTHON_LIBRARY={}", runtime.library.display()));
        args.push(format!(
            "-DPYTHON_INCLUDE_DIR={}",
            runtime.include_dir.display()
        ));

        if self.opts.clang_completer {
            args.push("-DUSE_CLANG_COMPLETER=ON".to_string());
        }
        if self.opts.system_libclang {
            args.push("-DUSE_SYSTEM_LIBCLANG=ON".to_string());
        }
        if self.opts.system_boost {
            args.push("-DUSE_SYSTEM_BOOST=ON".to_string());
        }
        if self.opts.enable_debug {
            args.push("-DCMAKE_BUILD_TYPE=Debug".to_string());
            args.push("-DUSE_DEV_FLAGS=ON".to_string());
        }
        // Coverage is not supported for C++ on MSVC.
        if self.opts.enable_coverage && Platform::current() != Platform::Windows {
            args.push("-DCMAKE_CXX_FLAGS=-coverage".to_string());
        }

        // Appended last: conflicting keys are left to CMake's own last-wins
        // handling, no deduplication here.
        args.extend(self.opts.extra_cmake_args.iter().cloned());

        args.push(self.layout.native_source_dir().display().to_string());

        BuildStep {
            name: "configure".to_string(),
            program: self.cmake.clone(),
            args,
            env: Vec::new(),
            cwd: build_dir.to_path_buf(),
            quiet: self.opts.quiet,
            status_message: "Generating engine build configuration".to_string(),
            failure_message: Some(BUILD_FAILURE_ADVICE.to_string()),
        }
    }

    fn compile_step(&self, build_dir: &Path, target: &str) -> BuildStep {
        let mut args = vec![
            "--build".to_string(),
            ".".to_string(),
            "--target".to_string(),
            target.to_string(),
        ];

        if Platform::current() == Platform::Windows {
            let config = if self.opts.enable_debug {
                "Debug"
            } else {
                "Release"
            };
            args.push("--config".to_string());
            args.push(config.to_string());
        } else {
            args.push("--".to_string());
            args.push("-j".to_string());
            args.push(worker_count(self.opts.jobs).to_string());
        }

        BuildStep {
            name: format!("build {}", target),
            program: self.cmake.clone(),
            args,
            env: Vec::new(),
            cwd: build_dir.to_path_buf(),
            quiet: self.opts.quiet,
            status_message: format!("Compiling engine target: {}", target),
            failure_message: Some(BUILD_FAILURE_ADVICE.to_string()),
        }
    }

    fn test_step(&self, build_dir: &Path) -> BuildStep {
        let tests_dir = build_dir.join("engine").join("tests");

        BuildStep {
            name: "run tests".to_string(),
            program: tests_dir.join(TEST_TARGET),
            args: Vec::new(),
            // Prepended, not overwritten, so the binary can locate both the
            // core library and anything already on the path.
            env: vec![prepend_path_env(
                runtime_library_path_var(),
                self.layout.root(),
            )],
            cwd: tests_dir,
            quiet: self.opts.quiet,
            status_message: "Running engine core tests".to_string(),
            failure_message: None,
        }
    }

    fn benchmark_step(&self, build_dir: &Path) -> BuildStep {
        let benchmarks_dir = build_dir.join("engine").join("benchmarks");

        BuildStep {
            name: "run benchmarks".to_string(),
            program: benchmarks_dir.join(BENCHMARK_TARGET),
            args: Vec::new(),
            env: vec![prepend_path_env(
                runtime_library_path_var(),
                self.layout.root(),
            )],
            cwd: benchmarks_dir,
            // Benchmark output is the only useful product of the step.
            quiet: false,
            status_message: String::new(),
            failure_message: None,
        }
    }
}

/// On Windows, linking fails with LNK1104 if the core library is loaded by a
/// running engine instance. Detect that up front with a clear message.
#[cfg(windows)]
pub fn ensure_core_library_not_in_use(layout: &Layout) -> Result<()> {
    use anyhow::bail;

    let library = layout.core_library_artifact();
    if !library.exists() {
        return Ok(());
    }

    match std::fs::OpenOptions::new().append(true).open(&library) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            bail!(
                "the engine core library is currently in use. \
                 Stop all running engine instances before compilation."
            )
        }
        Err(e) => Err(e).context(format!("failed to open {}", library.display())),
    }
}

#[cfg(not(windows))]
pub fn ensure_core_library_not_in_use(_layout: &Layout) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records step names; fails every step whose name matches `fail_on`.
    struct FakeRunner {
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl FakeRunner {
        fn new(fail_on: Option<&'static str>) -> Self {
            FakeRunner {
                calls: RefCell::new(Vec::new()),
                fail_on,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Runner for FakeRunner {
        fn run(&self, step: &BuildStep) -> Result<(), ProcessError> {
            self.calls.borrow_mut().push(step.name.clone());
            if self.fail_on == Some(step.name.as_str()) {
                return Err(ProcessError::Failed {
                    command: step.program.display().to_string(),
                    code: Some(1),
                    output: None,
                    message: "step failed".to_string(),
                });
            }
            Ok(())
        }
    }

    fn runtime() -> ResolvedRuntime {
        ResolvedRuntime {
            library: PathBuf::from("/usr/lib/libpython3.9.so"),
            include_dir: PathBuf::from("/usr/include/python3.9"),
        }
    }

    fn pipeline_opts() -> BuildOptions {
        BuildOptions {
            msvc: 15,
            run_tests: true,
            run_benchmarks: true,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_full_sequence_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = pipeline_opts();
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(None);

        BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner)
            .run(&runtime())
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "configure",
                "build engine_core",
                "build engine_core_tests",
                "build engine_core_benchmarks",
                "run tests",
                "run benchmarks",
            ]
        );
    }

    #[test]
    fn test_core_failure_stops_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = pipeline_opts();
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(Some("build engine_core"));

        BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner)
            .run(&runtime())
            .unwrap_err();

        // Exactly one compile attempt; no test or benchmark target builds.
        let calls = runner.calls();
        assert_eq!(calls, vec!["configure", "build engine_core"]);
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("build ")).count(),
            1
        );
    }

    #[test]
    fn test_configure_failure_stops_compilation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = pipeline_opts();
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(Some("configure"));

        BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner)
            .run(&runtime())
            .unwrap_err();

        assert_eq!(runner.calls(), vec!["configure"]);
    }

    #[test]
    fn test_only_core_when_flags_unset() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = BuildOptions {
            msvc: 15,
            ..BuildOptions::default()
        };
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(None);

        BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner)
            .run(&runtime())
            .unwrap();

        assert_eq!(runner.calls(), vec!["configure", "build engine_core"]);
    }

    #[test]
    fn test_user_build_dir_is_kept() {
        let tmp = tempfile::TempDir::new().unwrap();
        let build_dir = tmp.path().join("incremental");
        let opts = BuildOptions {
            msvc: 15,
            build_dir: Some(build_dir.clone()),
            ..BuildOptions::default()
        };
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(None);

        BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner)
            .run(&runtime())
            .unwrap();

        assert!(build_dir.is_dir());
    }

    #[test]
    fn test_extra_args_appended_last_before_source_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = BuildOptions {
            msvc: 15,
            enable_debug: true,
            extra_cmake_args: vec!["-DCMAKE_BUILD_TYPE=Release".to_string()],
            ..BuildOptions::default()
        };
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(None);
        let pipeline = BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner);

        let step = pipeline.configure_step(tmp.path(), &runtime());
        let args = &step.args;

        let debug_pos = args
            .iter()
            .position(|a| a == "-DCMAKE_BUILD_TYPE=Debug")
            .unwrap();
        let override_pos = args
            .iter()
            .position(|a| a == "-DCMAKE_BUILD_TYPE=Release")
            .unwrap();
        assert!(override_pos > debug_pos);

        // Source directory is the final argument.
        let source = layout.native_source_dir().display().to_string();
        assert_eq!(args.last().unwrap(), &source);
    }

    #[test]
    fn test_benchmark_step_never_quiet() {
        let tmp = tempfile::TempDir::new().unwrap();
        let opts = BuildOptions {
            msvc: 15,
            quiet: true,
            run_benchmarks: true,
            ..BuildOptions::default()
        };
        let layout = Layout::new(tmp.path());
        let runner = FakeRunner::new(None);
        let pipeline = BuildPipeline::new(&opts, &layout, PathBuf::from("cmake"), &runner);

        assert!(pipeline.configure_step(tmp.path(), &runtime()).quiet);
        assert!(!pipeline.benchmark_step(tmp.path()).quiet);
    }

    #[test]
    fn test_generator_selection() {
        assert_eq!(
            generator(Platform::Windows, 15, true, true),
            "Visual Studio 15 Win64"
        );
        assert_eq!(
            generator(Platform::Windows, 12, false, false),
            "Visual Studio 12"
        );
        assert_eq!(generator(Platform::Linux, 15, true, true), "Ninja");
        assert_eq!(
            generator(Platform::Linux, 15, true, false),
            "Unix Makefiles"
        );
        assert_eq!(generator(Platform::MacOs, 15, true, false), "Unix Makefiles");
    }

    #[test]
    fn test_worker_count_override() {
        assert_eq!(worker_count(Some(7)), 7);
        assert!(worker_count(None) >= 1);
    }

    #[test]
    fn test_prepend_path_env_keeps_existing() {
        let var = "BERTH_TEST_LIBRARY_PATH";
        std::env::set_var(var, "/existing");
        let (key, value) = prepend_path_env(var, Path::new("/prepended"));
        std::env::remove_var(var);

        assert_eq!(key, var);
        let separator = if cfg!(windows) { ';' } else { ':' };
        assert_eq!(value, format!("/prepended{}/existing", separator));
    }

    #[test]
    fn test_prepend_path_env_without_existing() {
        let var = "BERTH_TEST_LIBRARY_PATH_UNSET";
        std::env::remove_var(var);
        let (_, value) = prepend_path_env(var, Path::new("/only"));
        assert_eq!(value, "/only");
    }
}
