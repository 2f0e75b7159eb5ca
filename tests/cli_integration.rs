//! Integration tests for the berth CLI.
//!
//! These cover flag validation and the no-op paths that do not require
//! cmake, a Python installation, or any backend toolchain.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn berth() -> Command {
    let mut cmd = Command::cargo_bin("berth").unwrap();
    // Keep host CI/env flags from leaking into the tests.
    cmd.env_remove("CI")
        .env_remove("BERTH_TESTRUN")
        .env_remove("BERTH_BENCHMARK")
        .env_remove("BERTH_CORES")
        .env_remove("BERTH_PYTHON")
        .env_remove("EXTRA_CMAKE_ARGS");
    cmd
}

#[test]
fn help_lists_backend_switches() {
    berth()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--clang-completer"))
        .stdout(predicate::str::contains("--java-completer"))
        .stdout(predicate::str::contains("--skip-build"));
}

#[test]
fn system_libclang_alone_is_rejected() {
    let tmp = TempDir::new().unwrap();
    berth()
        .current_dir(tmp.path())
        .arg("--system-libclang")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--clang-completer"));
}

#[test]
fn invalid_msvc_version_is_rejected() {
    let tmp = TempDir::new().unwrap();
    berth()
        .current_dir(tmp.path())
        .args(["--msvc", "13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--msvc"));
}

#[test]
fn skip_build_with_no_backends_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    berth()
        .current_dir(tmp.path())
        .arg("--skip-build")
        .assert()
        .success();
}

#[test]
fn empty_submodule_directory_is_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("third_party").join("gocode")).unwrap();

    berth()
        .current_dir(tmp.path())
        .arg("--skip-build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("git submodule update"));
}

#[test]
fn go_backend_without_toolchain_fails_with_hint() {
    let tmp = TempDir::new().unwrap();

    berth()
        .current_dir(tmp.path())
        .env("PATH", tmp.path())
        .args(["--skip-build", "--go-completer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("go is required"));
}
