//! Java backend: install the jdt.ls language server from a versioned,
//! checksum-verified tarball.
//!
//! The milestone, build stamp, and checksum are configuration data pinned
//! here; bumping the server version means updating these three constants.

use std::io::Write;

use anyhow::{Context, Result};

use super::InstallContext;
use crate::archive::extract_tarball;
use crate::cache::DownloadCache;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists};

const JDTLS_MILESTONE: &str = "0.14.0";
const JDTLS_BUILD_STAMP: &str = "201802282111";
const JDTLS_SHA256: &str = "ce27fa4af601d11c3914253d51218667003b51468672d0ae369039ec8a111a3b";

fn package_name() -> String {
    format!(
        "jdt-language-server-{}-{}.tar.gz",
        JDTLS_MILESTONE, JDTLS_BUILD_STAMP
    )
}

fn download_url(package_name: &str) -> String {
    format!(
        "https://download.eclipse.org/jdtls/milestones/{}/{}",
        JDTLS_MILESTONE, package_name
    )
}

pub(crate) fn install(ctx: &InstallContext<'_>) -> Result<()> {
    if ctx.quiet {
        print!("Installing jdt.ls for Java support...");
        let _ = std::io::stdout().flush();
    }

    let target = ctx.layout.backend_dir("eclipse.jdt.ls").join("target");
    let repository = target.join("repository");
    let cache = DownloadCache::new(target.join("cache"));

    // The repository is recreated from scratch on every install.
    remove_dir_all_if_exists(&repository)?;
    ensure_dir(&repository)?;

    let package = package_name();
    let archive_path = cache.fetch(&download_url(&package), &package, JDTLS_SHA256)?;

    let data = std::fs::read(&archive_path)
        .with_context(|| format!("failed to read archive: {}", archive_path.display()))?;

    tracing::info!("extracting jdt.ls to {}", repository.display());
    extract_tarball(&data, &repository)
        .with_context(|| format!("failed to extract {}", archive_path.display()))?;

    if ctx.quiet {
        println!("OK");
    } else {
        println!("Done installing jdt.ls");
    }

    Ok(())
}
