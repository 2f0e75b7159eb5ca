//! C# backend: build the OmniSharp server with MSBuild.

use anyhow::{bail, Result};

use super::{run_step, InstallContext};
use crate::util::process::{first_existing_executable, ProcessBuilder};

pub(crate) fn install(ctx: &InstallContext<'_>) -> Result<()> {
    let Some(msbuild) = first_existing_executable(["msbuild", "msbuild.exe", "xbuild"]) else {
        bail!("msbuild or xbuild is required to build the OmniSharp server");
    };

    let builder = ProcessBuilder::new(msbuild)
        .args([
            "/property:Configuration=Release",
            "/property:Platform=Any CPU",
            "/property:TargetFrameworkVersion=v4.5",
        ])
        .cwd(ctx.layout.backend_dir("OmniSharpServer"));

    run_step(ctx, builder, "Building OmniSharp for C# completion")
}
