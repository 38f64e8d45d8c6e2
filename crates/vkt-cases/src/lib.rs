//! The single-shot correctness cases.
//!
//! Each case renders one triangle into a 300x300 offscreen target through
//! `vkt-harness` and hands back the frames it produced. [`run_case`] writes
//! them as PPM files; the `msaa`, `push_const`, `tex` and `vktest` binaries
//! are thin wrappers around [`standalone`].

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::info;
use vkt_harness::{Context, Frame, HarnessConfig};

mod common;
pub mod msaa;
pub mod push_const;
pub mod shaders;
pub mod tex;

pub use msaa::MsaaCase;
pub use push_const::PushConstCase;
pub use tex::TexCase;

/// One image a case produced, and the file it is dumped to.
#[derive(Debug, Clone)]
pub struct Output {
    pub file: &'static str,
    pub frame: Frame,
}

/// A single-shot rendering case.
pub trait Case {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Build, record, submit, wait and read back. Everything the case creates
    /// is destroyed before this returns.
    fn render(&self, ctx: &Context) -> vkt_harness::Result<Vec<Output>>;
}

/// Every case, in the order the runner executes them.
pub fn all() -> Vec<Box<dyn Case>> {
    vec![
        Box::new(MsaaCase::default()),
        Box::new(PushConstCase::default()),
        Box::new(TexCase::default()),
        Box::new(TexCase::vktest()),
    ]
}

pub fn find(name: &str) -> Option<Box<dyn Case>> {
    all().into_iter().find(|c| c.name() == name)
}

/// Render `case` and write its outputs into `out_dir`. Returns the paths written.
pub fn run_case(case: &dyn Case, ctx: &Context, out_dir: &Path) -> vkt_harness::Result<Vec<PathBuf>> {
    info!("running case '{}'", case.name());
    let outputs = case.render(ctx)?;
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let path = out_dir.join(output.file);
        output.frame.write_ppm(&path)?;
        info!(
            "wrote {} ({}x{}, {:?})",
            path.display(),
            output.frame.width(),
            output.frame.height(),
            output.frame.format()
        );
        written.push(path);
    }
    Ok(written)
}

/// Entry point of the per-case binaries: load the default config, create a
/// context, run the named case into the configured output directory.
pub fn standalone(name: &str) -> anyhow::Result<()> {
    vkt_common::init_logging();
    let config = HarnessConfig::load_or_default(vkt_core::config::default_config_path())
        .context("failed to load config")?;
    let case = find(name).with_context(|| format!("unknown case '{}'", name))?;

    let ctx = Context::new(&config).context("failed to create Vulkan context")?;
    info!("device: {}", ctx.info());
    run_case(case.as_ref(), &ctx, &config.output.dir)
        .with_context(|| format!("case '{}' failed", name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique() {
        let names: Vec<_> = all().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["msaa", "push_const", "tex", "vktest"]);
    }

    #[test]
    fn find_by_name() {
        assert_eq!(find("tex").map(|c| c.name()), Some("tex"));
        assert_eq!(find("vktest").map(|c| c.name()), Some("vktest"));
        assert!(find("compute").is_none());
    }
}
