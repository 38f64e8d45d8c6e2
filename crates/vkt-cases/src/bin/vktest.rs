//! Smoke test: samples a yellow texture onto a triangle and writes tex.ppm and
//! rt.ppm.

fn main() -> anyhow::Result<()> {
    vkt_cases::standalone("vktest")
}
