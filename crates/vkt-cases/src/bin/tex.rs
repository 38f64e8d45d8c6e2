//! Samples a cleared R5G5B5A1 texture onto a triangle and writes tex.ppm and
//! rt.ppm.

fn main() -> anyhow::Result<()> {
    vkt_cases::standalone("tex")
}
