//! Draws an RGB triangle into a 4x multisampled image, resolves it to a linear
//! image and writes rt.ppm.

fn main() -> anyhow::Result<()> {
    vkt_cases::standalone("msaa")
}
