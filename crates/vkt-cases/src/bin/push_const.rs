//! Draws a triangle colored by a push constant and writes rt.ppm.

fn main() -> anyhow::Result<()> {
    vkt_cases::standalone("push_const")
}
