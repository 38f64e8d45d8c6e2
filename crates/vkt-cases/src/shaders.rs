//! GLSL sources of the cases, compiled to SPIR-V when a pipeline is built.

use vkt_harness::shader::{compile_glsl, Stage};
use vkt_harness::Result;

pub const TRIANGLE_VERT: &str = include_str!("../shaders/triangle.vert");
pub const TRIANGLE_FRAG: &str = include_str!("../shaders/triangle.frag");
pub const PUSH_CONST_VERT: &str = include_str!("../shaders/push_const.vert");
pub const PUSH_CONST_FRAG: &str = include_str!("../shaders/push_const.frag");
pub const TEX_VERT: &str = include_str!("../shaders/tex.vert");
pub const TEX_FRAG: &str = include_str!("../shaders/tex.frag");

/// A vertex/fragment pair.
#[derive(Debug, Clone, Copy)]
pub struct Program {
    pub name: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

pub const TRIANGLE: Program = Program {
    name: "triangle",
    vertex: TRIANGLE_VERT,
    fragment: TRIANGLE_FRAG,
};

pub const PUSH_CONST: Program = Program {
    name: "push_const",
    vertex: PUSH_CONST_VERT,
    fragment: PUSH_CONST_FRAG,
};

pub const TEX: Program = Program {
    name: "tex",
    vertex: TEX_VERT,
    fragment: TEX_FRAG,
};

pub const ALL: [Program; 3] = [TRIANGLE, PUSH_CONST, TEX];

impl Program {
    /// SPIR-V for (vertex, fragment).
    pub fn compile(&self) -> Result<(Vec<u32>, Vec<u32>)> {
        Ok((
            compile_glsl(Stage::Vertex, self.vertex)?,
            compile_glsl(Stage::Fragment, self.fragment)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkt_harness::shader::SPIRV_MAGIC;

    #[test]
    fn every_program_compiles() {
        for program in ALL {
            let (vs, fs) = program
                .compile()
                .unwrap_or_else(|e| panic!("{}: {}", program.name, e));
            assert_eq!(vs[0], SPIRV_MAGIC, "{} vertex", program.name);
            assert_eq!(fs[0], SPIRV_MAGIC, "{} fragment", program.name);
        }
    }
}
