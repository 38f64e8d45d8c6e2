//! GLSL to SPIR-V via naga.
//!
//! Sources use Vulkan GLSL conventions (`gl_VertexIndex`, `layout(push_constant)`,
//! Y pointing down in clip space), so the SPIR-V writer is told not to flip
//! coordinates.
//!
//! naga's GLSL frontend has no `sampler2D` uniforms, so a combined image
//! sampler is declared as a `texture2D` and a `sampler` sharing one binding.
//! Vulkan accepts that pair against a COMBINED_IMAGE_SAMPLER descriptor, but
//! naga's binding validation treats it as a collision and is switched off.

use ash::vk;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Shader stage as both naga and Vulkan name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Stage::Vertex => vk::ShaderStageFlags::VERTEX,
            Stage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    fn to_naga(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// Compile a GLSL shader whose entry point is `main`.
pub fn compile_glsl(stage: Stage, source: &str) -> Result<Vec<u32>> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(stage.to_naga()), source)
        .map_err(|e| HarnessError::Shader(format!("{:?} parse error: {:?}", stage, e)))?;

    let info = naga::valid::Validator::new(validation_flags(), naga::valid::Capabilities::all())
    .validate(&module)
    .map_err(|e| HarnessError::Shader(format!("{:?} validation failed: {:?}", stage, e)))?;

    let mut options = naga::back::spv::Options {
        lang_version: (1, 0),
        ..Default::default()
    };
    options
        .flags
        .remove(naga::back::spv::WriterFlags::ADJUST_COORDINATE_SPACE);
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage.to_naga(),
        entry_point: "main".to_string(),
    };

    let mut writer = naga::back::spv::Writer::new(&options)
        .map_err(|e| HarnessError::Shader(format!("SPIR-V writer: {:?}", e)))?;
    let mut words = Vec::new();
    writer
        .write(&module, &info, Some(&pipeline_options), &None, &mut words)
        .map_err(|e| HarnessError::Shader(format!("SPIR-V generation failed: {:?}", e)))?;
    debug!("compiled {:?} shader to {} SPIR-V words", stage, words.len());
    Ok(words)
}

fn validation_flags() -> naga::valid::ValidationFlags {
    naga::valid::ValidationFlags::all() - naga::valid::ValidationFlags::BINDINGS
}

/// Reinterpret a little-endian SPIR-V byte blob as words.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(HarnessError::Shader(format!(
            "SPIR-V blob of {} bytes is not a whole number of words",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(HarnessError::Shader("missing SPIR-V magic number".to_string()));
    }
    Ok(words)
}

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
#version 450
layout(location = 0) in vec2 pos;
void main() {
    gl_Position = vec4(pos, 0.0, 1.0);
}
"#;

    const FRAGMENT: &str = r#"
#version 450
layout(push_constant) uniform Push {
    vec4 color;
} pc;
layout(location = 0) out vec4 out_color;
void main() {
    out_color = pc.color;
}
"#;

    #[test]
    fn compiles_vertex_and_fragment() {
        for (stage, src) in [(Stage::Vertex, VERTEX), (Stage::Fragment, FRAGMENT)] {
            let words = compile_glsl(stage, src).unwrap();
            assert_eq!(words[0], SPIRV_MAGIC);
        }
    }

    const ALIASED_SAMPLER: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform texture2D tex;
layout(set = 0, binding = 0) uniform sampler tex_sampler;
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;
void main() {
    out_color = texture(sampler2D(tex, tex_sampler), v_uv);
}
"#;

    #[test]
    fn image_and_sampler_may_share_a_binding() {
        let words = compile_glsl(Stage::Fragment, ALIASED_SAMPLER).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn type_errors_still_fail_validation() {
        let src = "#version 450\nlayout(location = 0) out vec4 c;\nvoid main() { c = vec3(1.0); }";
        assert!(matches!(
            compile_glsl(Stage::Fragment, src),
            Err(HarnessError::Shader(_))
        ));
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = compile_glsl(Stage::Fragment, "#version 450\nvoid main() { oops }").unwrap_err();
        assert!(matches!(err, HarnessError::Shader(_)));
    }

    #[test]
    fn byte_blobs_round_trip() {
        let words = compile_glsl(Stage::Vertex, VERTEX).unwrap();
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(spirv_from_bytes(&bytes).unwrap(), words);
        assert!(spirv_from_bytes(&bytes[1..]).is_err());
        assert!(spirv_from_bytes(&[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn stage_flags() {
        assert_eq!(Stage::Vertex.to_vk(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(Stage::Fragment.to_vk(), vk::ShaderStageFlags::FRAGMENT);
    }
}
