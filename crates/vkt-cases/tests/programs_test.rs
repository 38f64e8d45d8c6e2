//! Host-only checks of the cases' shader programs and pipeline descriptions
//!
//! Nothing here needs a Vulkan device, so these run (and fail) everywhere.
//!
//! Run with: cargo test -p vkt-cases --test programs_test

use vkt_cases::shaders::{self, Program};
use vkt_harness::pipeline::Target;
use vkt_harness::shader::SPIRV_MAGIC;
use vkt_harness::vk;
use vkt_harness::PipelineBuilder;

const OP_DECORATE: u32 = 71;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;

fn compiled(program: Program) -> (Vec<u32>, Vec<u32>) {
    program
        .compile()
        .unwrap_or_else(|e| panic!("{} does not compile: {}", program.name, e))
}

/// (target id, decoration, value) of every `OpDecorate` carrying one literal.
fn decorations(words: &[u32]) -> Vec<(u32, u32, u32)> {
    let mut found = Vec::new();
    let mut i = 5;
    while i < words.len() {
        let count = (words[i] >> 16) as usize;
        let opcode = words[i] & 0xffff;
        assert!(count > 0, "malformed instruction at word {}", i);
        if opcode == OP_DECORATE && count == 4 {
            found.push((words[i + 1], words[i + 2], words[i + 3]));
        }
        i += count;
    }
    found
}

fn target() -> Target {
    Target {
        extent: vk::Extent2D {
            width: 300,
            height: 300,
        },
        samples: vk::SampleCountFlags::TYPE_1,
        has_depth: false,
    }
}

#[test]
fn test_every_program_compiles() {
    for program in shaders::ALL {
        let (vs, fs) = compiled(program);
        assert_eq!(vs[0], SPIRV_MAGIC, "{} vertex", program.name);
        assert_eq!(fs[0], SPIRV_MAGIC, "{} fragment", program.name);
    }
}

#[test]
fn test_tex_image_and_sampler_share_binding_zero() {
    let (_, fs) = compiled(shaders::TEX);
    let decorations = decorations(&fs);

    let bound: Vec<u32> = decorations
        .iter()
        .filter(|(_, d, v)| *d == DECORATION_BINDING && *v == 0)
        .map(|(id, _, _)| *id)
        .collect();
    assert_eq!(bound.len(), 2, "texture and sampler both at binding 0: {:?}", decorations);
    for id in bound {
        assert!(
            decorations.contains(&(id, DECORATION_DESCRIPTOR_SET, 0)),
            "variable %{} is not in set 0",
            id
        );
    }
}

#[test]
fn test_push_const_program_has_no_descriptors() {
    let (vs, fs) = compiled(shaders::PUSH_CONST);
    for words in [&vs, &fs] {
        assert!(decorations(words)
            .iter()
            .all(|(_, d, _)| *d != DECORATION_BINDING && *d != DECORATION_DESCRIPTOR_SET));
    }
}

#[test]
fn test_case_pipelines_pass_validation() {
    let (vs, fs) = compiled(shaders::TEX);
    let tex = PipelineBuilder::new()
        .shader(vk::ShaderStageFlags::VERTEX, vs)
        .shader(vk::ShaderStageFlags::FRAGMENT, fs)
        .add_set_layout(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            vk::ShaderStageFlags::FRAGMENT,
        )
        .vertex_components(&[2]);
    let checked = tex.desc().check(&target(), 128).unwrap();
    assert_eq!(checked.attributes.len(), 1);
    assert_eq!(checked.binding.map(|b| b.stride), Some(8));

    let (vs, fs) = compiled(shaders::PUSH_CONST);
    let push = PipelineBuilder::new()
        .shader(vk::ShaderStageFlags::VERTEX, vs)
        .shader(vk::ShaderStageFlags::FRAGMENT, fs)
        .push_constant(vk::ShaderStageFlags::FRAGMENT, 16);
    let checked = push.desc().check(&target(), 128).unwrap();
    assert!(checked.binding.is_none());

    let (vs, fs) = compiled(shaders::TRIANGLE);
    let msaa = PipelineBuilder::new()
        .shader(vk::ShaderStageFlags::VERTEX, vs)
        .shader(vk::ShaderStageFlags::FRAGMENT, fs)
        .vertex_components(&[2, 3])
        .sample_count(vk::SampleCountFlags::TYPE_4);
    let multisampled = Target {
        samples: vk::SampleCountFlags::TYPE_4,
        ..target()
    };
    let checked = msaa.desc().check(&multisampled, 128).unwrap();
    assert_eq!(checked.samples, vk::SampleCountFlags::TYPE_4);
    assert_eq!(checked.binding.map(|b| b.stride), Some(20));
    assert!(msaa.desc().check(&target(), 128).is_err());
}
