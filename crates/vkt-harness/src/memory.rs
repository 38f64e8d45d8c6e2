use ash::vk;

/// Device memory backing one buffer or image.
#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub memory_type: u32,
    pub properties: vk::MemoryPropertyFlags,
}

impl Allocation {
    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

/// First memory type allowed by `mem_req` whose flags contain `required`.
pub fn find_memory_type_index(
    mem_req: &vk::MemoryRequirements,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem_props.memory_type_count).find(|&i| {
        let type_supported = (mem_req.memory_type_bits & (1 << i)) != 0;
        type_supported && mem_props.memory_types[i as usize].property_flags.contains(required)
    })
}

/// Memory flags requested for a resource the host reads or writes.
pub const HOST_ACCESS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);
