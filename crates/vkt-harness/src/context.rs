use std::cell::{Cell, RefCell, RefMut};
use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::ptr::NonNull;

use ash::vk;
use tracing::{debug, info, warn};
use vkt_core::config::HarnessConfig;

use crate::command::CommandRecorder;
use crate::error::{HarnessError, Result};
use crate::layout::LayoutTracker;
use crate::memory::{find_memory_type_index, Allocation};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"vkt";

/// Where the single command buffer is in its record/submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    Idle,
    Recording,
    InFlight,
}

/// Summary of the selected physical device, for logs and the runner.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
    pub color_sample_counts: vk::SampleCountFlags,
    pub max_push_constants_size: u32,
    pub heap_sizes: Vec<vk::DeviceSize>,
}

impl DeviceInfo {
    pub fn api_version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version)
        )
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, Vulkan {})", self.name, self.device_type, self.api_version_string())
    }
}

/// Device, queue, the one command buffer and its fence.
///
/// Every other harness object borrows a `Context`, so it is always dropped
/// last. Single-threaded by construction (`!Sync`).
pub struct Context {
    // Keeps the loader alive for as long as the instance.
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family_index: u32,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    state: Cell<SubmitState>,
    strict_layouts: bool,
    layouts: RefCell<LayoutTracker>,
    allocated: Cell<vk::DeviceSize>,
}

impl Context {
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }?;
        info!("Vulkan entry loaded successfully");

        let instance = create_instance(&entry, config)?;

        let (physical_device, queue_family_index) = match pick_physical_device(&instance, config) {
            Ok(found) => found,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        // ── Logical Device ──────────────────────────────────
        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)];
        let device_ci = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);
        let device = match unsafe { instance.create_device(physical_device, &device_ci, None) } {
            Ok(device) => device,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e.into());
            }
        };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        // ── Command Buffer + Fence ──────────────────────────
        let (command_pool, command_buffer, fence) =
            match create_submission_objects(&device, queue_family_index) {
                Ok(objects) => objects,
                Err(e) => {
                    unsafe {
                        device.destroy_device(None);
                        instance.destroy_instance(None);
                    }
                    return Err(e);
                }
            };

        let context = Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            command_pool,
            command_buffer,
            fence,
            properties,
            memory_properties,
            state: Cell::new(SubmitState::Idle),
            strict_layouts: config.harness.strict_layouts,
            layouts: RefCell::new(LayoutTracker::new()),
            allocated: Cell::new(0),
        };
        info!("created Vulkan context on {}", context.info());
        Ok(context)
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn info(&self) -> DeviceInfo {
        let name = unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        let heaps = &self.memory_properties.memory_heaps
            [..self.memory_properties.memory_heap_count as usize];
        DeviceInfo {
            name,
            device_type: self.properties.device_type,
            api_version: self.properties.api_version,
            driver_version: self.properties.driver_version,
            color_sample_counts: self.properties.limits.framebuffer_color_sample_counts,
            max_push_constants_size: self.properties.limits.max_push_constants_size,
            heap_sizes: heaps.iter().map(|h| h.size).collect(),
        }
    }

    /// Total bytes of device memory allocated through this context so far.
    pub fn allocated_bytes(&self) -> vk::DeviceSize {
        self.allocated.get()
    }

    // ── Submission ──────────────────────────────────────────

    pub fn state(&self) -> SubmitState {
        self.state.get()
    }

    pub fn is_idle(&self) -> bool {
        self.state.get() == SubmitState::Idle
    }

    /// Fails unless no recording is open and nothing is in flight.
    pub(crate) fn ensure_idle(&self, action: &str) -> Result<()> {
        match self.state.get() {
            SubmitState::Idle => Ok(()),
            SubmitState::Recording => Err(HarnessError::config(format!(
                "cannot {} while a command buffer is being recorded",
                action
            ))),
            SubmitState::InFlight => Err(HarnessError::config(format!(
                "cannot {} before the previous submission has been waited on",
                action
            ))),
        }
    }

    /// Reset and begin the command buffer.
    pub fn begin_command(&self) -> Result<CommandRecorder<'_>> {
        self.ensure_idle("begin a command buffer")?;
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }
        self.layouts.borrow_mut().rollback();
        self.state.set(SubmitState::Recording);
        debug!("began recording command buffer {:?}", self.command_buffer);
        Ok(CommandRecorder::new(self, self.command_buffer, self.strict_layouts))
    }

    /// End the recording and submit it, signalling the context fence.
    pub(crate) fn submit(&self) -> Result<()> {
        if self.state.get() != SubmitState::Recording {
            return Err(HarnessError::config("no command buffer is being recorded"));
        }
        // Any failure below leaves nothing pending on the queue.
        self.state.set(SubmitState::Idle);
        let submitted = unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .and_then(|_| self.device.reset_fences(&[self.fence]))
                .and_then(|_| {
                    let command_buffers = [self.command_buffer];
                    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                    self.device.queue_submit(self.queue, &[submit_info], self.fence)
                })
        };
        if let Err(e) = submitted {
            self.layouts.borrow_mut().rollback();
            return Err(e.into());
        }
        self.layouts.borrow_mut().commit();
        self.state.set(SubmitState::InFlight);
        debug!("submitted command buffer {:?}", self.command_buffer);
        Ok(())
    }

    /// Called when a recorder is dropped without being submitted.
    pub(crate) fn abandon_recording(&self) {
        if self.state.get() != SubmitState::Recording {
            return;
        }
        if let Err(e) = unsafe { self.device.end_command_buffer(self.command_buffer) } {
            warn!("failed to end abandoned command buffer: {:?}", e);
        }
        self.layouts.borrow_mut().rollback();
        self.state.set(SubmitState::Idle);
        warn!("command buffer dropped without being submitted; its layout changes are discarded");
    }

    /// Block until the submitted work has finished and the device is idle.
    /// A no-op wait when nothing is in flight.
    pub fn wait(&self) -> Result<()> {
        if self.state.get() == SubmitState::InFlight {
            unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) }?;
            self.state.set(SubmitState::Idle);
        }
        unsafe { self.device.device_wait_idle() }?;
        debug!("device idle");
        Ok(())
    }

    // ── Layout Tracking ─────────────────────────────────────

    pub fn strict_layouts(&self) -> bool {
        self.strict_layouts
    }

    /// Last layout a recorded barrier or render pass left `image` in. Layouts
    /// from a recording that was dropped unsubmitted are not kept.
    pub fn image_layout(&self, image: vk::Image) -> vk::ImageLayout {
        self.layouts.borrow().state(image).layout
    }

    pub(crate) fn layouts(&self) -> RefMut<'_, LayoutTracker> {
        self.layouts.borrow_mut()
    }

    // ── Memory ──────────────────────────────────────────────

    pub(crate) fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
    ) -> Result<Allocation> {
        let memory_type = find_memory_type_index(&requirements, &self.memory_properties, required)
            .ok_or(HarnessError::NoMemoryType {
                type_bits: requirements.memory_type_bits,
                required,
            })?;
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }?;
        self.allocated.set(self.allocated.get() + requirements.size);
        debug!(
            "allocated {} bytes of device memory (type {}): {:?}",
            requirements.size, memory_type, memory
        );
        Ok(Allocation {
            memory,
            size: requirements.size,
            memory_type,
            properties: self.memory_properties.memory_types[memory_type as usize].property_flags,
        })
    }

    /// Map the whole allocation. The mapping stays valid until [`Context::free`].
    pub(crate) fn map(&self, allocation: &Allocation) -> Result<NonNull<u8>> {
        if !allocation.is_host_visible() {
            return Err(HarnessError::config("cannot map memory that is not host visible"));
        }
        let ptr = unsafe {
            self.device.map_memory(
                allocation.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )
        }?;
        NonNull::new(ptr.cast::<u8>()).ok_or(HarnessError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))
    }

    /// Free an allocation, unmapping it first if it was mapped.
    pub(crate) fn free(&self, allocation: &Allocation, mapped: bool) {
        unsafe {
            if mapped {
                self.device.unmap_memory(allocation.memory);
            }
            self.device.free_memory(allocation.memory, None);
        }
        debug!("freed device memory: {:?}", allocation.memory);
    }

    // ── Format Queries ──────────────────────────────────────

    pub fn image_format_properties(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> std::result::Result<vk::ImageFormatProperties, vk::Result> {
        unsafe {
            self.instance.get_physical_device_image_format_properties(
                self.physical_device,
                format,
                vk::ImageType::TYPE_2D,
                tiling,
                usage,
                vk::ImageCreateFlags::empty(),
            )
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle failed during teardown: {:?}", e);
            }
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        info!(
            "destroyed Vulkan context ({} bytes of device memory allocated over its lifetime)",
            self.allocated.get()
        );
    }
}

// ── Instance ────────────────────────────────────────────────

fn create_instance(entry: &ash::Entry, config: &HarnessConfig) -> Result<ash::Instance> {
    let app_name = CString::new(config.instance.app_name.as_str())
        .map_err(|_| HarnessError::config("application name contains a NUL byte"))?;
    let api = config.instance.api_version;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::make_api_version(0, api.major, api.minor, 0));

    let mut layers: Vec<*const c_char> = Vec::new();
    if config.instance.validation {
        if validation_layer_available(entry)? {
            layers.push(VALIDATION_LAYER.as_ptr());
            info!("enabling {}", VALIDATION_LAYER.to_string_lossy());
        } else {
            warn!(
                "validation requested but {} is not installed",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layers);
    let instance = unsafe { entry.create_instance(&create_info, None) }?;
    info!("created Vulkan instance (API {})", api);
    Ok(instance)
}

fn validation_layer_available(entry: &ash::Entry) -> Result<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }?;
    Ok(layers
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER))
}

// ── Physical Device ─────────────────────────────────────────

fn graphics_queue_family(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

fn pick_physical_device(
    instance: &ash::Instance,
    config: &HarnessConfig,
) -> Result<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }?;
    debug!("enumerated {} physical devices", devices.len());
    if devices.is_empty() {
        return Err(HarnessError::NoDevice("no physical devices".to_string()));
    }

    match config.device.index {
        Some(index) => {
            let physical_device = *devices.get(index).ok_or_else(|| {
                HarnessError::NoDevice(format!(
                    "device index {} out of range ({} devices)",
                    index,
                    devices.len()
                ))
            })?;
            let family = graphics_queue_family(instance, physical_device).ok_or_else(|| {
                HarnessError::NoDevice(format!("device {} has no graphics queue", index))
            })?;
            Ok((physical_device, family))
        }
        None => devices
            .iter()
            .find_map(|&pd| graphics_queue_family(instance, pd).map(|family| (pd, family)))
            .ok_or_else(|| HarnessError::NoDevice("no device with a graphics queue".to_string())),
    }
}

fn create_submission_objects(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<(vk::CommandPool, vk::CommandBuffer, vk::Fence)> {
    let pool_ci = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family_index);
    let pool = unsafe { device.create_command_pool(&pool_ci, None) }?;

    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
        Ok(buffers) => buffers.first().copied(),
        Err(e) => {
            unsafe { device.destroy_command_pool(pool, None) };
            return Err(e.into());
        }
    };
    let Some(command_buffer) = command_buffer else {
        unsafe { device.destroy_command_pool(pool, None) };
        return Err(HarnessError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED));
    };

    let fence = match unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) } {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { device.destroy_command_pool(pool, None) };
            return Err(e.into());
        }
    };
    debug!("created command pool {:?}, command buffer {:?}, fence {:?}", pool, command_buffer, fence);
    Ok((pool, command_buffer, fence))
}
