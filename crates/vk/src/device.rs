use ash::vk;
use basalt_binding::BackendLimits;
use std::{ops::Deref, sync::Arc};

pub trait HasDevice {
    fn device(&self) -> &Arc<Device>;
}

/// A logical device created by the application, together with the physical device
/// properties binding needs. The device itself is not destroyed on drop.
pub struct Device {
    device: ash::Device,
    limits: vk::PhysicalDeviceLimits,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl Device {
    /// # Safety
    /// `device` must have been created from `physical_device` and must outlive every object
    /// created through the returned value.
    pub unsafe fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        tracing::info!(device = ?device.handle(), "wrapping device");
        Self {
            device,
            limits: properties.limits,
            memory_properties,
        }
    }
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }
    pub fn memory_types(&self) -> &[vk::MemoryType] {
        &self.memory_properties.memory_types[..self.memory_properties.memory_type_count as usize]
    }
    pub fn backend_limits(&self) -> BackendLimits {
        BackendLimits {
            max_push_constant_size: self.limits.max_push_constants_size,
            min_uniform_buffer_offset_alignment: self.limits.min_uniform_buffer_offset_alignment,
        }
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
