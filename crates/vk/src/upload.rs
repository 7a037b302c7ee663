use crate::{convert::find_memory_type, Device, HasDevice};
use ash::{
    prelude::VkResult,
    vk::{self, Handle},
};
use basalt_binding::{NativeHandle, UploadPage, UploadPages};
use std::sync::Arc;

const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Persistently mapped uniform buffers in host-visible, coherent memory.
pub struct HostVisiblePages {
    device: Arc<Device>,
    usage: vk::BufferUsageFlags,
}

impl HostVisiblePages {
    pub fn new(device: Arc<Device>) -> VkResult<Self> {
        if find_memory_type(device.memory_types(), u32::MAX, HOST_COHERENT).is_none() {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok(Self {
            device,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
        })
    }
    /// Extra usage flags for every page, e.g. `STORAGE_BUFFER`.
    pub fn with_usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }
}

impl HasDevice for HostVisiblePages {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

pub struct HostVisiblePage {
    device: Arc<Device>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    size: vk::DeviceSize,
}

unsafe impl Send for HostVisiblePage {}
unsafe impl Sync for HostVisiblePage {}

impl Drop for HostVisiblePage {
    fn drop(&mut self) {
        if self.buffer != vk::Buffer::null() {
            unsafe {
                self.device.destroy_buffer(self.buffer, None);
            }
        }
        if self.memory != vk::DeviceMemory::null() {
            unsafe {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

impl UploadPage for HostVisiblePage {
    fn buffer(&self) -> NativeHandle {
        NativeHandle(self.buffer.as_raw())
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn write(&mut self, offset: u64, bytes: &[u8]) {
        assert!(offset + bytes.len() as u64 <= self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset as usize), bytes.len());
        }
    }
}

impl UploadPages for HostVisiblePages {
    type Page = HostVisiblePage;
    type Error = vk::Result;

    fn create_page(&mut self, size: u64) -> VkResult<HostVisiblePage> {
        // Freed by the page's destructor if any later step fails.
        let mut page = HostVisiblePage {
            device: self.device.clone(),
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            ptr: std::ptr::null_mut(),
            size,
        };
        unsafe {
            page.buffer = self.device.create_buffer(
                &vk::BufferCreateInfo {
                    size,
                    usage: self.usage,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    ..Default::default()
                },
                None,
            )?;
            let requirements = self.device.get_buffer_memory_requirements(page.buffer);
            let memory_type_index = find_memory_type(
                self.device.memory_types(),
                requirements.memory_type_bits,
                HOST_COHERENT,
            )
            .ok_or(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;
            page.memory = self.device.allocate_memory(
                &vk::MemoryAllocateInfo {
                    allocation_size: requirements.size,
                    memory_type_index,
                    ..Default::default()
                },
                None,
            )?;
            self.device.bind_buffer_memory(page.buffer, page.memory, 0)?;
            page.ptr = self.device.map_memory(
                page.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;
        }
        tracing::info!(buffer = ?page.buffer, size, "created ordinary data page");
        Ok(page)
    }
}
