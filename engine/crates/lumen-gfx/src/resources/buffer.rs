use ash::vk;
use ash::vk::Handle;
use std::ptr;

use vk_mem::Alloc;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在创建时决定是否持久映射
    map_ptr: Option<*mut u8>,

    debug_name: String,

    usage: vk::BufferUsageFlags,
}

impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & init
impl GfxBuffer {
    /// - 优先使用 device memory
    /// - mem_map 为 true 时，buffer 创建后即保持映射状态
    pub fn new(
        gfx: &Gfx,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> Self {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, mut alloc) = unsafe { gfx.allocator().create_buffer(&buffer_ci, &alloc_ci).unwrap() };

        let mut mapped_ptr = None;
        if mem_map {
            unsafe {
                mapped_ptr = Some(gfx.allocator().map_memory(&mut alloc).unwrap());
            }
        }

        gfx.gfx_device().set_object_debug_name(buffer, format!("Buffer::{}", name.as_ref()));
        Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr: mapped_ptr,

            debug_name: name.as_ref().to_string(),

            usage: buffer_usage,
        }
    }

    /// 持久映射的 staging buffer，作为上传到 device local 内存的中转
    #[inline]
    pub fn new_stage_buffer(gfx: &Gfx, size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(gfx, size, vk::BufferUsageFlags::TRANSFER_SRC, true, debug_name)
    }
}

// destroy
impl GfxBuffer {
    #[inline]
    pub fn destroy(mut self, gfx: &Gfx) {
        self.destroy_mut(gfx);
    }

    pub fn destroy_mut(&mut self, gfx: &Gfx) {
        log::debug!("Destroying GfxBuffer: {}", self.debug_name);

        unsafe {
            if self.map_ptr.take().is_some() {
                gfx.allocator().unmap_memory(&mut self.allocation);
            }
            gfx.allocator().destroy_buffer(self.handle, &mut self.allocation);
        }
        self.handle = vk::Buffer::null();
    }
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxBuffer ({}) must be destroyed before being dropped.", self.debug_name);
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.map_ptr.expect("Buffer is not mapped, create it with mem_map = true")
    }
}

// tools
impl GfxBuffer {
    #[inline]
    pub fn flush(&self, gfx: &Gfx, offset: vk::DeviceSize, size: vk::DeviceSize) {
        gfx.allocator().flush_allocation(&self.allocation, offset, size).unwrap();
    }

    /// 通过 mem map 的方式将数据写入 buffer 的指定偏移处
    pub fn write_bytes(&self, gfx: &Gfx, offset: vk::DeviceSize, data: &[u8]) {
        debug_assert!(offset + data.len() as vk::DeviceSize <= self.size);
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.mapped_ptr().add(offset as usize), data.len());
        }
        gfx.allocator().flush_allocation(&self.allocation, offset, data.len() as vk::DeviceSize).unwrap();
    }
}
