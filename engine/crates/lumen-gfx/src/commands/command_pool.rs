use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family_index: u32,

    _debug_name: String,
    valid: bool,
}

// init & destroy
impl GfxCommandPool {
    pub fn new(gfx: &Gfx, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> Self {
        let gfx_device = gfx.gfx_device();
        let queue_family_index = gfx.gfx_queue_family().queue_family_index;
        let pool = unsafe {
            gfx_device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(flags),
                    None,
                )
                .unwrap()
        };

        let command_pool = Self {
            handle: pool,
            queue_family_index,
            _debug_name: debug_name.to_string(),
            valid: true,
        };
        gfx_device.set_debug_name(&command_pool, debug_name);
        command_pool
    }

    pub fn destroy(mut self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device().destroy_command_pool(self.handle, None);
        }
        self.valid = false;
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl GfxCommandPool {
    /// 这个调用并不会释放资源，而是将 pool 内的 command buffer 设置到初始状态
    ///
    /// reset 之后，pool 内的 command buffer 又可以重新录制命令
    pub fn reset_all_buffers(&self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device().reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty()).unwrap();
        }
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        debug_assert!(!self.valid, "GfxCommandPool must be destroyed manually.");
    }
}
