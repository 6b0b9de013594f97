use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// # Destroy
/// 不应该实现 Drop 自动销毁，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxFence {
    fence: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// 等待 fence 的固定超时时间；超过即认为设备已经 hang 住，直接终止
    const WAIT_TIMEOUT_NS: u64 = 10_000_000_000;

    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(gfx: &Gfx, signaled: bool, debug_name: &str) -> Self {
        let gfx_device = gfx.gfx_device();
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence =
            unsafe { gfx_device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None).unwrap() };

        let fence = Self { fence };
        gfx_device.set_debug_name(&fence, debug_name);
        fence
    }

    #[inline]
    pub fn destroy(self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device().destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence，超时视为致命错误
    #[inline]
    pub fn wait(&self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device()
                .wait_for_fences(std::slice::from_ref(&self.fence), true, Self::WAIT_TIMEOUT_NS)
                .expect("fence wait failed or timed out");
        }
    }

    #[inline]
    pub fn reset(&self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device().reset_fences(std::slice::from_ref(&self.fence)).unwrap();
        }
    }
}
