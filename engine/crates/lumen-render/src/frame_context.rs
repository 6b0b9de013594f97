//! Frames-in-flight 的帧调度
//!
//! 每个在途帧一个槽位：命令池、命令缓冲复用列表、fence、两个交换链
//! 同步信号量，以及一条延迟销毁队列。CPU 在重用槽位前等待它的 fence，
//! 因此槽位里的一切在 `begin_frame` 返回后都可以安全复用或销毁。

use ash::vk;
use lumen_gfx::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore},
    gfx::Gfx,
};

use crate::resource_manager::ResourceManager;

/// 挂在某个帧槽位上的延迟动作，在该槽位的 fence 等到之后执行
pub type DeferredAction = Box<dyn FnOnce(&Gfx, &mut ResourceManager)>;

struct FrameSlot {
    command_pool: GfxCommandPool,
    free_cmds: Vec<GfxCommandBuffer>,
    used_cmds: Vec<GfxCommandBuffer>,

    fence: GfxFence,
    image_available: GfxSemaphore,
    render_finished: GfxSemaphore,

    deferred: Vec<DeferredAction>,
}

pub struct FrameContext {
    slots: Vec<FrameSlot>,
    frame_index: usize,
}

// new & init
impl FrameContext {
    pub fn new(gfx: &Gfx, frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0);
        let slots = (0..frames_in_flight)
            .map(|i| {
                let label = Self::label_of(i);
                FrameSlot {
                    command_pool: GfxCommandPool::new(
                        gfx,
                        vk::CommandPoolCreateFlags::empty(),
                        &format!("frame-{label}"),
                    ),
                    free_cmds: Vec::new(),
                    used_cmds: Vec::new(),
                    // 创建为 signaled，首轮 begin_frame 不会卡住
                    fence: GfxFence::new(gfx, true, &format!("frame-{label}")),
                    image_available: GfxSemaphore::new(gfx, &format!("image-available-{label}")),
                    render_finished: GfxSemaphore::new(gfx, &format!("render-finished-{label}")),
                    deferred: Vec::new(),
                }
            })
            .collect();
        Self {
            slots,
            frame_index: 0,
        }
    }

    fn label_of(index: usize) -> char {
        (b'A' + (index % 26) as u8) as char
    }
}

// getters
impl FrameContext {
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// 当前槽位的标签（A/B/C...），用于日志和 debug name
    #[inline]
    pub fn frame_label(&self) -> char {
        Self::label_of(self.frame_index)
    }

    #[inline]
    pub fn fence(&self) -> &GfxFence {
        &self.slots[self.frame_index].fence
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &GfxSemaphore {
        &self.slots[self.frame_index].image_available
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &GfxSemaphore {
        &self.slots[self.frame_index].render_finished
    }
}

// 帧循环
impl FrameContext {
    /// 等待当前槽位上一轮的 GPU 工作结束，然后复位它
    ///
    /// fence 等待带固定超时，超时视为设备 hang，直接终止。
    /// 延迟动作按注册的逆序执行，后构建的资源先销毁。
    pub fn begin_frame(&mut self, gfx: &Gfx, rm: &mut ResourceManager) {
        let slot = &mut self.slots[self.frame_index];
        slot.fence.wait(gfx);
        slot.fence.reset(gfx);

        slot.command_pool.reset_all_buffers(gfx);
        slot.free_cmds.append(&mut slot.used_cmds);

        for action in slot.deferred.drain(..).rev() {
            action(gfx, rm);
        }
    }

    /// 取一个可录制的命令缓冲，优先复用本槽位已分配的
    pub fn acquire_command_buffer(&mut self, gfx: &Gfx, debug_name: &str) -> GfxCommandBuffer {
        let slot = &mut self.slots[self.frame_index];
        let cmd = slot
            .free_cmds
            .pop()
            .unwrap_or_else(|| GfxCommandBuffer::new(gfx, &slot.command_pool, debug_name));
        slot.used_cmds.push(cmd);
        cmd
    }

    /// 注册一个延迟动作，当前槽位下次被重用（fence 等到）时执行
    pub fn defer(&mut self, action: impl FnOnce(&Gfx, &mut ResourceManager) + 'static) {
        self.slots[self.frame_index].deferred.push(Box::new(action));
    }

    /// 推进到下一个槽位
    #[inline]
    pub fn end_frame(&mut self) {
        self.frame_index = (self.frame_index + 1) % self.slots.len();
    }
}

// destroy
impl FrameContext {
    /// 等设备空闲后销毁所有槽位，未执行的延迟动作按逆序补跑
    pub fn destroy(mut self, gfx: &Gfx, rm: &mut ResourceManager) {
        gfx.wait_idle();
        for mut slot in self.slots.drain(..) {
            for action in slot.deferred.drain(..).rev() {
                action(gfx, rm);
            }
            slot.fence.destroy(gfx);
            slot.image_available.destroy(gfx);
            slot.render_finished.destroy(gfx);
            slot.command_pool.destroy(gfx);
        }
    }
}

impl Drop for FrameContext {
    fn drop(&mut self) {
        debug_assert!(self.slots.is_empty(), "FrameContext must be destroyed before being dropped.");
    }
}
