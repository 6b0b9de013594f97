use ash::vk;

use crate::{
    commands::{barrier::GfxImageBarrier, command_pool::GfxCommandPool},
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};

/// 命令缓冲封装
///
/// 封装 Vulkan CommandBuffer，提供类型安全的命令录制接口。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(&gfx, &pool, "my-pass");
/// cmd.begin(&gfx, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
/// cmd.cmd_bind_pipeline(&gfx, vk::PipelineBindPoint::GRAPHICS, pipeline);
/// // 绘制命令...
/// cmd.end(&gfx);
/// ```
#[derive(Clone, Copy)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    _command_pool_handle: vk::CommandPool,
}

// new & init
impl GfxCommandBuffer {
    pub fn new(gfx: &Gfx, command_pool: &GfxCommandPool, debug_name: &str) -> Self {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { gfx.gfx_device().allocate_command_buffers(&info).unwrap()[0] };
        let cmd_buffer = GfxCommandBuffer {
            vk_handle: command_buffer,
            _command_pool_handle: command_pool.handle(),
        };
        gfx.gfx_device().set_debug_name(&cmd_buffer, debug_name);
        cmd_buffer
    }
}

// basic 命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin(&self, gfx: &Gfx, usage_flag: vk::CommandBufferUsageFlags) {
        unsafe {
            gfx.gfx_device()
                .begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
                .unwrap();
        }
    }

    #[inline]
    pub fn end(&self, gfx: &Gfx) {
        unsafe { gfx.gfx_device().end_command_buffer(self.vk_handle).unwrap() }
    }

    #[inline]
    pub fn reset(&self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device().reset_command_buffer(self.vk_handle, vk::CommandBufferResetFlags::empty()).unwrap();
        }
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}

// 数据传输命令
impl GfxCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, gfx: &Gfx, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        unsafe {
            gfx.gfx_device().cmd_copy_buffer(self.vk_handle, src.vk_buffer(), dst.vk_buffer(), regions);
        }
    }

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer_to_image(&self, gfx: &Gfx, copy_info: &vk::CopyBufferToImageInfo2) {
        unsafe { gfx.gfx_device().cmd_copy_buffer_to_image2(self.vk_handle, copy_info) }
    }
}

// 同步命令
impl GfxCommandBuffer {
    /// 全局 memory barrier，作用于所有 buffer 资源
    #[inline]
    pub fn memory_barrier(&self, gfx: &Gfx, barriers: &[vk::MemoryBarrier2]) {
        let dependency_info = vk::DependencyInfo::default().memory_barriers(barriers);
        unsafe {
            gfx.gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    #[inline]
    pub fn image_memory_barrier(&self, gfx: &Gfx, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers: Vec<vk::ImageMemoryBarrier2> = barriers.iter().map(|b| *b.inner()).collect();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            gfx.gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}

// 绘制类型的命令
impl GfxCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_render_pass(&self, gfx: &Gfx, begin_info: &vk::RenderPassBeginInfo, contents: vk::SubpassContents) {
        unsafe {
            gfx.gfx_device().cmd_begin_render_pass(self.vk_handle, begin_info, contents);
        }
    }

    #[inline]
    pub fn cmd_end_render_pass(&self, gfx: &Gfx) {
        unsafe {
            gfx.gfx_device().cmd_end_render_pass(self.vk_handle);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, gfx: &Gfx, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            gfx.gfx_device().cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    #[inline]
    pub fn cmd_bind_descriptor_sets(
        &self,
        gfx: &Gfx,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            gfx.gfx_device().cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    #[inline]
    pub fn cmd_bind_index_buffer(&self, gfx: &Gfx, buffer: vk::Buffer, offset: vk::DeviceSize, ty: vk::IndexType) {
        unsafe {
            gfx.gfx_device().cmd_bind_index_buffer(self.vk_handle, buffer, offset, ty);
        }
    }

    #[inline]
    pub fn cmd_bind_vertex_buffers(
        &self,
        gfx: &Gfx,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            gfx.gfx_device().cmd_bind_vertex_buffers(self.vk_handle, first_binding, buffers, offsets);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_draw_indexed(
        &self,
        gfx: &Gfx,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            gfx.gfx_device().cmd_draw_indexed(
                self.vk_handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    #[inline]
    pub fn cmd_set_viewport(&self, gfx: &Gfx, viewports: &[vk::Viewport]) {
        unsafe {
            gfx.gfx_device().cmd_set_viewport(self.vk_handle, 0, viewports);
        }
    }

    #[inline]
    pub fn cmd_set_scissor(&self, gfx: &Gfx, scissors: &[vk::Rect2D]) {
        unsafe {
            gfx.gfx_device().cmd_set_scissor(self.vk_handle, 0, scissors);
        }
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
