//! 资源管理器
//!
//! 所有 GPU 资源的唯一入口：创建即返回 handle，初始数据通过内部的
//! staging pool 与 pre/post 两个上传命令缓冲异步搬运。
//!
//! 每帧的协议是固定的：任意多次 `create_*` / `remove_*`，一次
//! [`ResourceManager::commit`]（把累积的屏障和拷贝作为一次提交送入队列），
//! 然后一次 [`ResourceManager::next_frame`]。staging buffer 与上传命令
//! 缓冲按 2 帧的窗口轮转复用，依赖调用方的帧同步保证旧帧已经执行完毕。

use std::cell::Cell;
use std::io::Cursor;
use std::mem::ManuallyDrop;

use ash::vk;
use itertools::Itertools;
use lumen_crate_tools::{
    arena::{GenerationalArena, Handle},
    frame_pool::FramePool,
};
use lumen_gfx::{
    commands::{
        barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool,
        submit_info::GfxSubmitInfo,
    },
    gfx::Gfx,
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageCreateInfo},
    },
};

use crate::resources::*;

/// staging 与上传命令缓冲的轮转窗口
const STAGING_FRAME_COUNT: u32 = 2;
/// 新建 staging buffer 的默认大小，过大的单次上传按需放大
const DEFAULT_STAGING_BUFFER_SIZE: vk::DeviceSize = 128 * 1024 * 1024;

/// staging buffer 的 bump 记账，与设备资源分开存放，轮转规则可以单独验证
#[derive(Clone, Copy, Debug, PartialEq)]
struct StagingBlock {
    capacity: vk::DeviceSize,
    used_offset: vk::DeviceSize,
    /// 最后一次划出空间的帧号，回收以此为准
    frame_acquired: u32,
}

impl StagingBlock {
    /// 剩余空间足够时划出 size 字节并把块重新标记到当前帧
    fn try_bump(&mut self, size: vk::DeviceSize, frame: u32) -> Option<vk::DeviceSize> {
        if self.used_offset + size > self.capacity {
            return None;
        }
        let offset = self.used_offset;
        self.used_offset += size;
        self.frame_acquired = frame;
        Some(offset)
    }

    /// 最后使用这个块的帧已经轮转回来，块上的 GPU 读取必然已经结束
    fn recyclable(&self, frame: u32) -> bool {
        self.frame_acquired == frame
    }
}

/// 持久映射的 TRANSFER_SRC buffer，内部以 bump 方式切分
struct StagingBuffer {
    buffer: GfxBuffer,
    block: StagingBlock,
}

/// commit 与 next_frame 之间的门闩
///
/// 每帧 commit 只生效一次，重复调用是 no-op；没有累积上传的帧
/// commit 也不会触碰队列。next_frame 要求本帧已经 commit 过。
#[derive(Default)]
struct CommitGate {
    committed: bool,
    need_submit: bool,
}

impl CommitGate {
    /// 有上传被录制时标记，下一次 commit 需要真正提交
    fn mark_upload(&mut self) {
        self.need_submit = true;
    }

    /// 闩上 commit；返回 true 表示这次调用需要向队列提交
    fn try_commit(&mut self) -> bool {
        if self.committed {
            return false;
        }
        self.committed = true;
        std::mem::take(&mut self.need_submit)
    }

    /// next_frame 的前置检查，清掉闩等待下一帧
    fn end_frame(&mut self) {
        assert!(self.committed, "next_frame called without a commit");
        self.committed = false;
    }
}

pub struct ResourceManager {
    buffers: GenerationalArena<Buffer>,
    textures: GenerationalArena<Texture>,
    shaders: GenerationalArena<Shader>,
    render_pass_layouts: GenerationalArena<RenderPassLayout>,
    render_passes: GenerationalArena<RenderPass>,
    pipeline_layouts: GenerationalArena<PipelineLayout>,
    pipelines: GenerationalArena<Pipeline>,
    descriptor_sets: GenerationalArena<DescriptorSet>,
    samplers: GenerationalArena<Sampler>,

    upload_cmd_pool: ManuallyDrop<GfxCommandPool>,
    upload_cmds: FramePool<GfxCommandBuffer>,
    /// 录制本帧上传的 layout 准备屏障，先于 post_cmd 提交
    pre_cmd: GfxCommandBuffer,
    /// 录制本帧的拷贝命令与上传完成屏障
    post_cmd: GfxCommandBuffer,

    frame: u32,
    gate: CommitGate,

    staging_free: Vec<StagingBuffer>,
    staging_used: Vec<StagingBuffer>,

    /// 本帧所有 buffer 上传的目标端聚合，commit 时化作一个全局 memory barrier
    aggregate_dst_stages: vk::PipelineStageFlags2,
    aggregate_dst_access: vk::AccessFlags2,
    pre_image_barriers: Vec<GfxImageBarrier>,
    post_image_barriers: Vec<GfxImageBarrier>,

    /// 没有 binding 的 set 共享这一个占位 layout / set
    empty_set_layout: vk::DescriptorSetLayout,
    empty_pool: vk::DescriptorPool,
    empty_set: vk::DescriptorSet,

    #[cfg(debug_assertions)]
    destroyed: Cell<bool>,
}

// new & init
impl ResourceManager {
    pub fn new(gfx: &Gfx) -> Self {
        log::info!("Creating ResourceManager");

        let upload_cmd_pool =
            GfxCommandPool::new(gfx, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER, "ResourceManager::upload");

        let mut upload_cmds = FramePool::new(STAGING_FRAME_COUNT);
        let pre_cmd = upload_cmds.get_or_add(|| GfxCommandBuffer::new(gfx, &upload_cmd_pool, "upload-pre"));
        let post_cmd = upload_cmds.get_or_add(|| GfxCommandBuffer::new(gfx, &upload_cmd_pool, "upload-post"));
        pre_cmd.begin(gfx, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        post_cmd.begin(gfx, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let gfx_device = gfx.gfx_device();
        let empty_set_layout = unsafe {
            gfx_device.create_descriptor_set_layout(&vk::DescriptorSetLayoutCreateInfo::default(), None).unwrap()
        };
        let pool_sizes =
            [vk::DescriptorPoolSize::default().ty(vk::DescriptorType::UNIFORM_BUFFER).descriptor_count(1)];
        let empty_pool = unsafe {
            gfx_device
                .create_descriptor_pool(
                    &vk::DescriptorPoolCreateInfo::default().max_sets(1).pool_sizes(&pool_sizes),
                    None,
                )
                .unwrap()
        };
        let empty_set = unsafe {
            gfx_device
                .allocate_descriptor_sets(
                    &vk::DescriptorSetAllocateInfo::default()
                        .descriptor_pool(empty_pool)
                        .set_layouts(std::slice::from_ref(&empty_set_layout)),
                )
                .unwrap()[0]
        };

        let frame = upload_cmds.current_frame();
        Self {
            buffers: GenerationalArena::new(),
            textures: GenerationalArena::new(),
            shaders: GenerationalArena::new(),
            render_pass_layouts: GenerationalArena::new(),
            render_passes: GenerationalArena::new(),
            pipeline_layouts: GenerationalArena::new(),
            pipelines: GenerationalArena::new(),
            descriptor_sets: GenerationalArena::new(),
            samplers: GenerationalArena::new(),

            upload_cmd_pool: ManuallyDrop::new(upload_cmd_pool),
            upload_cmds,
            pre_cmd,
            post_cmd,

            frame,
            gate: CommitGate::default(),

            staging_free: Vec::new(),
            staging_used: Vec::new(),

            aggregate_dst_stages: vk::PipelineStageFlags2::NONE,
            aggregate_dst_access: vk::AccessFlags2::NONE,
            pre_image_barriers: Vec::new(),
            post_image_barriers: Vec::new(),

            empty_set_layout,
            empty_pool,
            empty_set,

            #[cfg(debug_assertions)]
            destroyed: Cell::new(false),
        }
    }
}

// buffer
impl ResourceManager {
    /// 创建 buffer 并（可选）填入初始数据
    ///
    /// handle 立即可用；device local 的初始数据要等下一次 commit 提交的
    /// 命令执行之后才对 GPU 可见。
    pub fn create_buffer(&mut self, gfx: &Gfx, info: &BufferInfo) -> Handle<Buffer> {
        assert!(info.size > 0, "buffer '{}' has zero size", info.name);

        let mem_map = info.map == BufferMap::PersistentlyMapped;
        let mut usage = info.usage;
        if info.initial_data.is_some() && !mem_map {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        let buffer = GfxBuffer::new(gfx, info.size, usage, mem_map, info.name);

        if let Some(data) = info.initial_data {
            assert!(data.len() as vk::DeviceSize <= info.size);
            if mem_map {
                // host 可见，直接写
                buffer.write_bytes(gfx, 0, data);
            } else {
                let (idx, offset) = self.acquire_staging_buffer(gfx, data.len() as vk::DeviceSize);
                let staging = &self.staging_used[idx];
                staging.buffer.write_bytes(gfx, offset, data);
                self.post_cmd.cmd_copy_buffer(
                    gfx,
                    &staging.buffer,
                    &buffer,
                    &[vk::BufferCopy {
                        src_offset: offset,
                        dst_offset: 0,
                        size: data.len() as vk::DeviceSize,
                    }],
                );

                let (stages, access) = derive_buffer_stages_access(info.usage);
                self.aggregate_dst_stages |= stages;
                self.aggregate_dst_access |= access;
                self.gate.mark_upload();
            }
        }

        self.buffers.add(Buffer {
            gfx_buffer: buffer,
            map: info.map,
        })
    }

    /// 创建持久映射的 buffer，同时返回映射指针
    pub fn create_buffer_mapped(&mut self, gfx: &Gfx, info: &BufferInfo) -> (Handle<Buffer>, *mut u8) {
        assert_eq!(info.map, BufferMap::PersistentlyMapped, "create_buffer_mapped requires a persistently mapped buffer");
        let handle = self.create_buffer(gfx, info);
        (handle, self.map_buffer(handle))
    }

    /// 销毁 buffer 并回收 handle 槽位
    ///
    /// 调用方需要保证 GPU 已经不再使用它（通常通过 frame context 的延迟队列）。
    pub fn remove_buffer(&mut self, gfx: &Gfx, handle: Handle<Buffer>) {
        let mut record = self.buffers.remove(handle);
        record.gfx_buffer.destroy_mut(gfx);
    }
}

// texture
impl ResourceManager {
    /// 创建 2D/array/cube texture 及其默认 view
    ///
    /// 稳定 layout 与屏障的目标端由 usage 推导；当 usage 同时包含多个决定
    /// layout 的 bit 且没有显式 `initial_layout` 时按固定优先级取第一个并
    /// 打印警告。有初始数据时 mip 0 的所有 layer 从 staging 拷入。
    pub fn create_texture(&mut self, gfx: &Gfx, info: &TextureInfo) -> Handle<Texture> {
        assert!(info.format != vk::Format::UNDEFINED);
        assert!(info.array_layers >= 1 && info.mip_levels >= 1);

        let derived = derive_texture_usage(info.usage);
        if derived.ambiguous && info.initial_layout.is_none() {
            log::warn!(
                "texture '{}': usage {:?} maps to more than one layout, defaulting to {:?}",
                info.name,
                info.usage,
                derived.layout
            );
        }
        let layout = info.initial_layout.unwrap_or(derived.layout);
        assert!(layout != vk::ImageLayout::UNDEFINED, "texture '{}' has no usable layout", info.name);
        let aspect =
            if is_depth_format(info.format) { vk::ImageAspectFlags::DEPTH } else { vk::ImageAspectFlags::COLOR };

        if let Some(data) = info.initial_data {
            let texel_size = format_texel_size(info.format);
            if texel_size > 0 {
                let expected = info.extent.width as vk::DeviceSize
                    * info.extent.height as vk::DeviceSize
                    * info.array_layers as vk::DeviceSize
                    * texel_size;
                assert!(
                    data.len() as vk::DeviceSize >= expected,
                    "texture '{}': initial data is {} bytes, mip 0 of all layers needs {}",
                    info.name,
                    data.len(),
                    expected
                );
            }
        }

        let mut usage = info.usage;
        if info.initial_data.is_some() {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        let mut image_ci = GfxImageCreateInfo::new_image_2d_info(info.extent, info.format, usage)
            .array_layers(info.array_layers)
            .mip_levels(info.mip_levels);
        if info.cube_compatible {
            image_ci = image_ci.flags(vk::ImageCreateFlags::CUBE_COMPATIBLE);
        }
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let image = GfxImage::new(gfx, &image_ci, &alloc_ci, info.name);

        let view_type = if info.cube_compatible && info.array_layers == 6 {
            vk::ImageViewType::CUBE
        } else if info.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view = Self::create_vk_image_view(
            gfx,
            image.handle(),
            info.format,
            view_type,
            aspect,
            0,
            info.array_layers,
            info.mip_levels,
            info.name,
        );

        match info.initial_data {
            None => {
                // 单个 post 屏障完成 layout 切换
                self.post_image_barriers.push(
                    GfxImageBarrier::new()
                        .image(image.handle())
                        .image_aspect_flag(aspect)
                        .layers(0, info.array_layers)
                        .mip_levels(0, info.mip_levels)
                        .layout_transfer(vk::ImageLayout::UNDEFINED, layout)
                        .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE)
                        .dst_mask(derived.dst_stages, derived.dst_access),
                );
            }
            Some(data) => {
                self.pre_image_barriers.push(
                    GfxImageBarrier::new()
                        .image(image.handle())
                        .image_aspect_flag(aspect)
                        .layers(0, info.array_layers)
                        .mip_levels(0, info.mip_levels)
                        .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE)
                        .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
                );

                let (idx, offset) = self.acquire_staging_buffer(gfx, data.len() as vk::DeviceSize);
                self.staging_used[idx].buffer.write_bytes(gfx, offset, data);
                let region = vk::BufferImageCopy2::default()
                    .buffer_offset(offset)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: info.array_layers,
                    })
                    .image_extent(vk::Extent3D {
                        width: info.extent.width,
                        height: info.extent.height,
                        depth: 1,
                    });
                let copy_info = vk::CopyBufferToImageInfo2::default()
                    .src_buffer(self.staging_used[idx].buffer.vk_buffer())
                    .dst_image(image.handle())
                    .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .regions(std::slice::from_ref(&region));
                self.post_cmd.cmd_copy_buffer_to_image(gfx, &copy_info);

                self.post_image_barriers.push(
                    GfxImageBarrier::new()
                        .image(image.handle())
                        .image_aspect_flag(aspect)
                        .layers(0, info.array_layers)
                        .mip_levels(0, info.mip_levels)
                        .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, layout)
                        .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                        .dst_mask(derived.dst_stages, derived.dst_access),
                );
            }
        }
        self.gate.mark_upload();

        self.textures.add(Texture {
            image,
            view,
            aspect,
            dst_stages: derived.dst_stages,
            dst_access: derived.dst_access,
            layout,
            owns_image: true,
        })
    }

    /// 在已有 texture 的部分 layer 上创建别名 view
    ///
    /// 新记录不拥有底层 image；父与 view 的销毁顺序由调用方负责。
    pub fn create_texture_view(
        &mut self,
        gfx: &Gfx,
        parent: Handle<Texture>,
        base_layer: u32,
        layer_count: u32,
        name: &str,
    ) -> Handle<Texture> {
        let (image_handle, extent, format, usage, aspect, dst_stages, dst_access, layout) = {
            let p = self.textures.get(parent);
            assert!(base_layer + layer_count <= p.image.array_layers());
            (
                p.image.handle(),
                vk::Extent3D {
                    width: p.image.width(),
                    height: p.image.height(),
                    depth: 1,
                },
                p.image.format(),
                p.image.usage(),
                p.aspect,
                p.dst_stages,
                p.dst_access,
                p.layout,
            )
        };

        let view_type = if layer_count > 1 { vk::ImageViewType::TYPE_2D_ARRAY } else { vk::ImageViewType::TYPE_2D };
        let view = Self::create_vk_image_view(
            gfx,
            image_handle,
            format,
            view_type,
            aspect,
            base_layer,
            layer_count,
            vk::REMAINING_MIP_LEVELS,
            name,
        );

        self.textures.add(Texture {
            image: GfxImage::from_external(image_handle, extent, format, layer_count, usage, name),
            view,
            aspect,
            dst_stages,
            dst_access,
            layout,
            owns_image: false,
        })
    }

    /// 登记一个外部构建的 texture 记录（例如包装 swapchain image）
    pub fn register_texture(&mut self, texture: Texture) -> Handle<Texture> {
        self.textures.add(texture)
    }

    /// 销毁 texture（view 总是销毁，image 仅在记录拥有它时销毁）
    pub fn remove_texture(&mut self, gfx: &Gfx, handle: Handle<Texture>) {
        let mut record = self.textures.remove(handle);
        if record.view != vk::ImageView::null() {
            unsafe {
                gfx.gfx_device().destroy_image_view(record.view, None);
            }
        }
        record.image.destroy_mut(gfx);
    }

    #[allow(clippy::too_many_arguments)]
    fn create_vk_image_view(
        gfx: &Gfx,
        image: vk::Image,
        format: vk::Format,
        view_type: vk::ImageViewType,
        aspect: vk::ImageAspectFlags,
        base_layer: u32,
        layer_count: u32,
        level_count: u32,
        name: &str,
    ) -> vk::ImageView {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count,
                base_array_layer: base_layer,
                layer_count,
            });
        let view = unsafe { gfx.gfx_device().create_image_view(&view_ci, None).unwrap() };
        gfx.gfx_device().set_object_debug_name(view, format!("ImageView::{name}"));
        view
    }
}

// shader & sampler
impl ResourceManager {
    pub fn create_shader(&mut self, gfx: &Gfx, info: &ShaderInfo) -> Handle<Shader> {
        let code = ash::util::read_spv(&mut Cursor::new(info.bytecode)).expect("invalid SPIR-V bytecode");
        let module = unsafe {
            gfx.gfx_device().create_shader_module(&vk::ShaderModuleCreateInfo::default().code(&code), None).unwrap()
        };
        gfx.gfx_device().set_object_debug_name(module, format!("Shader::{}", info.name));
        self.shaders.add(Shader {
            module,
            stage: info.stage,
        })
    }

    pub fn create_sampler(&mut self, gfx: &Gfx, info: &SamplerInfo) -> Handle<Sampler> {
        let sampler_ci = vk::SamplerCreateInfo::default()
            .min_filter(info.min_filter)
            .mag_filter(info.mag_filter)
            .mipmap_mode(info.mipmap_mode)
            .address_mode_u(info.address_mode)
            .address_mode_v(info.address_mode)
            .address_mode_w(info.address_mode)
            .anisotropy_enable(info.max_anisotropy > 0.0)
            .max_anisotropy(info.max_anisotropy)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = unsafe { gfx.gfx_device().create_sampler(&sampler_ci, None).unwrap() };
        gfx.gfx_device().set_object_debug_name(sampler, format!("Sampler::{}", info.name));
        self.samplers.add(Sampler { sampler })
    }
}

// render pass
impl ResourceManager {
    /// 创建只用于 pipeline 兼容性的 render pass 布局
    pub fn create_render_pass_layout(&mut self, gfx: &Gfx, info: &RenderPassLayoutInfo) -> Handle<RenderPassLayout> {
        debug_assert!(info.subpass.color_attachments.len() <= 8);
        let render_pass = Self::create_vk_render_pass(gfx, info, None);
        self.render_pass_layouts.add(RenderPassLayout {
            render_pass,
            info: info.clone(),
        })
    }

    /// 创建带 load/store 与 layout 过渡的完整 render pass
    pub fn create_render_pass(&mut self, gfx: &Gfx, info: &RenderPassInfo) -> Handle<RenderPass> {
        let layout_info = self.render_pass_layouts.get(info.layout).info.clone();
        assert_eq!(layout_info.attachments.len(), info.attachments.len());
        let render_pass = Self::create_vk_render_pass(gfx, &layout_info, Some(&info.attachments));
        self.render_passes.add(RenderPass {
            render_pass,
            layout: info.layout,
        })
    }

    fn create_vk_render_pass(
        gfx: &Gfx,
        layout: &RenderPassLayoutInfo,
        attachments: Option<&[AttachmentInfo]>,
    ) -> vk::RenderPass {
        let descs = layout
            .attachments
            .iter()
            .enumerate()
            .map(|(i, &format)| {
                let desc = vk::AttachmentDescription::default()
                    .format(format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE);
                match attachments {
                    Some(a) => desc
                        .load_op(a[i].load_op)
                        .store_op(a[i].store_op)
                        .initial_layout(a[i].initial_layout)
                        .final_layout(a[i].final_layout),
                    // 布局 pass 不关心内容，final layout 按格式取一个合法值
                    None => desc
                        .load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .initial_layout(vk::ImageLayout::UNDEFINED)
                        .final_layout(if is_depth_format(format) {
                            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                        } else {
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                        }),
                }
            })
            .collect_vec();

        let color_refs = layout
            .subpass
            .color_attachments
            .iter()
            .map(|&i| {
                vk::AttachmentReference::default().attachment(i).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            })
            .collect_vec();
        let depth_ref = layout.subpass.depth_attachment.map(|i| {
            vk::AttachmentReference::default().attachment(i).layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        });

        // 未被引用的附件进 preserve，保证它们的内容跨过这个 subpass
        let preserve = (0..layout.attachments.len() as u32)
            .filter(|i| {
                !layout.subpass.color_attachments.contains(i) && layout.subpass.depth_attachment != Some(*i)
            })
            .collect_vec();

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .preserve_attachments(&preserve);
        if let Some(ref depth_ref) = depth_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let render_pass_ci = vk::RenderPassCreateInfo::default()
            .attachments(&descs)
            .subpasses(std::slice::from_ref(&subpass));
        unsafe { gfx.gfx_device().create_render_pass(&render_pass_ci, None).unwrap() }
    }
}

// pipeline layout & descriptor set
impl ResourceManager {
    /// 为每个非空 set 创建 descriptor set layout 和独立的 pool；
    /// 空 set 用共享的占位 layout 填充，保证 set index 稳定
    pub fn create_pipeline_layout(&mut self, gfx: &Gfx, info: &PipelineLayoutInfo) -> Handle<PipelineLayout> {
        let gfx_device = gfx.gfx_device();
        let mut set_layouts = [vk::DescriptorSetLayout::null(); limits::MAX_DESCRIPTOR_SET_COUNT];
        let mut pools = [vk::DescriptorPool::null(); limits::MAX_DESCRIPTOR_SET_COUNT];

        for set in 0..limits::MAX_DESCRIPTOR_SET_COUNT {
            let bindings = &info.set_bindings[set];
            debug_assert!(bindings.len() <= limits::MAX_DESCRIPTOR_SET_BINDING_COUNT);
            if bindings.is_empty() {
                set_layouts[set] = self.empty_set_layout;
                continue;
            }

            let vk_bindings = bindings
                .iter()
                .map(|b| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(b.binding)
                        .descriptor_type(b.descriptor_type)
                        .descriptor_count(b.count)
                        .stage_flags(b.stages)
                })
                .collect_vec();
            set_layouts[set] = unsafe {
                gfx_device
                    .create_descriptor_set_layout(
                        &vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings),
                        None,
                    )
                    .unwrap()
            };

            let max_sets = info.max_descriptor_set_counts[set];
            assert!(max_sets > 0, "set {set} has bindings but a zero max set count");
            let pool_sizes = bindings
                .iter()
                .map(|b| vk::DescriptorPoolSize::default().ty(b.descriptor_type).descriptor_count(b.count * max_sets))
                .collect_vec();
            pools[set] = unsafe {
                gfx_device
                    .create_descriptor_pool(
                        &vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(&pool_sizes),
                        None,
                    )
                    .unwrap()
            };
        }

        let layout = unsafe {
            gfx_device
                .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts), None)
                .unwrap()
        };
        self.pipeline_layouts.add(PipelineLayout {
            layout,
            set_layouts,
            pools,
        })
    }

    /// 从 pipeline layout 对应 set 的 pool 中分配一个 descriptor set；
    /// 空 set 返回共享的占位 set
    pub fn create_descriptor_set(
        &mut self,
        gfx: &Gfx,
        pipeline_layout: Handle<PipelineLayout>,
        set_index: u32,
    ) -> Handle<DescriptorSet> {
        assert!((set_index as usize) < limits::MAX_DESCRIPTOR_SET_COUNT);
        let pl = self.pipeline_layouts.get(pipeline_layout);
        let pool = pl.pools[set_index as usize];
        let set = if pool == vk::DescriptorPool::null() {
            self.empty_set
        } else {
            unsafe {
                gfx.gfx_device()
                    .allocate_descriptor_sets(
                        &vk::DescriptorSetAllocateInfo::default()
                            .descriptor_pool(pool)
                            .set_layouts(std::slice::from_ref(&pl.set_layouts[set_index as usize])),
                    )
                    .unwrap()[0]
            }
        };
        self.descriptor_sets.add(DescriptorSet {
            set,
            set_index,
            pipeline_layout,
        })
    }

    /// 写入 descriptor set 的若干 binding
    ///
    /// depth 格式的 texture 以只读 depth layout 写入，其余用 shader 只读 layout。
    pub fn update_descriptor_set(&self, gfx: &Gfx, handle: Handle<DescriptorSet>, updates: &[DescriptorSetUpdate]) {
        enum BuiltInfos {
            Buffers(Vec<vk::DescriptorBufferInfo>),
            Images(Vec<vk::DescriptorImageInfo>),
        }

        let record = self.descriptor_sets.get(handle);
        let built = updates
            .iter()
            .map(|update| match &update.data {
                DescriptorBindingUpdate::UniformBuffers(buffers) => BuiltInfos::Buffers(
                    buffers
                        .iter()
                        .map(|b| {
                            vk::DescriptorBufferInfo::default()
                                .buffer(self.buffers.get(b.buffer).gfx_buffer.vk_buffer())
                                .offset(b.offset)
                                .range(b.range)
                        })
                        .collect_vec(),
                ),
                DescriptorBindingUpdate::CombinedImageSamplers(images) => BuiltInfos::Images(
                    images
                        .iter()
                        .map(|b| {
                            let texture = self.textures.get(b.texture);
                            let layout = if is_depth_format(texture.image.format()) {
                                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                            } else {
                                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                            };
                            vk::DescriptorImageInfo::default()
                                .image_view(texture.view)
                                .image_layout(layout)
                                .sampler(self.samplers.get(b.sampler).sampler)
                        })
                        .collect_vec(),
                ),
            })
            .collect_vec();

        let writes = updates
            .iter()
            .zip(&built)
            .map(|(update, infos)| {
                let write = vk::WriteDescriptorSet::default().dst_set(record.set).dst_binding(update.binding);
                match infos {
                    BuiltInfos::Buffers(infos) => {
                        write.descriptor_type(vk::DescriptorType::UNIFORM_BUFFER).buffer_info(infos)
                    }
                    BuiltInfos::Images(infos) => {
                        write.descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER).image_info(infos)
                    }
                }
            })
            .collect_vec();
        unsafe {
            gfx.gfx_device().update_descriptor_sets(&writes, &[]);
        }
    }
}

// pipeline
impl ResourceManager {
    /// 创建完整的图形管线；viewport/scissor 是动态状态
    pub fn create_pipeline(&mut self, gfx: &Gfx, info: &PipelineInfo) -> Handle<Pipeline> {
        debug_assert!(info.vertex_bindings.len() <= limits::MAX_VERTEX_BUFFER_COUNT);

        let vs = self.shaders.get(info.vertex_shader);
        let fs = self.shaders.get(info.fragment_shader);
        assert_eq!(vs.stage, ShaderStage::Vertex);
        assert_eq!(fs.stage, ShaderStage::Fragment);
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vs.module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fs.module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&info.vertex_bindings)
            .vertex_attribute_descriptions(&info.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(info.topology);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let depth_bias_enable = info.depth_bias_constant_factor != 0.0 || info.depth_bias_slope_factor != 0.0;
        let raster = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .depth_bias_enable(depth_bias_enable)
            .depth_bias_constant_factor(info.depth_bias_constant_factor)
            .depth_bias_slope_factor(info.depth_bias_slope_factor)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test_enable)
            .depth_write_enable(info.depth_write_enable)
            .depth_compare_op(info.depth_compare_op);

        // 同一份混合状态复制到 subpass 的每个 color attachment 上
        let layout_record = self.render_pass_layouts.get(info.render_pass_layout);
        let color_count = layout_record.info.subpass.color_attachments.len();
        let blend_attachments = vec![info.blend; color_count];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(self.pipeline_layouts.get(info.pipeline_layout).layout)
            .render_pass(layout_record.render_pass)
            .subpass(0);
        let pipeline = unsafe {
            gfx.gfx_device()
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
                .unwrap()[0]
        };
        gfx.gfx_device().set_object_debug_name(pipeline, format!("Pipeline::{}", info.name));

        self.pipelines.add(Pipeline {
            pipeline,
            layout: info.pipeline_layout,
        })
    }
}

// getters
impl ResourceManager {
    #[inline]
    pub fn get_buffer(&self, handle: Handle<Buffer>) -> &Buffer {
        self.buffers.get(handle)
    }

    #[inline]
    pub fn get_texture(&self, handle: Handle<Texture>) -> &Texture {
        self.textures.get(handle)
    }

    #[inline]
    pub fn get_shader(&self, handle: Handle<Shader>) -> &Shader {
        self.shaders.get(handle)
    }

    #[inline]
    pub fn get_render_pass_layout(&self, handle: Handle<RenderPassLayout>) -> &RenderPassLayout {
        self.render_pass_layouts.get(handle)
    }

    #[inline]
    pub fn get_render_pass(&self, handle: Handle<RenderPass>) -> &RenderPass {
        self.render_passes.get(handle)
    }

    #[inline]
    pub fn get_pipeline_layout(&self, handle: Handle<PipelineLayout>) -> &PipelineLayout {
        self.pipeline_layouts.get(handle)
    }

    #[inline]
    pub fn get_pipeline(&self, handle: Handle<Pipeline>) -> &Pipeline {
        self.pipelines.get(handle)
    }

    #[inline]
    pub fn get_descriptor_set(&self, handle: Handle<DescriptorSet>) -> &DescriptorSet {
        self.descriptor_sets.get(handle)
    }

    #[inline]
    pub fn get_sampler(&self, handle: Handle<Sampler>) -> &Sampler {
        self.samplers.get(handle)
    }

    /// 持久映射 buffer 的映射指针
    #[inline]
    pub fn map_buffer(&self, handle: Handle<Buffer>) -> *mut u8 {
        self.buffers.get(handle).gfx_buffer.mapped_ptr()
    }

    #[inline]
    pub fn get_buffer_size(&self, handle: Handle<Buffer>) -> vk::DeviceSize {
        self.buffers.get(handle).gfx_buffer.size()
    }
}

// 上传与帧轮转
impl ResourceManager {
    /// 提交本帧累积的上传
    ///
    /// 没有待上传内容时什么都不做；两次帧间的重复调用是 no-op。
    /// pre 命令缓冲带着 layout 准备屏障先执行，post 命令缓冲带着拷贝、
    /// 聚合 memory barrier 与完成屏障随后执行，二者在一次 submit 中完成。
    pub fn commit(&mut self, gfx: &Gfx) {
        if !self.gate.try_commit() {
            return;
        }

        let pre_cmd = self.pre_cmd;
        let post_cmd = self.post_cmd;
        if !self.pre_image_barriers.is_empty() {
            pre_cmd.image_memory_barrier(gfx, vk::DependencyFlags::empty(), &self.pre_image_barriers);
        }
        if self.aggregate_dst_stages != vk::PipelineStageFlags2::NONE {
            let barrier = vk::MemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(self.aggregate_dst_stages)
                .dst_access_mask(self.aggregate_dst_access);
            post_cmd.memory_barrier(gfx, std::slice::from_ref(&barrier));
        }
        if !self.post_image_barriers.is_empty() {
            post_cmd.image_memory_barrier(gfx, vk::DependencyFlags::empty(), &self.post_image_barriers);
        }
        pre_cmd.end(gfx);
        post_cmd.end(gfx);

        gfx.queue_submit(&[GfxSubmitInfo::new(&[pre_cmd, post_cmd])], None);
    }

    /// 推进上传轮转，必须在 commit 之后调用
    ///
    /// 清空屏障累积，回收上一轮的上传命令缓冲与 staging buffer
    /// （依赖调用方的帧同步保证那一轮的 GPU 工作已经结束），
    /// 然后开始录制新一帧的上传命令。
    pub fn next_frame(&mut self, gfx: &Gfx) {
        self.gate.end_frame();

        self.aggregate_dst_stages = vk::PipelineStageFlags2::NONE;
        self.aggregate_dst_access = vk::AccessFlags2::NONE;
        self.pre_image_barriers.clear();
        self.post_image_barriers.clear();

        self.upload_cmds.next_frame_with(|cmd| cmd.reset(gfx));
        self.frame = self.upload_cmds.current_frame();

        let frame = self.frame;
        let mut i = 0;
        while i < self.staging_used.len() {
            if self.staging_used[i].block.recyclable(frame) {
                let mut staging = self.staging_used.swap_remove(i);
                staging.block.used_offset = 0;
                self.staging_free.push(staging);
            } else {
                i += 1;
            }
        }

        let pool = &*self.upload_cmd_pool;
        self.pre_cmd = self.upload_cmds.get_or_add(|| GfxCommandBuffer::new(gfx, pool, "upload-pre"));
        self.post_cmd = self.upload_cmds.get_or_add(|| GfxCommandBuffer::new(gfx, pool, "upload-post"));
        self.pre_cmd.begin(gfx, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.post_cmd.begin(gfx, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    }

    /// 在 staging pool 中划出一段容量
    ///
    /// 依次尝试：在用 buffer 的剩余空间（偏移严格递增）、容量足够的空闲
    /// buffer、新建一个 `max(size, 128 MiB)` 的 buffer。
    /// 返回 `staging_used` 中的下标与段内偏移。
    fn acquire_staging_buffer(&mut self, gfx: &Gfx, size: vk::DeviceSize) -> (usize, vk::DeviceSize) {
        // 在用的 buffer 也可能是之前的帧取出的，bump 会把它重新标记到
        // 当前帧，避免上一帧的标记让它在 GPU 仍在读取时被回收
        for (i, staging) in self.staging_used.iter_mut().enumerate() {
            if let Some(offset) = staging.block.try_bump(size, self.frame) {
                return (i, offset);
            }
        }

        if let Some(pos) = self.staging_free.iter().position(|s| s.block.capacity >= size) {
            let mut staging = self.staging_free.swap_remove(pos);
            staging.block.used_offset = size;
            staging.block.frame_acquired = self.frame;
            self.staging_used.push(staging);
            return (self.staging_used.len() - 1, 0);
        }

        let buffer_size = size.max(DEFAULT_STAGING_BUFFER_SIZE);
        let index = self.staging_used.len() + self.staging_free.len();
        let buffer = GfxBuffer::new_stage_buffer(gfx, buffer_size, format!("staging-{index}"));
        self.staging_used.push(StagingBuffer {
            buffer,
            block: StagingBlock {
                capacity: buffer_size,
                used_offset: size,
                frame_acquired: self.frame,
            },
        });
        (self.staging_used.len() - 1, 0)
    }
}

// destroy
impl ResourceManager {
    /// 销毁所有存活资源与内部的上传设施
    ///
    /// 调用前需要保证 GPU 已经空闲（wait idle 或等完所有 fence）。
    pub fn destroy(mut self, gfx: &Gfx) {
        log::info!("Destroying ResourceManager");

        let gfx_device = gfx.gfx_device();
        for mut buffer in self.buffers.drain() {
            buffer.gfx_buffer.destroy_mut(gfx);
        }
        for mut texture in self.textures.drain() {
            if texture.view != vk::ImageView::null() {
                unsafe {
                    gfx_device.destroy_image_view(texture.view, None);
                }
            }
            texture.image.destroy_mut(gfx);
        }
        for shader in self.shaders.drain() {
            unsafe {
                gfx_device.destroy_shader_module(shader.module, None);
            }
        }
        for layout in self.render_pass_layouts.drain() {
            unsafe {
                gfx_device.destroy_render_pass(layout.render_pass, None);
            }
        }
        for render_pass in self.render_passes.drain() {
            unsafe {
                gfx_device.destroy_render_pass(render_pass.render_pass, None);
            }
        }
        let empty_set_layout = self.empty_set_layout;
        for pipeline_layout in self.pipeline_layouts.drain() {
            unsafe {
                gfx_device.destroy_pipeline_layout(pipeline_layout.layout, None);
                for set_layout in pipeline_layout.set_layouts {
                    if set_layout != empty_set_layout && set_layout != vk::DescriptorSetLayout::null() {
                        gfx_device.destroy_descriptor_set_layout(set_layout, None);
                    }
                }
                for pool in pipeline_layout.pools {
                    if pool != vk::DescriptorPool::null() {
                        gfx_device.destroy_descriptor_pool(pool, None);
                    }
                }
            }
        }
        for pipeline in self.pipelines.drain() {
            unsafe {
                gfx_device.destroy_pipeline(pipeline.pipeline, None);
            }
        }
        // descriptor set 随各自的 pool 一起释放，记录直接丢弃
        let _ = self.descriptor_sets.drain().count();
        for sampler in self.samplers.drain() {
            unsafe {
                gfx_device.destroy_sampler(sampler.sampler, None);
            }
        }

        unsafe {
            gfx_device.destroy_descriptor_pool(self.empty_pool, None);
            gfx_device.destroy_descriptor_set_layout(self.empty_set_layout, None);
        }

        for mut staging in self.staging_free.drain(..).chain(self.staging_used.drain(..)) {
            staging.buffer.destroy_mut(gfx);
        }
        let _ = self.upload_cmds.drain().count();
        unsafe { ManuallyDrop::take(&mut self.upload_cmd_pool) }.destroy(gfx);

        #[cfg(debug_assertions)]
        self.destroyed.set(true);
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed.get(), "ResourceManager must be destroyed before being dropped.");
    }
}

// ---------------------------------------------------------------------------
// usage 推导
// ---------------------------------------------------------------------------

/// device local buffer 上传完成后，后续读取方的 stage 与 access
pub fn derive_buffer_stages_access(usage: vk::BufferUsageFlags) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    let shader_stages = vk::PipelineStageFlags2::VERTEX_SHADER
        | vk::PipelineStageFlags2::FRAGMENT_SHADER
        | vk::PipelineStageFlags2::COMPUTE_SHADER;

    let mut stages = vk::PipelineStageFlags2::NONE;
    let mut access = vk::AccessFlags2::NONE;
    if usage.contains(vk::BufferUsageFlags::TRANSFER_SRC) {
        stages |= vk::PipelineStageFlags2::TRANSFER;
        access |= vk::AccessFlags2::TRANSFER_READ;
    }
    if usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
        stages |= vk::PipelineStageFlags2::TRANSFER;
        access |= vk::AccessFlags2::TRANSFER_WRITE;
    }
    if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
        stages |= shader_stages;
        access |= vk::AccessFlags2::UNIFORM_READ;
    }
    if usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
        stages |= shader_stages;
        access |= vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE;
    }
    if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        stages |= vk::PipelineStageFlags2::INDEX_INPUT;
        access |= vk::AccessFlags2::INDEX_READ;
    }
    if usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        stages |= vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT;
        access |= vk::AccessFlags2::VERTEX_ATTRIBUTE_READ;
    }
    if usage.contains(vk::BufferUsageFlags::INDIRECT_BUFFER) {
        stages |= vk::PipelineStageFlags2::DRAW_INDIRECT;
        access |= vk::AccessFlags2::INDIRECT_COMMAND_READ;
    }
    (stages, access)
}

/// texture usage 推导出的稳定状态
pub struct TextureUsageDerivation {
    pub layout: vk::ImageLayout,
    pub dst_stages: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    /// usage 中有多个能决定 layout 的 bit
    pub ambiguous: bool,
}

/// 从 usage 推导 texture 的稳定 layout 与屏障目标端
///
/// stage 与 access 聚合所有命中的 bit；layout 按
/// sampled > color attachment > depth stencil attachment > storage
/// 的优先级取第一个命中的。
pub fn derive_texture_usage(usage: vk::ImageUsageFlags) -> TextureUsageDerivation {
    let mut layout = vk::ImageLayout::UNDEFINED;
    let mut stages = vk::PipelineStageFlags2::NONE;
    let mut access = vk::AccessFlags2::NONE;
    let mut layout_bits = 0;

    if usage.contains(vk::ImageUsageFlags::SAMPLED) {
        stages |= vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER;
        access |= vk::AccessFlags2::SHADER_READ;
        layout_bits += 1;
        if layout == vk::ImageLayout::UNDEFINED {
            layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        }
    }
    if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        stages |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        access |= vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
        layout_bits += 1;
        if layout == vk::ImageLayout::UNDEFINED {
            layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        }
    }
    if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        stages |= vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
        access |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
        layout_bits += 1;
        if layout == vk::ImageLayout::UNDEFINED {
            layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        }
    }
    if usage.contains(vk::ImageUsageFlags::STORAGE) {
        stages |= vk::PipelineStageFlags2::VERTEX_SHADER
            | vk::PipelineStageFlags2::FRAGMENT_SHADER
            | vk::PipelineStageFlags2::COMPUTE_SHADER;
        access |= vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE;
        layout_bits += 1;
        if layout == vk::ImageLayout::UNDEFINED {
            layout = vk::ImageLayout::GENERAL;
        }
    }

    TextureUsageDerivation {
        layout,
        dst_stages: stages,
        dst_access: access,
        ambiguous: layout_bits > 1,
    }
}

/// 常见非压缩格式的每 texel 字节数；未收录的格式返回 0，表示跳过长度校验
pub fn format_texel_size(format: vk::Format) -> vk::DeviceSize {
    match format {
        vk::Format::R8_UNORM => 1,
        vk::Format::R8G8_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT
        | vk::Format::R16G16_SFLOAT => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        vk::Format::D16_UNORM => 2,
        vk::Format::D32_SFLOAT => 4,
        _ => 0,
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_format_detection() {
        assert!(is_depth_format(vk::Format::D32_SFLOAT));
        assert!(is_depth_format(vk::Format::D24_UNORM_S8_UINT));
        assert!(!is_depth_format(vk::Format::R8G8B8A8_UNORM));
        assert!(!is_depth_format(vk::Format::R32_SFLOAT));
    }

    #[test]
    fn index_and_vertex_buffer_stages() {
        let (stages, access) = derive_buffer_stages_access(
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::VERTEX_BUFFER,
        );
        assert_eq!(
            stages,
            vk::PipelineStageFlags2::INDEX_INPUT | vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT
        );
        assert_eq!(access, vk::AccessFlags2::INDEX_READ | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ);
    }

    #[test]
    fn uniform_buffer_stages_cover_all_shaders() {
        let (stages, access) = derive_buffer_stages_access(vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert!(stages.contains(vk::PipelineStageFlags2::VERTEX_SHADER));
        assert!(stages.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(stages.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert_eq!(access, vk::AccessFlags2::UNIFORM_READ);
    }

    #[test]
    fn indirect_buffer_stages() {
        let (stages, access) = derive_buffer_stages_access(vk::BufferUsageFlags::INDIRECT_BUFFER);
        assert_eq!(stages, vk::PipelineStageFlags2::DRAW_INDIRECT);
        assert_eq!(access, vk::AccessFlags2::INDIRECT_COMMAND_READ);
    }

    #[test]
    fn unrelated_usage_derives_nothing() {
        let (stages, access) = derive_buffer_stages_access(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS);
        assert_eq!(stages, vk::PipelineStageFlags2::NONE);
        assert_eq!(access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn sampled_texture_layout() {
        let derived = derive_texture_usage(vk::ImageUsageFlags::SAMPLED);
        assert_eq!(derived.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(!derived.ambiguous);
        assert!(derived.dst_stages.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(derived.dst_access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn depth_attachment_layout() {
        let derived = derive_texture_usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(derived.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert!(!derived.ambiguous);
        assert!(derived.dst_stages.contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn storage_only_texture_uses_general() {
        let derived = derive_texture_usage(vk::ImageUsageFlags::STORAGE);
        assert_eq!(derived.layout, vk::ImageLayout::GENERAL);
        assert!(!derived.ambiguous);
    }

    #[test]
    fn layout_precedence_is_sampled_first() {
        let derived = derive_texture_usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT);
        assert_eq!(derived.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(derived.ambiguous);
        // 两种用途的 stage/access 都要进入屏障目标端
        assert!(derived.dst_stages.contains(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT));
        assert!(derived.dst_access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn color_beats_storage() {
        let derived = derive_texture_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::STORAGE);
        assert_eq!(derived.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert!(derived.ambiguous);
    }

    #[test]
    fn transfer_only_texture_has_no_layout() {
        let derived = derive_texture_usage(vk::ImageUsageFlags::TRANSFER_DST);
        assert_eq!(derived.layout, vk::ImageLayout::UNDEFINED);
        assert!(!derived.ambiguous);
    }

    #[test]
    fn texel_sizes_for_common_formats() {
        assert_eq!(format_texel_size(vk::Format::R8G8B8A8_UNORM), 4);
        assert_eq!(format_texel_size(vk::Format::R16G16B16A16_SFLOAT), 8);
        assert_eq!(format_texel_size(vk::Format::D32_SFLOAT), 4);
        // 未收录的格式不参与长度校验
        assert_eq!(format_texel_size(vk::Format::BC7_UNORM_BLOCK), 0);
    }

    #[test]
    fn staging_block_offsets_are_strictly_increasing() {
        let mut block = StagingBlock {
            capacity: 256,
            used_offset: 0,
            frame_acquired: 0,
        };

        assert_eq!(block.try_bump(100, 0), Some(0));
        assert_eq!(block.try_bump(100, 0), Some(100));
        // 放不下时不改动游标
        assert_eq!(block.try_bump(100, 0), None);
        assert_eq!(block.used_offset, 200);
    }

    #[test]
    fn staging_block_reuse_retags_to_current_frame() {
        // 帧 0 取出的块在帧 1 被继续使用，帧 0 轮转回来时不能回收它
        let mut block = StagingBlock {
            capacity: 1024,
            used_offset: 64,
            frame_acquired: 0,
        };

        assert_eq!(block.try_bump(64, 1), Some(64));
        assert_eq!(block.frame_acquired, 1);
        assert!(!block.recyclable(0));
        assert!(block.recyclable(1));
    }

    #[test]
    fn staging_block_untouched_frame_recycles_on_wrap() {
        let block = StagingBlock {
            capacity: 1024,
            used_offset: 64,
            frame_acquired: 0,
        };

        assert!(!block.recyclable(1));
        assert!(block.recyclable(0));
    }

    #[test]
    fn commit_gate_latches_until_end_of_frame() {
        let mut gate = CommitGate::default();
        gate.mark_upload();

        assert!(gate.try_commit());
        // 同一帧重复 commit 是 no-op
        assert!(!gate.try_commit());

        gate.end_frame();
        // 新的一帧没有上传，commit 不触碰队列
        assert!(!gate.try_commit());
    }

    #[test]
    fn commit_gate_upload_flag_resets_each_frame() {
        let mut gate = CommitGate::default();
        gate.mark_upload();
        assert!(gate.try_commit());
        gate.end_frame();

        gate.mark_upload();
        assert!(gate.try_commit());
        gate.end_frame();
    }

    #[test]
    #[should_panic(expected = "next_frame called without a commit")]
    fn end_of_frame_requires_a_commit() {
        let mut gate = CommitGate::default();
        gate.end_frame();
    }
}
