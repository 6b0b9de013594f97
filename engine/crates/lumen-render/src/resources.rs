//! 资源记录与创建参数
//!
//! ResourceManager 的每种资源在 arena 中都有一条记录。记录除了持有原生
//! 对象以外，还保留重建屏障与 descriptor 写入所需的元数据。

use ash::vk;
use lumen_crate_tools::arena::Handle;
use lumen_gfx::resources::{buffer::GfxBuffer, image::GfxImage};

/// 固定上限，影响 descriptor pool 与 draw call 的内联布局
pub mod limits {
    pub const MAX_DESCRIPTOR_SET_COUNT: usize = 4;
    pub const MAX_DESCRIPTOR_SET_BINDING_COUNT: usize = 16;
    pub const MAX_VERTEX_BUFFER_COUNT: usize = 4;
}

// ---------------------------------------------------------------------------
// buffer
// ---------------------------------------------------------------------------

/// buffer 的映射策略，在创建时决定
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BufferMap {
    /// 纯 device 端访问，初始数据走 staging 上传
    #[default]
    NotMapped,
    /// 创建后保持映射，host 可以直接写入
    PersistentlyMapped,
}

pub struct Buffer {
    pub gfx_buffer: GfxBuffer,
    pub map: BufferMap,
}

pub struct BufferInfo<'a> {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub map: BufferMap,
    /// 创建时写入的初始内容；device local 的 buffer 要等下一次 commit 才可见
    pub initial_data: Option<&'a [u8]>,
    pub name: &'a str,
}

impl Default for BufferInfo<'_> {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            map: BufferMap::NotMapped,
            initial_data: None,
            name: "buffer",
        }
    }
}

// ---------------------------------------------------------------------------
// texture
// ---------------------------------------------------------------------------

/// texture 记录
///
/// `dst_stages`/`dst_access`/`layout` 是上传完成后资源所处的稳定状态，
/// 后续的屏障与 descriptor 写入都以此为准。
///
/// view 与父 texture 共享同一个 `vk::Image`（`owns_image == false`），
/// 先销毁父再销毁 view（或反之）导致的双重销毁由调用方负责避免。
pub struct Texture {
    pub image: GfxImage,
    pub view: vk::ImageView,
    pub aspect: vk::ImageAspectFlags,
    pub dst_stages: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
    pub owns_image: bool,
}

pub struct TextureInfo<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub usage: vk::ImageUsageFlags,
    /// 创建 cube map 时需要，6 层 + 该标记会得到 CUBE 类型的 view
    pub cube_compatible: bool,
    /// 显式指定稳定 layout，用于 usage 推导有歧义的情况
    pub initial_layout: Option<vk::ImageLayout>,
    /// 紧密排列的像素数据，所有 array layer 依次排布
    pub initial_data: Option<&'a [u8]>,
    pub name: &'a str,
}

impl Default for TextureInfo<'_> {
    fn default() -> Self {
        Self {
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
            array_layers: 1,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::empty(),
            cube_compatible: false,
            initial_layout: None,
            initial_data: None,
            name: "texture",
        }
    }
}

// ---------------------------------------------------------------------------
// shader
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    #[inline]
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

pub struct Shader {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
}

pub struct ShaderInfo<'a> {
    /// SPIR-V 字节码，按原样传入，内部不做任何解析
    pub bytecode: &'a [u8],
    pub stage: ShaderStage,
    pub name: &'a str,
}

// ---------------------------------------------------------------------------
// render pass
// ---------------------------------------------------------------------------

/// 单 subpass 的附件引用，下标指向 `RenderPassLayoutInfo::attachments`
#[derive(Clone, Default)]
pub struct SubpassInfo {
    pub color_attachments: Vec<u32>,
    pub depth_attachment: Option<u32>,
}

/// 只描述兼容性（格式 + 引用结构）的 render pass 布局，
/// 用于创建 pipeline；实际渲染用 [`RenderPassInfo`] 创建的完整 pass
#[derive(Clone, Default)]
pub struct RenderPassLayoutInfo {
    pub attachments: Vec<vk::Format>,
    pub subpass: SubpassInfo,
}

pub struct RenderPassLayout {
    pub render_pass: vk::RenderPass,
    pub info: RenderPassLayoutInfo,
}

/// 完整 render pass 中每个附件的 load/store 与 layout 过渡
#[derive(Clone, Copy)]
pub struct AttachmentInfo {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

pub struct RenderPassInfo {
    pub layout: Handle<RenderPassLayout>,
    /// 与 layout 的 attachments 一一对应
    pub attachments: Vec<AttachmentInfo>,
}

pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    pub layout: Handle<RenderPassLayout>,
}

// ---------------------------------------------------------------------------
// pipeline layout & descriptor set
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct DescriptorBindingInfo {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// 每个 set 一张 binding 表；`max_descriptor_set_counts[s]` 决定
/// set s 的 descriptor pool 能分配多少个 set
#[derive(Default)]
pub struct PipelineLayoutInfo {
    pub set_bindings: [Vec<DescriptorBindingInfo>; limits::MAX_DESCRIPTOR_SET_COUNT],
    pub max_descriptor_set_counts: [u32; limits::MAX_DESCRIPTOR_SET_COUNT],
}

pub struct PipelineLayout {
    pub layout: vk::PipelineLayout,
    pub set_layouts: [vk::DescriptorSetLayout; limits::MAX_DESCRIPTOR_SET_COUNT],
    /// 空 set 的槽位是 null，没有独立的 pool
    pub pools: [vk::DescriptorPool; limits::MAX_DESCRIPTOR_SET_COUNT],
}

pub struct DescriptorSet {
    pub set: vk::DescriptorSet,
    pub set_index: u32,
    pub pipeline_layout: Handle<PipelineLayout>,
}

pub struct BufferBindingUpdate {
    pub buffer: Handle<Buffer>,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}

pub struct ImageSamplerBindingUpdate {
    pub texture: Handle<Texture>,
    pub sampler: Handle<Sampler>,
}

/// binding 内容按 descriptor 类型区分，数组元素依次写入
/// binding 的各个 array element
pub enum DescriptorBindingUpdate {
    UniformBuffers(Vec<BufferBindingUpdate>),
    CombinedImageSamplers(Vec<ImageSamplerBindingUpdate>),
}

pub struct DescriptorSetUpdate {
    pub binding: u32,
    pub data: DescriptorBindingUpdate,
}

// ---------------------------------------------------------------------------
// pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: Handle<PipelineLayout>,
}

pub struct PipelineInfo<'a> {
    pub vertex_shader: Handle<Shader>,
    pub fragment_shader: Handle<Shader>,
    pub pipeline_layout: Handle<PipelineLayout>,
    /// 只要求兼容，实际渲染可以用同布局的任意 render pass
    pub render_pass_layout: Handle<RenderPassLayout>,

    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,

    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    /// 两个因子都为 0 时关闭 depth bias
    pub depth_bias_constant_factor: f32,
    pub depth_bias_slope_factor: f32,

    /// 单个 color attachment 的混合状态
    pub blend: vk::PipelineColorBlendAttachmentState,

    pub name: &'a str,
}

impl Default for PipelineInfo<'_> {
    fn default() -> Self {
        Self {
            vertex_shader: Handle::null(),
            fragment_shader: Handle::null(),
            pipeline_layout: Handle::null(),
            render_pass_layout: Handle::null(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::LESS,
            depth_bias_constant_factor: 0.0,
            depth_bias_slope_factor: 0.0,
            blend: vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA),
            name: "pipeline",
        }
    }
}

// ---------------------------------------------------------------------------
// sampler
// ---------------------------------------------------------------------------

pub struct Sampler {
    pub sampler: vk::Sampler,
}

pub struct SamplerInfo<'a> {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    /// 0 表示关闭各向异性过滤
    pub max_anisotropy: f32,
    pub name: &'a str,
}

impl Default for SamplerInfo<'_> {
    fn default() -> Self {
        Self {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0.0,
            name: "sampler",
        }
    }
}
