use ash::vk;
use ash::vk::Handle;
use vk_mem::{Alloc, Allocation};

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// Image 来源枚举
pub enum ImageSource {
    /// 由 VMA 分配的 Image
    Allocated(Allocation),
    /// 外部 Image（例如 Swapchain Image 或被 view 共享的父 image），不管理其内存生命周期
    External,
}

pub struct GfxImage {
    handle: vk::Image,
    source: ImageSource,

    extent: vk::Extent3D,
    format: vk::Format,
    array_layers: u32,

    usage: vk::ImageUsageFlags,

    name: String,
}

// getter
impl GfxImage {
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }
}

// new & init
impl GfxImage {
    pub fn new(
        gfx: &Gfx,
        image_info: &GfxImageCreateInfo,
        alloc_info: &vk_mem::AllocationCreateInfo,
        debug_name: &str,
    ) -> Self {
        let (image, alloc) = unsafe { gfx.allocator().create_image(&image_info.as_info(), alloc_info).unwrap() };
        let image = Self {
            handle: image,
            source: ImageSource::Allocated(alloc),
            extent: image_info.inner.extent,
            format: image_info.inner.format,
            array_layers: image_info.inner.array_layers,
            usage: image_info.inner.usage,

            name: debug_name.to_string(),
        };
        gfx.gfx_device().set_debug_name(&image, debug_name);
        image
    }

    /// 包装一个外部的 image（例如 swapchain image），不接管其内存
    pub fn from_external(
        image: vk::Image,
        extent: vk::Extent3D,
        format: vk::Format,
        array_layers: u32,
        usage: vk::ImageUsageFlags,
        debug_name: &str,
    ) -> Self {
        Self {
            handle: image,
            source: ImageSource::External,
            extent,
            format,
            array_layers,
            usage,
            name: debug_name.to_string(),
        }
    }
}

impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// destroy
impl GfxImage {
    pub fn destroy(mut self, gfx: &Gfx) {
        self.destroy_mut(gfx);
    }

    pub fn destroy_mut(&mut self, gfx: &Gfx) {
        log::debug!("Destroying GfxImage: {}", self.name);

        match &mut self.source {
            ImageSource::External => (),
            ImageSource::Allocated(allocation) => unsafe { gfx.allocator().destroy_image(self.handle, allocation) },
        }
        self.handle = vk::Image::null();
    }
}

impl Drop for GfxImage {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImage ({}) must be destroyed before being dropped.", self.name);
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,

    queue_family_indices: Vec<u32>,
}

impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // spec 上面说，这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
            queue_family_indices: Vec::new(),
        }
    }

    #[inline]
    pub fn as_info(&self) -> vk::ImageCreateInfo<'_> {
        self.inner.queue_family_indices(&self.queue_family_indices)
    }

    // builder
    #[inline]
    pub fn array_layers(mut self, array_layers: u32) -> Self {
        self.inner.array_layers = array_layers;
        self
    }

    // builder
    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.inner.mip_levels = mip_levels;
        self
    }

    // builder
    #[inline]
    pub fn flags(mut self, flags: vk::ImageCreateFlags) -> Self {
        self.inner.flags = flags;
        self
    }
}
