use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::DebugType;

/// 一个 queue family 的关键信息
#[derive(Clone)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    pub(crate) _mem_props: vk::PhysicalDeviceMemoryProperties,

    pub(crate) gfx_queue_family: GfxQueueFamily,
}

impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    pub fn new_discrete_physical_device(instance: &ash::Instance) -> Self {
        unsafe {
            instance
                .enumerate_physical_devices()
                .unwrap()
                .iter()
                .map(|pdevice| GfxPhysicalDevice::new(*pdevice, instance))
                .find_or_first(GfxPhysicalDevice::is_discrete_gpu)
                .unwrap()
        }
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Self {
        unsafe {
            let basic_props = instance.get_physical_device_properties(pdevice);
            let physical_device_name = CStr::from_ptr(basic_props.device_name.as_ptr());
            log::info!("found gpu: {:?}", physical_device_name);

            let queue_family_props = instance.get_physical_device_queue_family_properties(pdevice);
            log::debug!("physical device: queue family props:\n{:#?}", queue_family_props);

            // 全能的 queue family: graphics + compute + transfer
            let gfx_queue_family = queue_family_props
                .iter()
                .enumerate()
                .find(|(_, props)| {
                    props
                        .queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
                })
                .map(|(family_idx, props)| GfxQueueFamily {
                    name: "gfx".to_string(),
                    queue_family_index: family_idx as u32,
                    queue_flags: props.queue_flags,
                    queue_count: props.queue_count,
                })
                .expect("no queue family with graphics + compute + transfer support");

            Self {
                vk_handle: pdevice,
                basic_props,
                _mem_props: instance.get_physical_device_memory_properties(pdevice),
                gfx_queue_family,
            }
        }
    }

    pub fn destroy(self) {
        // 无需销毁
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
