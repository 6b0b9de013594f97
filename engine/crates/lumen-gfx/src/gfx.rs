use std::cell::Cell;
use std::mem::ManuallyDrop;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{fence::GfxFence, submit_info::GfxSubmitInfo},
    foundation::{
        debug_messenger::GfxDebugMsger,
        device::GfxDevice,
        instance::GfxInstance,
        physical_device::{GfxPhysicalDevice, GfxQueueFamily},
    },
};

/// Vulkan 图形上下文
///
/// 管理所有 Vulkan 核心对象：实例、物理设备、逻辑设备、队列与内存分配器。
/// 由应用显式创建并持有，以 `&Gfx` 的形式传递给所有需要它的组件；
/// 进程中只应存在一个实例。
///
/// # 使用流程
/// ```ignore
/// let gfx = Gfx::new("MyApp");
/// let rm = ResourceManager::new(&gfx);
/// // 使用...
/// rm.destroy(&gfx);
/// gfx.destroy();
/// ```
pub struct Gfx {
    _entry: ash::Entry,
    instance: GfxInstance,
    debug_msger: Option<GfxDebugMsger>,
    physical_device: GfxPhysicalDevice,
    gfx_device: GfxDevice,

    graphics_queue: vk::Queue,

    /// vma 要求 instance 和 device 在其生命周期内有效，
    /// 因此必须在 device 销毁之前手动销毁
    vm_allocator: ManuallyDrop<vk_mem::Allocator>,

    #[cfg(debug_assertions)]
    destroyed: Cell<bool>,
}

// 创建与销毁
impl Gfx {
    const ENGINE_NAME: &'static str = "Lumen";

    pub fn new(app_name: &str) -> Self {
        let vk_entry = unsafe { ash::Entry::load().expect("failed to load vulkan library") };

        let instance = GfxInstance::new(&vk_entry, app_name, Self::ENGINE_NAME);

        let debug_msger =
            cfg!(debug_assertions).then(|| GfxDebugMsger::new(&vk_entry, instance.ash_instance()));

        let physical_device = GfxPhysicalDevice::new_discrete_physical_device(instance.ash_instance());

        let queue_priorities = [1.0_f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family().queue_family_index)
            .queue_priorities(&queue_priorities);
        let gfx_device = GfxDevice::new(
            instance.ash_instance(),
            physical_device.vk_handle(),
            std::slice::from_ref(&queue_create_info),
        );

        let graphics_queue =
            unsafe { gfx_device.get_device_queue(physical_device.gfx_queue_family().queue_family_index, 0) };
        gfx_device.set_object_debug_name(graphics_queue, "Queue::graphics");

        let mut vma_ci =
            vk_mem::AllocatorCreateInfo::new(instance.ash_instance(), &gfx_device, physical_device.vk_handle());
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let vm_allocator = unsafe { vk_mem::Allocator::new(vma_ci).unwrap() };

        Self {
            _entry: vk_entry,
            instance,
            debug_msger,
            physical_device,
            gfx_device,
            graphics_queue,
            vm_allocator: ManuallyDrop::new(vm_allocator),

            #[cfg(debug_assertions)]
            destroyed: Cell::new(false),
        }
    }

    pub fn destroy(mut self) {
        log::info!("Destroying Gfx");

        #[cfg(debug_assertions)]
        self.destroyed.set(true);

        // 销毁顺序：allocator -> device -> debug messenger -> instance
        unsafe {
            ManuallyDrop::drop(&mut self.vm_allocator);
        }
        self.gfx_device.destroy();
        if let Some(msger) = self.debug_msger.take() {
            msger.destroy();
        }
        self.instance.destroy();
    }
}

// getters
impl Gfx {
    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.instance
    }

    #[inline]
    pub fn gfx_device(&self) -> &GfxDevice {
        &self.gfx_device
    }

    #[inline]
    pub fn allocator(&self) -> &vk_mem::Allocator {
        &self.vm_allocator
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> GfxQueueFamily {
        self.physical_device.gfx_queue_family().clone()
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// 当 uniform buffer 的 descriptor 在更新时，其 offset 必须是这个值的整数倍
    ///
    /// 注：这个值一定是 power of 2
    #[inline]
    pub fn min_ubo_offset_align(&self) -> vk::DeviceSize {
        self.physical_device.basic_props.limits.min_uniform_buffer_offset_alignment
    }
}

// tools
impl Gfx {
    /// 通过 sync2 接口向 graphics queue 提交命令
    pub fn queue_submit(&self, submit_infos: &[GfxSubmitInfo], fence: Option<&GfxFence>) {
        let infos = submit_infos.iter().map(|si| si.submit_info()).collect_vec();
        unsafe {
            self.gfx_device
                .queue_submit2(
                    self.graphics_queue,
                    &infos,
                    fence.map_or(vk::Fence::null(), |f| f.handle()),
                )
                .unwrap();
        }
    }

    pub fn wait_idle(&self) {
        unsafe {
            self.gfx_device.device_wait_idle().unwrap();
        }
    }
}

impl Drop for Gfx {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed.get(), "Gfx must be destroyed before being dropped.");
    }
}
