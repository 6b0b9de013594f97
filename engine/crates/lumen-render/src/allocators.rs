//! 基于持久映射 buffer 的快速分配器
//!
//! - [`FixedSizeAllocator`]：在已有 buffer 的一段区间上做等长切分，
//!   O(1) 算出任意下标的偏移和映射指针，适合 per-object 的 uniform 槽位。
//! - [`UniformBufferBumpAllocator`]：跨帧的 bump 分配器，按
//!   frames-in-flight 延迟回收整块 backing buffer。

use ash::vk;
use lumen_crate_tools::arena::Handle;
use lumen_gfx::gfx::Gfx;

use crate::resource_manager::ResourceManager;
use crate::resources::{Buffer, BufferInfo, BufferMap};

#[inline]
fn align_up_pow2(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// 向下取到 `step` 的整数倍，step 不要求是 2 的幂
#[inline]
fn align_down(value: u64, step: u64) -> u64 {
    value / step * step
}

pub struct FixedSizeAllocatorInfo {
    pub buffer: Handle<Buffer>,
    /// 在 buffer 内的起始偏移，会向上对齐
    pub buffer_offset: u64,
    pub item_size: u64,
    /// 每个元素偏移的对齐要求（例如 min_ubo_offset_align），必须是 2 的幂
    pub offset_alignment: u64,
    /// 0 表示用满 buffer 的剩余空间
    pub max_item_count: u64,
}

/// 等长切分分配器
///
/// 不持有 buffer 的所有权，只缓存偏移算术需要的量。
pub struct FixedSizeAllocator {
    buffer: Handle<Buffer>,
    base_offset: u64,
    available_size: u64,
    aligned_item_size: u64,
    mapped: *mut u8,
}

impl FixedSizeAllocator {
    /// buffer 必须是持久映射的
    pub fn create(rm: &ResourceManager, info: &FixedSizeAllocatorInfo) -> Self {
        assert!(info.offset_alignment.is_power_of_two());
        assert!(info.item_size > 0);

        let base_offset = align_up_pow2(info.buffer_offset, info.offset_alignment);
        let aligned_item_size = align_up_pow2(info.item_size, info.offset_alignment);
        let buffer_slice_size = rm.get_buffer_size(info.buffer) - base_offset;
        let available_size = if info.max_item_count > 0 {
            aligned_item_size * info.max_item_count
        } else {
            align_down(buffer_slice_size, aligned_item_size)
        };
        assert!(available_size <= buffer_slice_size, "allocator range exceeds the backing buffer");

        Self {
            buffer: info.buffer,
            base_offset,
            available_size,
            aligned_item_size,
            mapped: rm.map_buffer(info.buffer),
        }
    }

    /// 容纳 item_count 个元素所需的 buffer 大小
    #[inline]
    pub fn compute_buffer_size(item_size: u64, item_count: u64, offset_alignment: u64) -> u64 {
        align_up_pow2(item_size, offset_alignment) * item_count
    }

    #[inline]
    pub fn buffer(&self) -> Handle<Buffer> {
        self.buffer
    }

    /// 第 index 个元素在 buffer 内的偏移
    #[inline]
    pub fn get_offset(&self, index: u64) -> u64 {
        debug_assert!(self.aligned_item_size * index < self.available_size, "index {index} is out of range");
        self.base_offset + self.aligned_item_size * index
    }

    #[inline]
    pub fn get_mapped_ptr(&self, index: u64) -> *mut u8 {
        self.mapped.wrapping_add(self.get_offset(index) as usize)
    }

    /// 把一个 POD 值写进第 index 个槽位
    pub fn write<T: bytemuck::NoUninit>(&self, index: u64, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        debug_assert!(bytes.len() as u64 <= self.aligned_item_size);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.get_mapped_ptr(index), bytes.len());
        }
    }

    #[cfg(test)]
    fn for_test(base_offset: u64, available_size: u64, aligned_item_size: u64, mapped: *mut u8) -> Self {
        Self {
            buffer: Handle::null(),
            base_offset,
            available_size,
            aligned_item_size,
            mapped,
        }
    }
}

pub struct UniformBufferBumpAllocatorInfo {
    pub backing_buffer_size: u64,
    /// 每次分配后游标的对齐（min_ubo_offset_align），必须是 2 的幂
    pub alignment: u64,
    pub frames_in_flight_count: u64,
}

impl Default for UniformBufferBumpAllocatorInfo {
    fn default() -> Self {
        Self {
            backing_buffer_size: 16 * 1024 * 1024,
            alignment: 256,
            frames_in_flight_count: 2,
        }
    }
}

/// 一次 bump 分配的结果；ptr 可以立刻写入
pub struct UniformAllocation {
    pub buffer: Handle<Buffer>,
    pub offset: u64,
    pub ptr: *mut u8,
}

impl UniformAllocation {
    pub fn write<T: bytemuck::NoUninit>(&self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr, bytes.len());
        }
    }
}

struct UsedBuffer {
    frame: u64,
    used_offset: u64,
    buffer: Handle<Buffer>,
    base_ptr: *mut u8,
}

struct FreeBuffer {
    buffer: Handle<Buffer>,
    base_ptr: *mut u8,
}

/// 每帧瞬态 uniform 数据的 bump 分配器
///
/// 当前帧总是写最后一块在用的 backing buffer；写满后从空闲列表取或
/// 新建一块。`next_frame` 把离开 frames-in-flight 窗口的整块归还空闲
/// 列表，所以不需要逐次释放。backing buffer 由 ResourceManager 统一销毁。
pub struct UniformBufferBumpAllocator {
    backing_buffer_size: u64,
    alignment: u64,
    frame: u64,
    frames_in_flight_count: u64,
    free_buffers: Vec<FreeBuffer>,
    used_buffers: Vec<UsedBuffer>,
}

impl UniformBufferBumpAllocator {
    pub fn new(info: &UniformBufferBumpAllocatorInfo) -> Self {
        assert!(info.frames_in_flight_count > 0);
        assert!(info.alignment.is_power_of_two());
        Self {
            backing_buffer_size: info.backing_buffer_size,
            alignment: info.alignment,
            frame: 0,
            frames_in_flight_count: info.frames_in_flight_count,
            free_buffers: Vec::new(),
            used_buffers: Vec::new(),
        }
    }

    /// 划出 size 字节；返回的偏移满足构造时给定的对齐
    pub fn allocate(&mut self, gfx: &Gfx, rm: &mut ResourceManager, size: u64) -> UniformAllocation {
        assert!(size <= self.backing_buffer_size, "allocation of {size} bytes exceeds the backing buffer");

        if let Some(allocation) = self.try_bump(size) {
            return allocation;
        }

        if self.free_buffers.is_empty() {
            let handle = rm.create_buffer(
                gfx,
                &BufferInfo {
                    size: self.backing_buffer_size,
                    usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                    map: BufferMap::PersistentlyMapped,
                    name: "uniform-bump",
                    ..Default::default()
                },
            );
            self.free_buffers.push(FreeBuffer {
                buffer: handle,
                base_ptr: rm.map_buffer(handle),
            });
        }

        let free = self.free_buffers.pop().unwrap();
        let used = UsedBuffer {
            frame: self.frame,
            used_offset: align_up_pow2(size, self.alignment),
            buffer: free.buffer,
            base_ptr: free.base_ptr,
        };
        let allocation = UniformAllocation {
            buffer: used.buffer,
            offset: 0,
            ptr: used.base_ptr,
        };
        self.used_buffers.push(used);
        allocation
    }

    /// 在当前帧最后一块在用 buffer 上继续 bump，不触碰设备；
    /// 块不属于本帧或放不下时返回 None，由 allocate 换新的 backing buffer
    fn try_bump(&mut self, size: u64) -> Option<UniformAllocation> {
        let active = self.used_buffers.last_mut()?;
        if active.frame != self.frame || active.used_offset + size > self.backing_buffer_size {
            return None;
        }
        let allocation = UniformAllocation {
            buffer: active.buffer,
            offset: active.used_offset,
            ptr: active.base_ptr.wrapping_add(active.used_offset as usize),
        };
        active.used_offset = align_up_pow2(active.used_offset + size, self.alignment);
        Some(allocation)
    }

    /// 推进帧号并回收离开 frames-in-flight 窗口的 backing buffer
    pub fn next_frame(&mut self) {
        self.frame += 1;
        let mut i = 0;
        while i < self.used_buffers.len() {
            if self.used_buffers[i].frame + self.frames_in_flight_count <= self.frame {
                let used = self.used_buffers.swap_remove(i);
                self.free_buffers.push(FreeBuffer {
                    buffer: used.buffer,
                    base_ptr: used.base_ptr,
                });
            } else {
                i += 1;
            }
        }
    }

    #[cfg(test)]
    fn seed_used(&mut self, frame: u64, used_offset: u64) {
        self.used_buffers.push(UsedBuffer {
            frame,
            used_offset,
            buffer: Handle::null(),
            base_ptr: std::ptr::null_mut(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_helpers() {
        assert_eq!(align_up_pow2(0, 256), 0);
        assert_eq!(align_up_pow2(1, 256), 256);
        assert_eq!(align_up_pow2(256, 256), 256);
        assert_eq!(align_up_pow2(257, 64), 320);
        assert_eq!(align_down(1000, 192), 960);
        assert_eq!(align_down(191, 192), 0);
    }

    #[test]
    fn compute_buffer_size_rounds_item_up() {
        // 68 字节的元素在 256 对齐下每个占 256
        assert_eq!(FixedSizeAllocator::compute_buffer_size(68, 10, 256), 2560);
        assert_eq!(FixedSizeAllocator::compute_buffer_size(256, 4, 256), 1024);
    }

    #[test]
    fn fixed_size_offsets_are_strided() {
        let base = 0x1000_usize as *mut u8;
        let allocator = FixedSizeAllocator::for_test(512, 256 * 8, 256, base);

        assert_eq!(allocator.get_offset(0), 512);
        assert_eq!(allocator.get_offset(3), 512 + 3 * 256);
        assert_eq!(allocator.get_mapped_ptr(2) as usize, 0x1000 + 512 + 2 * 256);
    }

    #[test]
    fn bump_offsets_are_increasing_and_aligned() {
        let mut allocator = UniformBufferBumpAllocator::new(&UniformBufferBumpAllocatorInfo {
            backing_buffer_size: 1024,
            alignment: 256,
            frames_in_flight_count: 2,
        });
        allocator.seed_used(0, 0);

        // 68 字节的分配占满一个 256 的对齐槽
        assert_eq!(allocator.try_bump(68).unwrap().offset, 0);
        assert_eq!(allocator.try_bump(68).unwrap().offset, 256);
        assert_eq!(allocator.try_bump(512).unwrap().offset, 512);
        // backing buffer 写满，需要 allocate 换一块新的（新块从偏移 0 开始）
        assert!(allocator.try_bump(512).is_none());
    }

    #[test]
    fn bump_skips_buffers_from_earlier_frames() {
        let mut allocator = UniformBufferBumpAllocator::new(&UniformBufferBumpAllocatorInfo {
            backing_buffer_size: 1024,
            alignment: 256,
            frames_in_flight_count: 2,
        });
        allocator.seed_used(0, 64);
        allocator.next_frame();

        // 上一帧的块还有空间，但不属于当前帧
        assert!(allocator.try_bump(64).is_none());
    }

    #[test]
    fn bump_allocator_recycles_after_window() {
        let mut allocator = UniformBufferBumpAllocator::new(&UniformBufferBumpAllocatorInfo {
            frames_in_flight_count: 2,
            ..Default::default()
        });
        allocator.seed_used(0, 1024);

        // 帧 1：仍在窗口内
        allocator.next_frame();
        assert_eq!(allocator.free_buffers.len(), 0);
        assert_eq!(allocator.used_buffers.len(), 1);

        // 帧 2：0 + 2 <= 2，整块回收
        allocator.next_frame();
        assert_eq!(allocator.free_buffers.len(), 1);
        assert_eq!(allocator.used_buffers.len(), 0);
    }

    #[test]
    fn bump_allocator_recycles_only_expired_buffers() {
        let mut allocator = UniformBufferBumpAllocator::new(&UniformBufferBumpAllocatorInfo {
            frames_in_flight_count: 3,
            ..Default::default()
        });
        allocator.seed_used(0, 64);
        allocator.frame = 2;
        allocator.seed_used(2, 64);

        allocator.next_frame();
        // 帧 3：只有帧 0 的那块出窗
        assert_eq!(allocator.free_buffers.len(), 1);
        assert_eq!(allocator.used_buffers.len(), 1);
        assert_eq!(allocator.used_buffers[0].frame, 2);
    }
}
