/// 按 frames-in-flight 延迟复用对象的池子
///
/// 取出的对象会标记上当前帧号，只有当帧号再次轮转回来
/// （即 `next_frame` 被调用满 `frame_count` 次）之后才会回到空闲列表，
/// 保证 GPU 可能还在使用的对象不会被提前复用。
pub struct FramePool<T: Copy> {
    frame: u32,
    frame_count: u32,
    free: Vec<T>,
    used: Vec<(u32, T)>,
}

impl<T: Copy> FramePool<T> {
    pub fn new(frame_count: u32) -> Self {
        assert!(frame_count > 0, "frame pool needs at least one frame");
        Self {
            frame: 0,
            frame_count,
            free: Vec::new(),
            used: Vec::new(),
        }
    }

    /// 优先复用空闲对象，否则通过 factory 创建一个新的
    pub fn get_or_add(&mut self, factory: impl FnOnce() -> T) -> T {
        let value = self.free.pop().unwrap_or_else(factory);
        self.used.push((self.frame, value));
        value
    }

    /// 推进到下一帧，回收所有标记为新当前帧的对象
    pub fn next_frame(&mut self) {
        self.next_frame_with(|_| {});
    }

    /// 推进到下一帧，回收前对每个对象调用一次 reset
    pub fn next_frame_with(&mut self, mut reset: impl FnMut(&mut T)) {
        self.frame = (self.frame + 1) % self.frame_count;

        let mut i = 0;
        while i < self.used.len() {
            if self.used[i].0 == self.frame {
                let (_, mut value) = self.used.swap_remove(i);
                reset(&mut value);
                self.free.push(value);
            } else {
                i += 1;
            }
        }
    }

    /// 取出所有对象（空闲的和在途的），用于整体销毁
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.drain(..).chain(self.used.drain(..).map(|(_, value)| value))
    }

    #[inline]
    pub fn current_frame(&self) -> u32 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_runs_when_pool_is_empty() {
        let mut pool = FramePool::new(2);
        let mut next_id = 0;
        let mut make = || {
            next_id += 1;
            next_id
        };

        assert_eq!(pool.get_or_add(&mut make), 1);
        assert_eq!(pool.get_or_add(&mut make), 2);
    }

    #[test]
    fn object_returns_after_full_rotation() {
        let mut pool = FramePool::new(2);
        let a = pool.get_or_add(|| 7);

        // 帧 1：a 仍在途，必须新建
        pool.next_frame();
        let b = pool.get_or_add(|| 8);
        assert_ne!(a, b);

        // 帧 0：a 回收，可以复用
        pool.next_frame();
        assert_eq!(pool.get_or_add(|| 9), a);
    }

    #[test]
    fn reset_runs_on_recycle() {
        let mut pool = FramePool::new(2);
        pool.get_or_add(|| 5);

        pool.next_frame();
        let mut reset_values = Vec::new();
        pool.next_frame_with(|v| reset_values.push(*v));

        assert_eq!(reset_values, vec![5]);
    }

    #[test]
    fn drain_yields_free_and_in_flight() {
        let mut pool = FramePool::new(3);
        pool.get_or_add(|| 1);
        pool.next_frame();
        pool.get_or_add(|| 2);
        pool.next_frame();
        pool.next_frame();
        // 此时 1 已回收到空闲列表，2 仍在途

        let mut all: Vec<i32> = pool.drain().collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn three_frame_rotation() {
        let mut pool = FramePool::new(3);
        let a = pool.get_or_add(|| 100);

        pool.next_frame();
        assert_ne!(pool.get_or_add(|| 200), a);
        pool.next_frame();
        assert_ne!(pool.get_or_add(|| 300), a);
        pool.next_frame();
        assert_eq!(pool.get_or_add(|| 400), a);
    }
}
