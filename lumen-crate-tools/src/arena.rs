use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// 带代际校验的类型化资源句柄
///
/// handle 是资源在整个引擎中流通的唯一方式：只有 32 位 index + 32 位
/// generation，可以随意按值复制和比较。槽位被回收后 generation 会自增，
/// 因此外部残留的旧 handle 会校验失败，而不是悄悄指向新资源。
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

// 手动实现这些 trait，避免给 T 引入多余的约束
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}
impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}
impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle<{}>(null)", std::any::type_name::<T>())
        } else {
            write!(f, "Handle<{}>({}, gen {})", std::any::type_name::<T>(), self.index, self.generation)
        }
    }
}
impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Handle<T> {
    /// 表示 "没有资源" 的哨兵值
    #[inline]
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: u32::MAX,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.generation == u32::MAX
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// 从裸的 index/generation 重建 handle，用于序列化或测试；
    /// 与 arena 不符的值会得到一个过期 handle
    #[inline]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn new(index: u32, generation: u32) -> Self {
        Self::from_raw(index, generation)
    }
}

/// 代际竞技场：free-list 管理的稳定存储池
///
/// 存活的条目永远不会移动，因此 add/remove 不会让无关的 handle 失效。
/// `remove` 会让槽位的 generation 自增，旧 handle 立即过期。
/// 所有操作均摊 O(1)。
pub struct GenerationalArena<T> {
    slots: Vec<Option<T>>,
    gens: Vec<u32>,
    /// 空闲槽位下标，LIFO 复用
    free: Vec<u32>,
}

impl<T> Default for GenerationalArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenerationalArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            gens: Vec::new(),
            free: Vec::new(),
        }
    }

    /// 放入一个值，返回它的 handle
    ///
    /// 新槽位从 generation 0 开始；复用的槽位使用 remove 时自增过的值。
    pub fn add(&mut self, value: T) -> Handle<T> {
        if let Some(index) = self.free.pop() {
            debug_assert!(self.slots[index as usize].is_none());
            self.slots[index as usize] = Some(value);
            return Handle::new(index, self.gens[index as usize]);
        }
        assert!(self.slots.len() < u32::MAX as usize, "arena is full");
        self.slots.push(Some(value));
        self.gens.push(0);
        Handle::new((self.slots.len() - 1) as u32, 0)
    }

    /// handle 有效 <=> index 在范围内且 generation 与槽位一致
    #[inline]
    pub fn is_valid(&self, handle: Handle<T>) -> bool {
        (handle.index as usize) < self.slots.len() && self.gens[handle.index as usize] == handle.generation
    }

    /// 按 handle 取值
    ///
    /// 前置条件：handle 有效。违反属于调用方 bug，debug 下 assert，
    /// release 下行为未定义（panic on None）。
    #[inline]
    pub fn get(&self, handle: Handle<T>) -> &T {
        debug_assert!(self.is_valid(handle), "stale or out-of-range handle: {handle:?}");
        self.slots[handle.index as usize].as_ref().unwrap()
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        debug_assert!(self.is_valid(handle), "stale or out-of-range handle: {handle:?}");
        self.slots[handle.index as usize].as_mut().unwrap()
    }

    /// 校验版的 get，handle 过期时返回 None
    #[inline]
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        if self.is_valid(handle) {
            self.slots[handle.index as usize].as_ref()
        } else {
            None
        }
    }

    /// 移除条目并交还所有权，槽位 generation 自增后进入 free-list
    pub fn remove(&mut self, handle: Handle<T>) -> T {
        assert!(self.is_valid(handle), "removing with stale or out-of-range handle: {handle:?}");
        let value = self.slots[handle.index as usize].take().unwrap();
        self.gens[handle.index as usize] += 1;
        self.free.push(handle.index);
        value
    }

    /// 取出所有存活条目，用于整体销毁
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.gens.clear();
        self.slots.drain(..).flatten()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get() {
        let mut arena = GenerationalArena::new();
        let a = arena.add(41);
        let b = arena.add(42);

        assert!(arena.is_valid(a));
        assert!(arena.is_valid(b));
        assert_eq!(*arena.get(a), 41);
        assert_eq!(*arena.get(b), 42);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn remove_invalidates_handle() {
        let mut arena = GenerationalArena::new();
        let h = arena.add("resource");

        assert_eq!(arena.remove(h), "resource");
        assert!(!arena.is_valid(h));
        assert!(arena.try_get(h).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn reuse_bumps_generation() {
        let mut arena = GenerationalArena::new();
        let _ = arena.add(0u32);
        let _ = arena.add(1u32);
        let _ = arena.add(2u32);
        let h = arena.add(3u32);
        assert_eq!((h.index(), h.generation()), (3, 0));

        arena.remove(h);
        let reused = arena.add(33u32);

        // 槽位 3 被复用，但 generation 递增，旧 handle 保持过期
        assert_eq!((reused.index(), reused.generation()), (3, 1));
        assert_ne!(reused, h);
        assert!(!arena.is_valid(h));
        assert!(arena.is_valid(reused));
        assert_eq!(*arena.get(reused), 33);
    }

    #[test]
    fn free_list_is_lifo() {
        let mut arena = GenerationalArena::new();
        let a = arena.add('a');
        let b = arena.add('b');

        arena.remove(a);
        arena.remove(b);

        // 后释放的槽位先被复用
        assert_eq!(arena.add('c').index(), b.index());
        assert_eq!(arena.add('d').index(), a.index());
    }

    #[test]
    fn unrelated_handles_survive_removal() {
        let mut arena = GenerationalArena::new();
        let a = arena.add(10);
        let b = arena.add(20);
        let c = arena.add(30);

        arena.remove(b);

        assert_eq!(*arena.get(a), 10);
        assert_eq!(*arena.get(c), 30);
    }

    #[test]
    fn null_handle_is_never_valid() {
        let mut arena = GenerationalArena::new();
        arena.add(1);

        let null = Handle::<i32>::null();
        assert!(null.is_null());
        assert!(!arena.is_valid(null));
        assert_eq!(null, Handle::null());
    }

    #[test]
    fn drain_empties_arena() {
        let mut arena = GenerationalArena::new();
        arena.add(1);
        let h = arena.add(2);
        arena.add(3);
        arena.remove(h);

        let mut drained: Vec<i32> = arena.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 3]);
        assert!(arena.is_empty());
    }
}
