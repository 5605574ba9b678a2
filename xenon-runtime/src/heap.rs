//! 句柄式堆与标记清除 GC
//!
//! 对象存放在槽位数组里，句柄携带槽位代数。清除时槽位代数递增，
//! 宿主残留的旧句柄访问得到 None。回收只发生在 VM 的安全点，
//! 原生函数执行期间不会触发。
//!
//! 根集合由调用方收集（全局表、各纤程栈、钉住的句柄），堆自身
//! 负责从根出发的可达性追踪。

use tracing::debug;

use crate::object::{Closure, HeapObj};
use crate::value::{Handle, Value};

/// 一次回收的结果统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub freed_objects: usize,
    pub live_objects: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

struct Slot {
    generation: u32,
    entry: Option<HeapObj>,
    size: usize,
}

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    bytes_allocated: usize,
    threshold: usize,
    initial_threshold: usize,
    /// 宿主钉住的句柄（带计数，可重复钉）
    pinned: Vec<(Handle, usize)>,
}

impl Heap {
    pub fn new(gc_threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            bytes_allocated: 0,
            threshold: gc_threshold,
            initial_threshold: gc_threshold,
            pinned: Vec::new(),
        }
    }

    pub fn alloc(&mut self, obj: HeapObj) -> Handle {
        let size = obj.approximate_size();
        self.bytes_allocated += size;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(obj);
                slot.size = size;
                Handle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(obj),
                    size,
                });
                Handle {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn alloc_string(&mut self, s: impl Into<String>) -> Handle {
        self.alloc(HeapObj::Str(s.into()))
    }

    /// 解引用；代数失配（对象已回收）得到 None
    pub fn get(&self, handle: Handle) -> Option<&HeapObj> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut HeapObj> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// 钉住句柄使其在回收中存活（宿主持有期间用）
    pub fn pin(&mut self, handle: Handle) {
        match self.pinned.iter_mut().find(|(h, _)| *h == handle) {
            Some((_, count)) => *count += 1,
            None => self.pinned.push((handle, 1)),
        }
    }

    pub fn unpin(&mut self, handle: Handle) {
        if let Some(pos) = self.pinned.iter().position(|(h, _)| *h == handle) {
            self.pinned[pos].1 -= 1;
            if self.pinned[pos].1 == 0 {
                self.pinned.swap_remove(pos);
            }
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// 是否到达回收阈值（安全点检查）
    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.threshold
    }

    /// 标记清除。roots 由调用方收集，堆补上钉住的句柄。
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Handle>) -> GcStats {
        let bytes_before = self.bytes_allocated;
        let mut marked = vec![false; self.slots.len()];
        let mut work: Vec<u32> = Vec::new();

        let mut push_root = |work: &mut Vec<u32>, slots: &[Slot], handle: Handle| {
            if let Some(slot) = slots.get(handle.index as usize) {
                if slot.generation == handle.generation && slot.entry.is_some() {
                    work.push(handle.index);
                }
            }
        };
        for handle in roots {
            push_root(&mut work, &self.slots, handle);
        }
        for (handle, _) in &self.pinned {
            push_root(&mut work, &self.slots, *handle);
        }

        // 标记
        while let Some(index) = work.pop() {
            if marked[index as usize] {
                continue;
            }
            marked[index as usize] = true;
            if let Some(entry) = &self.slots[index as usize].entry {
                trace_children(entry, |child| {
                    if let Some(slot) = self.slots.get(child.index as usize) {
                        if slot.generation == child.generation
                            && slot.entry.is_some()
                            && !marked[child.index as usize]
                        {
                            work.push(child.index);
                        }
                    }
                });
            }
        }

        // 清除：代数递增使旧句柄失效
        let mut freed = 0usize;
        let mut live = 0usize;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.is_none() {
                continue;
            }
            if marked[index] {
                live += 1;
            } else {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.bytes_allocated -= slot.size;
                slot.size = 0;
                self.free.push(index as u32);
                freed += 1;
            }
        }

        // 下次触发点随存活量放大，避免贴着阈值反复回收
        self.threshold = self.initial_threshold.max(self.bytes_allocated * 2);

        let stats = GcStats {
            freed_objects: freed,
            live_objects: live,
            bytes_before,
            bytes_after: self.bytes_allocated,
        };
        debug!(
            target: "xenon::gc",
            freed = stats.freed_objects,
            live = stats.live_objects,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "mark-sweep collection"
        );
        stats
    }
}

/// 枚举一个对象直接引用的句柄
fn trace_children(obj: &HeapObj, mut visit: impl FnMut(Handle)) {
    let mut visit_value = |v: &Value| {
        if let Some(handle) = v.handle() {
            visit(handle);
        }
    };
    match obj {
        HeapObj::Str(_) | HeapObj::Fiber(_) => {}
        HeapObj::Array(items) => items.iter().for_each(&mut visit_value),
        HeapObj::Map(entries) => entries.values().for_each(&mut visit_value),
        HeapObj::Cell(value) => visit_value(value),
        HeapObj::Closure(Closure { upvalues, .. }) => {
            for handle in upvalues {
                visit(*handle);
            }
        }
        HeapObj::Exception(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut heap = Heap::new(1024);
        let h = heap.alloc_string("hello");
        assert!(matches!(heap.get(h), Some(HeapObj::Str(s)) if s == "hello"));
    }

    #[test]
    fn test_unreachable_object_is_freed() {
        let mut heap = Heap::new(1024);
        let kept = heap.alloc_string("kept");
        let dropped = heap.alloc_string("dropped");
        let stats = heap.collect([kept]);
        assert_eq!(stats.freed_objects, 1);
        assert!(heap.get(kept).is_some());
        // 旧句柄代数失配
        assert!(heap.get(dropped).is_none());
    }

    #[test]
    fn test_slot_reuse_invalidates_old_handle() {
        let mut heap = Heap::new(1024);
        let old = heap.alloc_string("old");
        heap.collect([]);
        let new = heap.alloc_string("new");
        // 槽位复用但代数不同
        assert_eq!(old.index, new.index);
        assert!(heap.get(old).is_none());
        assert!(matches!(heap.get(new), Some(HeapObj::Str(s)) if s == "new"));
    }

    #[test]
    fn test_reachability_through_containers() {
        let mut heap = Heap::new(1024);
        let inner = heap.alloc_string("inner");
        let array = heap.alloc(HeapObj::Array(vec![Value::Str(inner)]));
        let cell = heap.alloc(HeapObj::Cell(Value::Obj(array)));
        heap.collect([cell]);
        assert!(heap.get(inner).is_some());
        assert!(heap.get(array).is_some());
    }

    #[test]
    fn test_pinned_objects_survive() {
        let mut heap = Heap::new(1024);
        let h = heap.alloc_string("pinned");
        heap.pin(h);
        heap.collect([]);
        assert!(heap.get(h).is_some());
        heap.unpin(h);
        heap.collect([]);
        assert!(heap.get(h).is_none());
    }

    #[test]
    fn test_cycle_is_collected() {
        let mut heap = Heap::new(1024);
        let a = heap.alloc(HeapObj::Array(Vec::new()));
        let b = heap.alloc(HeapObj::Array(vec![Value::Obj(a)]));
        if let Some(HeapObj::Array(items)) = heap.get_mut(a) {
            items.push(Value::Obj(b));
        }
        let stats = heap.collect([]);
        assert_eq!(stats.freed_objects, 2);
    }

    #[test]
    fn test_bytes_accounting() {
        let mut heap = Heap::new(16);
        assert!(!heap.should_collect());
        heap.alloc_string("some longer allocation to cross the threshold");
        assert!(heap.should_collect());
    }
}
