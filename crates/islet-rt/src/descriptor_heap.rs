//! Slot bookkeeping for the shader-visible descriptor table.
//!
//! Slots are handed out append-only and never reused, so a slot stays valid
//! for as long as the scene lives. When the table is full it grows by a third;
//! the backend re-creates its table at the new capacity and carries every
//! written view over.

/// Index of one descriptor in the shader-visible table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSlot(pub u32);

/// A contiguous run of slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorRange {
    pub start: u32,
    pub count: u32,
}

impl DescriptorRange {
    /// The `index`-th slot of the range.
    ///
    /// # Panics
    /// Panics in debug builds if `index` is outside the range.
    pub fn slot(&self, index: u32) -> DescriptorSlot {
        debug_assert!(index < self.count, "slot {index} outside range of {}", self.count);
        DescriptorSlot(self.start + index)
    }

    pub fn slots(&self) -> impl Iterator<Item = DescriptorSlot> {
        (self.start..self.start + self.count).map(DescriptorSlot)
    }
}

/// Append-only descriptor slot allocator.
#[derive(Debug, Clone)]
pub struct DescriptorHeap {
    capacity: u32,
    len: u32,
    resized: bool,
}

impl DescriptorHeap {
    /// Capacity used when zero is requested.
    pub const DEFAULT_CAPACITY: u32 = 32;

    pub fn new(initial_capacity: u32) -> Self {
        let capacity = if initial_capacity == 0 {
            Self::DEFAULT_CAPACITY
        } else {
            initial_capacity
        };
        Self {
            capacity,
            len: 0,
            resized: false,
        }
    }

    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots handed out so far.
    pub const fn len(&self) -> u32 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hand out the next slot, growing the table if it is full.
    pub fn allocate(&mut self) -> DescriptorSlot {
        if self.len == self.capacity {
            let grown = (self.len + self.len / 3).max(self.len + 1);
            tracing::debug!("Descriptor table full at {}, growing to {grown}", self.len);
            self.capacity = grown;
            self.resized = true;
        }
        let slot = DescriptorSlot(self.len);
        self.len += 1;
        slot
    }

    /// Hand out `count` consecutive slots.
    pub fn allocate_range(&mut self, count: u32) -> DescriptorRange {
        let start = self.len;
        for _ in 0..count {
            self.allocate();
        }
        DescriptorRange { start, count }
    }

    /// New capacity if the table grew since the last call.
    pub fn take_resize(&mut self) -> Option<u32> {
        std::mem::take(&mut self.resized).then_some(self.capacity)
    }
}

impl Default for DescriptorHeap {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_uses_default() {
        let heap = DescriptorHeap::new(0);
        assert_eq!(heap.capacity(), 32);
        assert!(heap.is_empty());
    }

    #[test]
    fn grows_by_a_third_when_full() {
        let mut heap = DescriptorHeap::new(0);
        heap.allocate_range(32);
        assert_eq!(heap.capacity(), 32);
        assert_eq!(heap.take_resize(), None);

        heap.allocate();
        assert_eq!(heap.capacity(), 42);
        assert_eq!(heap.take_resize(), Some(42));
        assert_eq!(heap.take_resize(), None);

        heap.allocate_range(9);
        assert_eq!(heap.len(), 42);
        heap.allocate();
        assert_eq!(heap.capacity(), 56);
    }

    #[test]
    fn tiny_heap_still_grows() {
        let mut heap = DescriptorHeap::new(1);
        heap.allocate();
        heap.allocate();
        assert_eq!(heap.capacity(), 2);
    }

    #[test]
    fn slots_are_never_reused() {
        let mut heap = DescriptorHeap::new(4);
        let a = heap.allocate_range(2);
        let b = heap.allocate_range(3);
        let c = heap.allocate();

        assert_eq!(a, DescriptorRange { start: 0, count: 2 });
        assert_eq!(b.slot(0), DescriptorSlot(2));
        assert_eq!(b.slots().last(), Some(DescriptorSlot(4)));
        assert_eq!(c, DescriptorSlot(5));
    }
}
