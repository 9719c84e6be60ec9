//! Block-grown storage for the hot network structures.
//!
//! [`Arena`] hands out generational [`Id`]s so a handle to a freed slot is
//! detected instead of silently aliasing whatever reuses it. Freed slots are
//! threaded onto a free list through an explicit `Vacant` variant.
//!
//! [`SlicePool`] stores the per-instance connection arrays back to back and
//! recycles them through free lists bucketed by exact length.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Default byte budget of one allocation block.
pub const DEFAULT_BLOCK_BYTES: usize = 16 * 1024;

/// Smallest number of slots a block grows by.
const MIN_BLOCK_LEN: usize = 16;

/// Generational handle into an [`Arena<T>`].
pub struct Id<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// A handle that never resolves.
    pub const INVALID: Id<T> = Id {
        index: u32::MAX,
        generation: u32::MAX,
        _marker: PhantomData,
    };

    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index, stable for the lifetime of the handle.
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Free-listed storage growing one block at a time.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    block_len: usize,
    blocks: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::with_block_bytes(DEFAULT_BLOCK_BYTES)
    }

    /// Creates an arena whose blocks hold about `block_bytes` bytes.
    pub fn with_block_bytes(block_bytes: usize) -> Self {
        let slot_size = std::mem::size_of::<Slot<T>>().max(1);
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            block_len: (block_bytes / slot_size).max(MIN_BLOCK_LEN),
            blocks: 0,
        }
    }

    /// Stores a value, reusing a freed slot if one exists.
    pub fn insert(&mut self, value: T) -> Id<T> {
        self.len += 1;
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let (generation, next_free) = match slot {
                Slot::Vacant {
                    generation,
                    next_free,
                } => (*generation, *next_free),
                Slot::Occupied { .. } => unreachable!("free list points at a live slot"),
            };
            *slot = Slot::Occupied { generation, value };
            self.free_head = next_free;
            return Id::new(index, generation);
        }

        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(self.block_len);
            self.blocks += 1;
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        Id::new(index, 0)
    }

    /// Frees a slot. Returns `None` if the handle is stale.
    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => {}
            _ => return None,
        }
        let vacant = Slot::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let old = std::mem::replace(slot, vacant);
        self.free_head = Some(id.index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        match self.slots.get(id.index())? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        match self.slots.get_mut(id.index())? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.get(id).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks grown so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((Id::new(index as u32, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    /// Handles of all live values, in slot order.
    pub fn ids(&self) -> Vec<Id<T>> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::ops::Index<Id<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale arena handle {id:?}"),
        }
    }
}

impl<T> std::ops::IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("stale arena handle {id:?}"),
        }
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .field("blocks", &self.blocks)
            .finish()
    }
}

/// A run of items inside a [`SlicePool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SliceRange {
    start: u32,
    len: u16,
    cap: u16,
}

impl SliceRange {
    pub const EMPTY: SliceRange = SliceRange {
        start: 0,
        len: 0,
        cap: 0,
    };

    pub fn len(self) -> usize {
        self.len as usize
    }

    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Slots reserved for the run; at least `len`.
    pub fn capacity(self) -> usize {
        self.cap as usize
    }
}

/// Largest run length with its own free list.
const MAX_BUCKET: usize = 6;

/// Contiguous variable-length arrays with per-length free lists.
///
/// Runs of length 1 are rounded up to 2. Runs longer than the largest
/// bucket are carved from the end of the pool and split into chunks of 4
/// when freed.
pub struct SlicePool<T> {
    items: Vec<T>,
    free: [Vec<u32>; MAX_BUCKET + 1],
    live: usize,
    block_len: usize,
}

impl<T: Default> SlicePool<T> {
    pub fn new() -> Self {
        Self::with_block_bytes(DEFAULT_BLOCK_BYTES)
    }

    pub fn with_block_bytes(block_bytes: usize) -> Self {
        let item_size = std::mem::size_of::<T>().max(1);
        Self {
            items: Vec::new(),
            free: Default::default(),
            live: 0,
            block_len: (block_bytes / item_size).max(MIN_BLOCK_LEN),
        }
    }

    /// Reserves a run of `len` default-initialised items.
    pub fn alloc(&mut self, len: usize) -> SliceRange {
        if len == 0 {
            return SliceRange::EMPTY;
        }
        let cap = len.max(2);
        self.live += cap;

        if cap <= MAX_BUCKET {
            if let Some(start) = self.free[cap].pop() {
                let run = &mut self.items[start as usize..start as usize + cap];
                run.iter_mut().for_each(|item| *item = T::default());
                return SliceRange {
                    start,
                    len: len as u16,
                    cap: cap as u16,
                };
            }
        }

        let start = self.items.len();
        if self.items.capacity() - start < cap {
            self.items.reserve_exact(self.block_len.max(cap));
        }
        self.items.extend((0..cap).map(|_| T::default()));
        SliceRange {
            start: start as u32,
            len: len as u16,
            cap: cap as u16,
        }
    }

    /// Returns a run to the free lists.
    pub fn free(&mut self, range: SliceRange) {
        let mut cap = range.capacity();
        if cap == 0 {
            return;
        }
        self.live -= cap;
        let mut start = range.start;
        while cap > MAX_BUCKET {
            self.free[4].push(start);
            start += 4;
            cap -= 4;
        }
        self.free[cap].push(start);
    }

    pub fn get(&self, range: SliceRange) -> &[T] {
        &self.items[range.start as usize..range.start as usize + range.len()]
    }

    pub fn get_mut(&mut self, range: SliceRange) -> &mut [T] {
        &mut self.items[range.start as usize..range.start as usize + range.len()]
    }

    /// Items currently handed out, counting rounding.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Free runs waiting in the bucket for `len`.
    pub fn free_runs(&self, len: usize) -> usize {
        self.free.get(len).map_or(0, Vec::len)
    }

    /// Total items ever carved from the pool.
    pub fn footprint(&self) -> usize {
        self.items.len()
    }
}

impl<T: Default> Default for SlicePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SlicePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlicePool")
            .field("live", &self.live)
            .field("footprint", &self.items.len())
            .finish()
    }
}
