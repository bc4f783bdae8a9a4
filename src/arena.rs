//! Bump allocator over pre-reserved memory.
//!
//! An [`Arena`] hands out sub-slices of one contiguous memory block by advancing a `used`
//! offset. Memory is never freed individually: callers rewind the arena, either manually via
//! [`Arena::pop_size`] or with scoped [`TemporaryMemory`] and [`SubArena`] guards. Guards borrow
//! their parent mutably, so regions are always closed in LIFO order.
//!
//! Overflowing an arena is a fatal error: arenas must be sized generously up front, as the
//! real-time audio path can't recover from a failed allocation.

use std::{
    alloc::{self, Layout},
    cell::{Cell, RefCell, RefMut},
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    slice,
};

use num_complex::Complex;

use crate::utils::unique_usize_id;

// -------------------------------------------------------------------------------------------------

/// Number of arenas in an [`ArenaPool`].
pub const ARENA_SCRATCH_POOL_COUNT: usize = 2;

/// Alignment of memory blocks which are allocated by [`Arena::with_capacity`].
const OWNED_MEMORY_ALIGNMENT: usize = 64;

// -------------------------------------------------------------------------------------------------

/// Options for a single arena push.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaPushFlags {
    /// Fill the pushed memory with zeros. Else the memory keeps whatever previous pushes
    /// left in there.
    pub clear_to_zero: bool,
    /// Power of two alignment of the pushed memory's address. 0 means no extra alignment.
    pub alignment: usize,
}

impl ArenaPushFlags {
    /// Zeroed memory without extra alignment.
    pub const ZERO: Self = Self {
        clear_to_zero: true,
        alignment: 0,
    };

    pub const fn zero_align(alignment: usize) -> Self {
        Self {
            clear_to_zero: true,
            alignment,
        }
    }

    pub const fn no_zero_align(alignment: usize) -> Self {
        Self {
            clear_to_zero: false,
            alignment,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Marker for plain numeric types which can be read from arbitrary initialized arena bytes.
///
/// # Safety
/// Every bit pattern must be a valid value of the implementing type, and the type must not
/// implement `Drop`.
pub unsafe trait ArenaValue: Copy {}

unsafe impl ArenaValue for u8 {}
unsafe impl ArenaValue for i8 {}
unsafe impl ArenaValue for u16 {}
unsafe impl ArenaValue for i16 {}
unsafe impl ArenaValue for u32 {}
unsafe impl ArenaValue for i32 {}
unsafe impl ArenaValue for u64 {}
unsafe impl ArenaValue for i64 {}
unsafe impl ArenaValue for usize {}
unsafe impl ArenaValue for f32 {}
unsafe impl ArenaValue for f64 {}
unsafe impl<T: ArenaValue> ArenaValue for Complex<T> {}

// -------------------------------------------------------------------------------------------------

/// Unique identifier of an [`Arena`], used to exclude arenas when fetching scratch memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(usize);

// -------------------------------------------------------------------------------------------------

/// A contiguous memory region with a monotonically increasing `used` offset.
///
/// Pushes only need a shared reference, so multiple pushed slices can be alive at the same
/// time. Rewinding requires a mutable reference, which ensures no pushed slice outlives the
/// memory it points to.
#[derive(Debug)]
pub struct Arena<'m> {
    id: ArenaId,
    base: NonNull<u8>,
    capacity: usize,
    used: Cell<usize>,
    owned: bool,
    _memory: PhantomData<&'m mut [u8]>,
}

// The arena exclusively owns or borrows its memory block.
unsafe impl Send for Arena<'_> {}

impl<'m> Arena<'m> {
    /// Create a new arena over caller provided storage.
    pub fn begin(memory: &'m mut [u8]) -> Self {
        let capacity = memory.len();
        let base = NonNull::new(memory.as_mut_ptr()).unwrap_or(NonNull::dangling());
        // SAFETY: memory is borrowed exclusively for 'm
        unsafe { Self::from_raw_parts(base, capacity, false) }
    }

    unsafe fn from_raw_parts(base: NonNull<u8>, capacity: usize, owned: bool) -> Self {
        Self {
            id: ArenaId(unique_usize_id()),
            base,
            capacity,
            used: Cell::new(0),
            owned,
            _memory: PhantomData,
        }
    }

    /// The arena's unique id.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Total size of the arena's memory in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current push offset in bytes.
    pub fn pos(&self) -> usize {
        self.used.get()
    }

    /// Number of bytes which still can be pushed, ignoring alignment padding.
    pub fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Push `size` bytes.
    ///
    /// Panics when the arena has not enough space left.
    #[allow(clippy::mut_from_ref)]
    pub fn push_size(&self, size: usize, flags: ArenaPushFlags) -> &mut [u8] {
        let ptr = self.push_raw(size, flags.alignment.max(1));
        if flags.clear_to_zero {
            // SAFETY: ptr points to `size` freshly reserved bytes
            unsafe { ptr::write_bytes(ptr, 0, size) };
        }
        // SAFETY: the reserved range is disjoint from all other live pushes
        unsafe { slice::from_raw_parts_mut(ptr, size) }
    }

    /// Push an array of `count` plain values, aligned to at least the value type's alignment.
    #[allow(clippy::mut_from_ref)]
    pub fn push_array<T: ArenaValue>(&self, count: usize, flags: ArenaPushFlags) -> &mut [T] {
        let size = count
            .checked_mul(mem::size_of::<T>())
            .unwrap_or_else(|| panic!("Arena push of {count} values overflows"));
        let ptr = self.push_raw(size, flags.alignment.max(mem::align_of::<T>()));
        if flags.clear_to_zero {
            // SAFETY: ptr points to `size` freshly reserved bytes
            unsafe { ptr::write_bytes(ptr, 0, size) };
        }
        // SAFETY: memory is initialized, properly aligned and every bit pattern is a valid T
        unsafe { slice::from_raw_parts_mut(ptr as *mut T, count) }
    }

    /// Push an array of `count` values, initializing each value with the given function.
    #[allow(clippy::mut_from_ref)]
    pub fn push_array_with<T: Copy, F: FnMut(usize) -> T>(
        &self,
        count: usize,
        mut init: F,
    ) -> &mut [T] {
        let size = count
            .checked_mul(mem::size_of::<T>())
            .unwrap_or_else(|| panic!("Arena push of {count} values overflows"));
        let ptr = self.push_raw(size, mem::align_of::<T>()) as *mut T;
        for index in 0..count {
            // SAFETY: index is within the reserved and aligned range
            unsafe { ptr.add(index).write(init(index)) };
        }
        // SAFETY: all values got initialized above
        unsafe { slice::from_raw_parts_mut(ptr, count) }
    }

    /// Push a single value.
    #[allow(clippy::mut_from_ref)]
    pub fn push_value<T: Copy>(&self, value: T) -> &mut T {
        &mut self.push_array_with(1, |_| value)[0]
    }

    /// Rewind the arena by `size` bytes. `size` must match previous pushes, including padding.
    pub fn pop_size(&mut self, size: usize) {
        let used = self.used.get();
        assert!(size <= used, "Arena pop of {size} bytes exceeds used size {used}");
        self.used.set(used - size);
    }

    /// Rewind the arena to the given, previously fetched [`pos`](Self::pos).
    pub fn pop_to(&mut self, pos: usize) {
        let used = self.used.get();
        assert!(pos <= used, "Arena pop to {pos} is beyond used size {used}");
        self.used.set(pos);
    }

    /// Rewind the arena to its start.
    pub fn clear(&mut self) {
        self.used.set(0);
    }

    /// Open a temporary region, which restores the current position when dropped.
    pub fn begin_temporary_memory(&mut self) -> TemporaryMemory<'_, 'm> {
        let pos = self.pos();
        TemporaryMemory { arena: self, pos }
    }

    /// Carve out a nested arena of `size` bytes. Closing it subtracts exactly `size` bytes
    /// from this arena again.
    pub fn sub_arena(&mut self, size: usize) -> SubArena<'_, 'm> {
        let base = self.push_raw(size, 1);
        let base = NonNull::new(base).unwrap_or(NonNull::dangling());
        // SAFETY: the region is reserved in the parent, which stays borrowed by the guard
        let arena = unsafe { Arena::from_raw_parts(base, size, false) };
        SubArena {
            parent: self,
            arena,
            size,
        }
    }

    fn push_raw(&self, size: usize, alignment: usize) -> *mut u8 {
        assert!(
            alignment.is_power_of_two(),
            "Arena alignment must be a power of two, got {alignment}"
        );
        let used = self.used.get();
        let address = (self.base.as_ptr() as usize).wrapping_add(used);
        let padding = address.wrapping_neg() & (alignment - 1);
        let start = used + padding;
        match start.checked_add(size) {
            Some(end) if end <= self.capacity => {
                self.used.set(end);
                // SAFETY: start is within the arena's memory block
                unsafe { self.base.as_ptr().add(start) }
            }
            _ => panic!(
                "Arena overflow: pushing {size} bytes at {start} exceeds the capacity of {} bytes",
                self.capacity
            ),
        }
    }
}

impl Arena<'static> {
    /// Create a new arena with its own, zero initialized heap memory block.
    ///
    /// This allocates, so must be called outside of the real-time audio path.
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            // SAFETY: a zero sized arena never dereferences its base
            return unsafe { Self::from_raw_parts(NonNull::dangling(), 0, false) };
        }
        let layout = Layout::from_size_align(capacity, OWNED_MEMORY_ALIGNMENT)
            .unwrap_or_else(|err| panic!("Invalid arena capacity {capacity}: {err}"));
        // SAFETY: layout has a non zero size
        let memory = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(memory) else {
            alloc::handle_alloc_error(layout);
        };
        // SAFETY: memory is freshly allocated and owned by the arena
        unsafe { Self::from_raw_parts(base, capacity, true) }
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        if self.owned {
            if let Ok(layout) = Layout::from_size_align(self.capacity, OWNED_MEMORY_ALIGNMENT) {
                // SAFETY: memory got allocated with the very same layout in `with_capacity`
                unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A temporary region of an arena. Restores the arena's position when dropped.
pub struct TemporaryMemory<'a, 'm> {
    arena: &'a mut Arena<'m>,
    pos: usize,
}

impl TemporaryMemory<'_, '_> {
    /// Position of the arena at the time the temporary region got opened.
    pub fn start_pos(&self) -> usize {
        self.pos
    }

    /// Explicitly close the region. Same as dropping it.
    pub fn end(self) {}
}

impl<'m> Deref for TemporaryMemory<'_, 'm> {
    type Target = Arena<'m>;

    fn deref(&self) -> &Self::Target {
        self.arena
    }
}

impl DerefMut for TemporaryMemory<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.arena
    }
}

impl Drop for TemporaryMemory<'_, '_> {
    fn drop(&mut self) {
        debug_assert!(
            self.arena.pos() >= self.pos,
            "Temporary memory got popped below its start position"
        );
        self.arena.used.set(self.pos);
    }
}

// -------------------------------------------------------------------------------------------------

/// A nested arena, carved out of a parent arena. Releases its memory in the parent on drop.
pub struct SubArena<'p, 'm> {
    parent: &'p mut Arena<'m>,
    arena: Arena<'p>,
    size: usize,
}

impl SubArena<'_, '_> {
    /// Explicitly release the sub arena. Same as dropping it.
    pub fn end(self) {}
}

impl<'p> Deref for SubArena<'p, '_> {
    type Target = Arena<'p>;

    fn deref(&self) -> &Self::Target {
        &self.arena
    }
}

impl DerefMut for SubArena<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.arena
    }
}

impl Drop for SubArena<'_, '_> {
    fn drop(&mut self) {
        self.parent.pop_size(self.size);
    }
}

// -------------------------------------------------------------------------------------------------

/// A small, fixed set of scratch arenas.
///
/// Nested helper calls each can borrow a scratch arena, excluding the ones their caller
/// already uses, without colliding with the caller's temporary regions.
#[derive(Debug)]
pub struct ArenaPool {
    arenas: [RefCell<Arena<'static>>; ARENA_SCRATCH_POOL_COUNT],
}

impl ArenaPool {
    /// Create a new pool with arenas of the given capacity each.
    pub fn new(arena_capacity: usize) -> Self {
        let arenas = std::array::from_fn(|_| RefCell::new(Arena::with_capacity(arena_capacity)));
        Self { arenas }
    }

    /// Capacity of a single scratch arena.
    pub fn arena_capacity(&self) -> usize {
        self.arenas[0].borrow().capacity()
    }

    /// Borrow a temporary region of the first scratch arena which is neither listed in
    /// `conflicts` nor already in use.
    ///
    /// Panics when all arenas are in use or excluded.
    pub fn scratch(&self, conflicts: &[ArenaId]) -> ScratchArena<'_> {
        for cell in &self.arenas {
            if let Ok(arena) = cell.try_borrow_mut() {
                if conflicts.contains(&arena.id()) {
                    continue;
                }
                let pos = arena.pos();
                return ScratchArena { arena, pos };
            }
        }
        panic!(
            "Scratch arena pool exhausted: all {} arenas are in use",
            ARENA_SCRATCH_POOL_COUNT
        );
    }
}

// -------------------------------------------------------------------------------------------------

/// A temporary region of a scratch arena, borrowed from an [`ArenaPool`].
pub struct ScratchArena<'p> {
    arena: RefMut<'p, Arena<'static>>,
    pos: usize,
}

impl Deref for ScratchArena<'_> {
    type Target = Arena<'static>;

    fn deref(&self) -> &Self::Target {
        &self.arena
    }
}

impl DerefMut for ScratchArena<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.arena
    }
}

impl Drop for ScratchArena<'_> {
    fn drop(&mut self) {
        let pos = self.pos;
        self.arena.pop_to(pos);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn overflow_panics() {
        let arena = Arena::with_capacity(64);
        arena.push_size(32, ArenaPushFlags::default());
        arena.push_size(33, ArenaPushFlags::default());
    }

    #[test]
    fn push_pop() {
        let mut memory = vec![0u8; 256];
        let mut arena = Arena::begin(&mut memory);
        assert_eq!(arena.capacity(), 256);

        arena.push_size(10, ArenaPushFlags::default());
        let pos = arena.pos();
        arena.push_size(32, ArenaPushFlags::default());
        assert_eq!(arena.pos(), pos + 32);
        arena.pop_size(32);
        assert_eq!(arena.pos(), pos);

        arena.pop_to(0);
        assert_eq!(arena.pos(), 0);
        assert_eq!(arena.remaining(), 256);
    }

    #[test]
    fn multiple_live_pushes() {
        let arena = Arena::with_capacity(1024);
        let a = arena.push_array::<f32>(4, ArenaPushFlags::ZERO);
        let b = arena.push_array::<f32>(4, ArenaPushFlags::ZERO);
        a.fill(1.0);
        b.fill(2.0);
        assert_eq!(a, &[1.0; 4]);
        assert_eq!(b, &[2.0; 4]);
    }

    #[test]
    fn alignment() {
        let arena = Arena::with_capacity(1024);
        arena.push_size(1, ArenaPushFlags::default());
        let aligned = arena.push_size(4, ArenaPushFlags::no_zero_align(16));
        assert_eq!(aligned.as_ptr() as usize % 16, 0);

        arena.push_size(3, ArenaPushFlags::default());
        let floats = arena.push_array::<f32>(8, ArenaPushFlags::default());
        assert_eq!(floats.as_ptr() as usize % mem::align_of::<f32>(), 0);

        let wide = arena.push_array::<f32>(8, ArenaPushFlags::zero_align(32));
        assert_eq!(wide.as_ptr() as usize % 32, 0);
        assert!(wide.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn zeroing() {
        let mut arena = Arena::with_capacity(64);
        arena.push_size(16, ArenaPushFlags::default()).fill(0xff);
        arena.pop_size(16);

        // no zero: previous content is still there
        assert!(arena
            .push_size(16, ArenaPushFlags::default())
            .iter()
            .all(|b| *b == 0xff));
        arena.pop_size(16);

        assert!(arena
            .push_size(16, ArenaPushFlags::ZERO)
            .iter()
            .all(|b| *b == 0));
    }

    #[test]
    #[should_panic(expected = "Arena overflow")]
    fn overflow() {
        let arena = Arena::with_capacity(64);
        arena.push_size(60, ArenaPushFlags::default());
        arena.push_size(8, ArenaPushFlags::default());
    }

    #[test]
    fn temporary_memory() {
        let mut arena = Arena::with_capacity(1024);
        arena.push_size(100, ArenaPushFlags::default());
        let before = arena.pos();
        {
            let mut temp = arena.begin_temporary_memory();
            temp.push_array::<f32>(16, ArenaPushFlags::ZERO);
            {
                let nested = temp.begin_temporary_memory();
                nested.push_size(200, ArenaPushFlags::default());
                assert!(nested.pos() > nested.start_pos());
            }
            assert_eq!(temp.pos(), before + 64);
            temp.end();
        }
        assert_eq!(arena.pos(), before);
    }

    #[test]
    fn sub_arena() {
        let mut arena = Arena::with_capacity(1024);
        arena.push_size(7, ArenaPushFlags::default());
        let before = arena.pos();
        {
            let sub = arena.sub_arena(256);
            assert_eq!(sub.capacity(), 256);
            assert_eq!(sub.pos(), 0);
            let values = sub.push_array::<u32>(16, ArenaPushFlags::ZERO);
            values[15] = 42;
            assert_eq!(values[15], 42);
        }
        assert_eq!(arena.pos(), before);
    }

    #[test]
    #[should_panic(expected = "Arena overflow")]
    fn sub_arena_overflow() {
        let mut arena = Arena::with_capacity(1024);
        let sub = arena.sub_arena(16);
        sub.push_size(17, ArenaPushFlags::default());
    }

    #[test]
    fn push_values() {
        let arena = Arena::with_capacity(1024);
        let value = arena.push_value((1u16, 2.0f32));
        assert_eq!(*value, (1, 2.0));
        let indices = arena.push_array_with(5, |index| index * 2);
        assert_eq!(indices, &[0, 2, 4, 6, 8]);
    }

    #[test]
    fn scratch_pool() {
        let pool = ArenaPool::new(1024);
        assert_eq!(pool.arena_capacity(), 1024);

        let first = pool.scratch(&[]);
        let first_id = first.id();
        first.push_size(100, ArenaPushFlags::default());
        {
            // first one is borrowed: we get the other one
            let second = pool.scratch(&[]);
            assert_ne!(second.id(), first_id);
            assert_eq!(second.pos(), 0);
        }
        drop(first);

        // scratch regions restore their position
        let again = pool.scratch(&[]);
        assert_eq!(again.id(), first_id);
        assert_eq!(again.pos(), 0);

        // explicitly excluded arenas are skipped
        let other = pool.scratch(&[first_id]);
        assert_ne!(other.id(), first_id);
    }

    #[test]
    #[should_panic(expected = "Scratch arena pool exhausted")]
    fn scratch_pool_exhausted() {
        let pool = ArenaPool::new(64);
        let first = pool.scratch(&[]);
        let _second = pool.scratch(&[first.id()]);
        let _third = pool.scratch(&[]);
    }
}
