use std::{cell::UnsafeCell, rc::Rc};

use super::BackingStore;

/// Cloneable handle to a process-heap transport region.
///
/// Heap regions back in-process connections (two reconcilers in one
/// process, or tests): the creator allocates, peers attach through a clone
/// of the handle. The region lives until the last handle drops.
///
/// Backed by `u64` words so the header's atomic cursor fields are properly
/// aligned, exactly like a page-aligned mapping would be.
#[derive(Clone)]
pub struct HeapRegion {
  mem: Rc<UnsafeCell<Box<[u64]>>>,
  byte_count: usize,
}

impl HeapRegion {
  /// Allocates a zeroed region of `byte_count` bytes.
  pub fn with_byte_count(byte_count: usize) -> Self {
    let words = byte_count.div_ceil(8);
    Self {
      mem: Rc::new(UnsafeCell::new(vec![0u64; words].into_boxed_slice())),
      byte_count,
    }
  }

  pub fn len(&self) -> usize {
    self.byte_count
  }

  pub fn is_empty(&self) -> bool {
    self.byte_count == 0
  }

  fn ptr(&self) -> *mut u8 {
    unsafe { (*self.mem.get()).as_mut_ptr() as *mut u8 }
  }
}

/// Heap-backed [`BackingStore`].
pub struct HeapBackingStore {
  region: HeapRegion,
  created: bool,
}

impl HeapBackingStore {
  /// Allocates a fresh region; the attaching stream initializes the header.
  pub fn create(byte_count: usize) -> Self {
    Self {
      region: HeapRegion::with_byte_count(byte_count),
      created: true,
    }
  }

  /// Attaches to a region allocated elsewhere. The region counts as fresh
  /// while its magic bytes are still zero, so the first attacher
  /// initializes it regardless of who allocated.
  pub fn attach(region: HeapRegion) -> Self {
    let created = {
      let ptr = region.ptr();
      let len = region.len();
      len >= 8
        && unsafe { std::slice::from_raw_parts(ptr, 8) }
          .iter()
          .all(|b| *b == 0)
    };
    Self { region, created }
  }

  pub fn region(&self) -> HeapRegion {
    self.region.clone()
  }
}

impl BackingStore for HeapBackingStore {
  fn ptr(&self) -> *mut u8 {
    self.region.ptr()
  }

  fn len(&self) -> usize {
    self.region.len()
  }

  fn freshly_created(&self) -> bool {
    self.created
  }
}
