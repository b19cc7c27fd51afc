/// Raw memory capability backing a transport stream.
///
/// The core never acquires memory itself; the host injects a backing store
/// (heap for in-process pipelines and tests, named shared memory for
/// cross-process connections). The store only hands out the region; header
/// initialization and validation stay in the stream.
pub trait BackingStore {
  fn ptr(&self) -> *mut u8;

  fn len(&self) -> usize;

  /// True when this attachment brought the region into existence, i.e. the
  /// header still needs to be initialized by this participant.
  fn freshly_created(&self) -> bool;

  /// Called once when the owning stream detaches. `last_attachment` is true
  /// when the detaching stream observed itself to be the final participant;
  /// named stores use it to remove the region.
  fn on_detach(&mut self, last_attachment: bool) {
    let _ = last_attachment;
  }
}
