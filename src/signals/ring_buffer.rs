use super::sample::SignalSample;

/// Producer-owned bounded sample buffer, for sources that generate samples
/// at a rate decoupled from the outbound tick (audio callbacks, capture
/// threads funneled through a channel, synthesis loops).
///
/// Samples are stored frame-interleaved. The warmup threshold holds reads
/// back until enough frames have accumulated once, absorbing producer
/// jitter at stream start; draining the buffer empty re-arms it.
pub struct SignalRingBuffer<T: SignalSample> {
  data: Vec<T>,
  num_channels: usize,
  frame_capacity: usize,
  read_frame: usize,
  write_frame: usize,
  filled_frames: usize,
  warmup_frames: usize,
  warmed: bool,
}

impl<T: SignalSample> SignalRingBuffer<T> {
  pub fn new(frame_capacity: usize, warmup_frames: usize, num_channels: usize) -> Self {
    assert!(frame_capacity > 0 && num_channels > 0);
    Self {
      data: vec![T::default(); frame_capacity * num_channels],
      num_channels,
      frame_capacity,
      read_frame: 0,
      write_frame: 0,
      filled_frames: 0,
      warmup_frames: warmup_frames.min(frame_capacity),
      warmed: false,
    }
  }

  pub fn num_channels(&self) -> usize {
    self.num_channels
  }

  pub fn frame_capacity(&self) -> usize {
    self.frame_capacity
  }

  /// Frames a reader may drain right now (zero while warming up).
  pub fn available_frames(&self) -> usize {
    if self.warmed || self.filled_frames >= self.warmup_frames {
      self.filled_frames
    } else {
      0
    }
  }

  pub fn free_frames(&self) -> usize {
    self.frame_capacity - self.filled_frames
  }

  /// Appends interleaved frames; returns how many frames were accepted.
  /// Never clobbers unread data: excess frames are dropped.
  pub fn write_interleaved(&mut self, samples: &[T]) -> usize {
    let frames = samples.len() / self.num_channels;
    let accept = frames.min(self.free_frames());
    for frame in 0..accept {
      let src = frame * self.num_channels;
      let dst = self.write_frame * self.num_channels;
      self.data[dst..dst + self.num_channels]
        .copy_from_slice(&samples[src..src + self.num_channels]);
      self.write_frame = (self.write_frame + 1) % self.frame_capacity;
    }
    self.filled_frames += accept;
    accept
  }

  /// Drains up to `out.len() / num_channels` interleaved frames; returns
  /// how many frames were read.
  pub fn read_interleaved(&mut self, out: &mut [T]) -> usize {
    let want = out.len() / self.num_channels;
    let take = want.min(self.available_frames());
    if take == 0 {
      return 0;
    }
    self.warmed = true;
    for frame in 0..take {
      let src = self.read_frame * self.num_channels;
      let dst = frame * self.num_channels;
      out[dst..dst + self.num_channels].copy_from_slice(&self.data[src..src + self.num_channels]);
      self.read_frame = (self.read_frame + 1) % self.frame_capacity;
    }
    self.filled_frames -= take;
    if self.filled_frames == 0 {
      // ran dry: buffer up again before the next read
      self.warmed = false;
    }
    take
  }
}
