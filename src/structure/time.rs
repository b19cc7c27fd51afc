use std::sync::Arc;

/// Clock capability injected into streams and reconcilers.
///
/// Timestamps on the wire are microseconds since the Unix epoch. All
/// participants of a connection share one physical host, so the host clock
/// serves as the shared epoch.
pub trait ClockSource {
  fn now_microseconds(&self) -> u64;
}

/// Default wall-clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
  fn now_microseconds(&self) -> u64 {
    current_clock_time_microseconds()
  }
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
  fn now_microseconds(&self) -> u64 {
    (**self).now_microseconds()
  }
}

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Convenience for binding code that stamps creation times without holding
/// a [`ClockSource`].
pub fn current_clock_time_microseconds() -> u64 {
  chrono::Utc::now().timestamp_micros().max(0) as u64
}
