// Small identity and capability types shared by the transport and the
// reconciler layers.

mod object_id;
mod schema_hash;
mod time;

pub use object_id::ObjectUuid;
pub use schema_hash::SchemaHash;
pub use time::{current_clock_time_microseconds, ClockSource, SystemClock};
