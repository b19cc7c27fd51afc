// Per-process reconciliation: collections of typed objects mirrored between
// the local view and a pair of transport streams. One reconciler owns one
// inbound and one outbound stream and drives both from a single-threaded
// tick loop.

mod collection;
mod datastore;
mod index;
mod object;

pub use collection::{CollectionInterface, CreateDelegate, ObjectCollection};
pub use datastore::DataStoreReconciler;
pub use index::{CollectionIndexBinding, ObjectCollectionIndex};
pub use object::{CollectionHandle, MessageWriter, ReconciledObject};
