// Live synchronization of remote events into observable local state

pub mod event_cache;
pub mod event_index;
pub mod event_watcher;

pub use event_cache::{EventList, EventSyncCache, QuerySource};
pub use event_index::{BatchOutcome, EventIndex};
pub use event_watcher::EventWatcher;
