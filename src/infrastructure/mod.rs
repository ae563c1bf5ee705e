// Store infrastructure - the document store seam and its in-memory implementation

pub mod memory_store;          // Live-query document store held in memory
pub mod traits;                // Store seam and live-query subscriptions

pub use memory_store::InMemoryDocumentStore;
pub use traits::{DocumentStore, ListenerRegistration, Subscription};
