// Potluck event sync - live event lists merged from the hosted document store

// Identity types
pub mod core;

// Typed records and untyped documents
pub mod models;

// Document store seam and in-memory store
pub mod infrastructure;

// Live queries merged into observable state
pub mod sync;

// Event, profile and deep-link operations
pub mod services;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult, DecodeError};
pub use sync::{EventSyncCache, EventWatcher};
