// Core types shared by the model, sync and service layers

pub mod strong_types;

pub use strong_types::{DocumentId, UserId};
