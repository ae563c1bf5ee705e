// Typed records and the untyped documents they are stored as

pub mod document;
pub mod event;
pub mod profile;

pub use document::{ChangeBatch, ChangeKind, Document, DocumentChange, QueryFilter};
pub use event::{Coordinates, Event, EventUpdate, NewEvent};
pub use profile::{ProfileDraft, UserProfile};
