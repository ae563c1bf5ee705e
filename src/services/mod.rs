// Application services over the document store

pub mod deep_link;
pub mod event_service;
pub mod profile_service;

pub use deep_link::DeepLinkManager;
pub use event_service::EventService;
pub use profile_service::ProfileService;
