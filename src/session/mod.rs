//! In-memory conversation sessions with time-based expiry.

pub mod model;
pub mod store;

pub use model::Session;
pub use store::SessionStore;
