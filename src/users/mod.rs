//! Advisor-facing lead views.

pub mod routes;

pub use routes::{UsersState, users_routes};
