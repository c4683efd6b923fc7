//! LeadFlow — WhatsApp decision-tree backend for financial advisors.

pub mod config;
pub mod error;
pub mod intake;
pub mod outbound;
pub mod session;
pub mod store;
pub mod users;
pub mod webhook;
