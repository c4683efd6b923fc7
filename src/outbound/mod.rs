//! Outbound WhatsApp messaging — provider seam, rate limiting, fan-out.

pub mod dispatcher;
pub mod limiter;
pub mod provider;
pub mod routes;
pub mod twilio;

pub use dispatcher::OutboundDispatcher;
pub use limiter::SlidingWindowLimiter;
pub use provider::{MessagingProvider, Recipient, TemplateMessage};
pub use routes::{OutboundState, outbound_routes};
pub use twilio::TwilioWhatsApp;
