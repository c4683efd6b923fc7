//! Lead intake — web form submission, recaptcha, session seeding.

pub mod recaptcha;
pub mod routes;

pub use recaptcha::RecaptchaVerifier;
pub use routes::{IntakeState, intake_routes};
