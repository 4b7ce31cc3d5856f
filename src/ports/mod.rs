//! Interfaces the account state machine depends on.
//!
//! Adapters live next to their concern: Postgres and in-memory stores under
//! [`crate::user`], Argon2 and token generation in [`crate::crypto`], JWT in
//! [`crate::token`] and RabbitMQ in [`crate::mail`].

mod crypto;
mod mailer;
mod store;
mod token;

pub use crypto::*;
pub use mailer::*;
pub use store::*;
pub use token::*;
