//! Decision channel
//!
//! A [`Forward`] is a named notification point with one payload type.
//! Subscribers answer each broadcast with an [`Outcome`]; the caller acts
//! on the highest one.

mod channel;
mod errors;
mod manager;
mod outcome;

pub use channel::{Forward, SubscriberId};
pub use errors::ForwardError;
pub use manager::ForwardManager;
pub use outcome::Outcome;

pub type ForwardResult<T> = std::result::Result<T, ForwardError>;
