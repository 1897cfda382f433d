pub mod logging;
pub mod poll;

pub use poll::{poll_until, PollError};
