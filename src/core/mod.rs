//! MLE service - Core traits, types, and constants.
//!
//! This module provides the foundational types shared by every layer:
//! protocol constants, error types, datagram types and the collaborator
//! traits through which the service reaches timers, sockets and randomness.

mod constants;
mod error;
mod packet;
mod traits;

pub use constants::*;
pub use error::*;
pub use packet::*;
pub use traits::*;
