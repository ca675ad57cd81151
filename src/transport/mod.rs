//! MLE service - Tokio transport
//!
//! Production collaborators for the service core:
//!
//! - [`UdpTransport`]: non-blocking tokio UDP socket on the MLE port
//! - [`TickScheduler`]: records whether the service wants timer ticks
//! - [`run_driver`]: select loop delivering ticks and inbound datagrams
//!
//! ```text
//! ┌────────────────────────────┐
//! │        MleService          │
//! ├──────────────┬─────────────┤
//! │ timer_tick() │  receive()  │
//! ├──────────────┴─────────────┤
//! │        run_driver          │  ← This module
//! ├──────────────┬─────────────┤
//! │   Interval   │  UdpSocket  │
//! └──────────────┴─────────────┘
//! ```

mod driver;
mod udp;

pub use driver::run_driver;
pub use udp::{DEFAULT_RECV_BUFFER_SIZE, TickScheduler, TickState, UdpTransport};
