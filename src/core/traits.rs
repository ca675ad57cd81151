//! Collaborator traits for the MLE service.
//!
//! The service core never talks to the operating system directly. Timers,
//! sockets and randomness are reached through these traits so the engine can
//! be driven by tokio in production and by hand in tests.

use std::io;
use std::time::Duration;

use rand::RngCore;

use super::constants::{JITTER_FACTOR_HIGH, JITTER_FACTOR_LOW};
use super::packet::Datagram;

/// Handle of a periodic timer issued by a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u32);

/// Event/timer service delivering the periodic tick.
pub trait Scheduler {
    /// Request a recurring timer with the given period.
    fn request_periodic(&mut self, period: Duration) -> TimerHandle;

    /// Cancel a timer previously returned by [`request_periodic`](Self::request_periodic).
    fn cancel(&mut self, handle: TimerHandle);
}

/// UDP/IPv6 datagram service.
///
/// The service opens the transport when the first interface registers and
/// closes it when the last one leaves.
pub trait Transport {
    /// Bind the MLE socket on the given port.
    fn open(&mut self, port: u16) -> io::Result<()>;

    /// Send one datagram without blocking.
    fn send(&mut self, datagram: &Datagram) -> io::Result<()>;

    /// Release the socket.
    fn close(&mut self);
}

/// Source of randomness for message ids, challenges and timer jitter.
///
/// Implemented for every [`RngCore`], so `OsRng` and seeded `StdRng` can be
/// used directly.
pub trait RandomSource {
    /// Uniformly distributed 16-bit value.
    fn random_u16(&mut self) -> u16;

    /// Fill `buf` with random bytes.
    fn random_bytes(&mut self, buf: &mut [u8]);

    /// Uniformly distributed value in `low..=high`.
    fn random_in_range(&mut self, low: u16, high: u16) -> u16 {
        if high <= low {
            return low;
        }
        let span = u32::from(high - low) + 1;
        low + (u32::from(self.random_u16()) % span) as u16
    }

    /// Scale `base` by a random Q15 factor in `low..=high`, rounding to nearest.
    fn randomise_base(&mut self, base: u32, low: u16, high: u16) -> u32 {
        let factor = u64::from(self.random_in_range(low, high));
        ((u64::from(base) * factor + 0x7FFF) >> 15) as u32
    }

    /// `base` scaled into [0.9, 1.1).
    fn jitter(&mut self, base: u16) -> u32 {
        self.randomise_base(u32::from(base), JITTER_FACTOR_LOW, JITTER_FACTOR_HIGH)
    }
}

impl<R: RngCore + ?Sized> RandomSource for R {
    fn random_u16(&mut self) -> u16 {
        (self.next_u32() >> 16) as u16
    }

    fn random_bytes(&mut self, buf: &mut [u8]) {
        self.fill_bytes(buf);
    }
}

/// Per-message retransmission callback.
pub trait TimeoutHandler {
    /// Called once per expired timer, before the retry counter moves.
    ///
    /// `final_attempt` is set on the call after which the buffer is freed no
    /// matter what is returned. Returning `false` frees the buffer early.
    fn on_timeout(&mut self, interface_id: i8, msg_id: u16, final_attempt: bool) -> bool;
}

impl<F> TimeoutHandler for F
where
    F: FnMut(i8, u16, bool) -> bool,
{
    fn on_timeout(&mut self, interface_id: i8, msg_id: u16, final_attempt: bool) -> bool {
        self(interface_id, msg_id, final_attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct ConstRng(u32);

    impl RngCore for ConstRng {
        fn next_u32(&mut self) -> u32 {
            self.0
        }
        fn next_u64(&mut self) -> u64 {
            u64::from(self.0)
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0 as u8);
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn test_random_in_range_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let v = rng.random_in_range(10, 20);
            assert!((10..=20).contains(&v));
        }
        assert_eq!(rng.random_in_range(5, 5), 5);
        assert_eq!(rng.random_in_range(9, 3), 9);
    }

    #[test]
    fn test_randomise_base_low_factor() {
        let mut rng = ConstRng(0);
        // 100 * 0x7333 / 0x8000 = 89.99.. rounds to 90
        assert_eq!(rng.randomise_base(100, JITTER_FACTOR_LOW, JITTER_FACTOR_HIGH), 90);
        assert_eq!(rng.jitter(5), 5);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let v = rng.jitter(1000);
            assert!((900..=1100).contains(&v), "jitter out of range: {v}");
        }
    }

    #[test]
    fn test_closure_timeout_handler() {
        let mut seen = Vec::new();
        let mut handler = |iface: i8, id: u16, last: bool| {
            seen.push((iface, id, last));
            !last
        };
        assert!(handler.on_timeout(1, 0x1234, false));
        assert!(!handler.on_timeout(1, 0x1234, true));
        assert_eq!(seen, vec![(1, 0x1234, false), (1, 0x1234, true)]);
    }
}
