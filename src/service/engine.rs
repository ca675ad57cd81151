//! Retransmission and timeout engine.
//!
//! One shared periodic timer drives every pending message and every token
//! bucket. Each tick:
//!
//! 1. token buckets are refilled,
//! 2. armed buffers count down; those reaching zero (or parked on tokens)
//!    are retried, given up on, or freed,
//! 3. the timer is cancelled once nothing needs it.
//!
//! Retransmission timeouts follow the RFC 3315 scheme
//! `RT = RTprev + RAND * RTprev` with `RAND` in [0.9, 1.1), clamped to the
//! message's `timeout_max`.

use tracing::{debug, trace, warn};

use crate::buffer::BufferKey;
use crate::core::{MleError, MleResult, RandomSource};
use crate::crypto::{KeyStore, NeighborTable};

use super::MleService;

/// Next retransmission timeout after `timeout_init`.
///
/// Never returns 0, so a retrying buffer never fires on every tick.
pub fn retransmission_timeout<R: RandomSource + ?Sized>(
    random: &mut R,
    timeout_init: u16,
    timeout_max: u16,
) -> u16 {
    let grown = u32::from(timeout_init) + random.jitter(timeout_init);
    let mut next = grown.min(u32::from(u16::MAX)) as u16;
    if timeout_max != 0 && next > timeout_max {
        next = random.jitter(timeout_max).min(u32::from(u16::MAX)) as u16;
    }
    next.max(1)
}

/// Result of one transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transmit {
    /// Handed to the transport; the buffer is still live.
    Sent {
        /// First transmission of this buffer.
        first: bool,
        /// The buffer was waiting out its response delay.
        delayed: bool,
    },
    /// Parked waiting for tokens.
    TokenDelayed,
    /// Could not be built for lack of memory; retried on the next tick.
    Deferred,
    /// Buffer is gone (one-shot sent, orphaned, dropped or unbuildable).
    Freed,
}

impl<K: KeyStore, N: NeighborTable> MleService<K, N> {
    /// Advance the engine by `ticks` timer periods.
    ///
    /// Returns whether the timer is still needed.
    pub fn timer_tick(&mut self, ticks: u16) -> bool {
        self.registry.tick(ticks);
        let due = self.buffers.expire(ticks);
        for key in due {
            self.process_timeout(key);
        }
        let active = self.update_timer();
        trace!(ticks, active, pending = self.buffers.len(), "timer tick");
        active
    }

    /// Hand a message to the engine.
    ///
    /// The first transmission happens right away unless a response delay is
    /// set. Messages without retries are freed once sent.
    pub fn msg_send(&mut self, msg_id: u16) -> MleResult<()> {
        let key = self
            .buffers
            .key(msg_id)
            .ok_or(MleError::MessageNotFound(msg_id))?;
        let buffer = self
            .buffers
            .get_mut(key)
            .ok_or(MleError::InvalidHandle(msg_id))?;
        if buffer.armed {
            return Err(MleError::InvalidParameter("message already sent"));
        }
        if buffer.destination.is_unspecified() {
            return Err(MleError::InvalidParameter("destination not set"));
        }
        buffer.armed = true;

        if buffer.delayed_response {
            debug!(msg_id, delay = buffer.timeout, "response delayed");
            self.ensure_timer();
            return Ok(());
        }

        if let Transmit::Sent { .. } = self.transmit(key) {
            if let Some(buffer) = self.buffers.get_mut(key) {
                buffer.timeout = buffer.timeout_init;
            }
            self.ensure_timer();
        }
        Ok(())
    }

    /// Handle one expired buffer.
    pub(crate) fn process_timeout(&mut self, key: BufferKey) {
        let Some(buffer) = self.buffers.get_mut(key) else {
            return;
        };

        if !buffer.delayed_response && !buffer.tokens_delay {
            let retrans = buffer.retrans.saturating_add(1);
            let final_attempt = buffer.retrans_max != 0 && retrans >= buffer.retrans_max;
            let proceed = match buffer.timeout_handler.as_mut() {
                Some(handler) => handler.on_timeout(buffer.interface_id, buffer.msg_id, final_attempt),
                None => true,
            };
            buffer.retrans = retrans;

            if buffer.retrans_max == 0 || final_attempt || !proceed {
                debug!(
                    msg_id = key.msg_id(),
                    retrans,
                    final_attempt,
                    proceed,
                    "retransmission finished"
                );
                self.release(key);
                return;
            }
            debug!(msg_id = key.msg_id(), retrans, "retransmitting");
        }

        if let Transmit::Sent { first, delayed } = self.transmit(key) {
            let Some(buffer) = self.buffers.get_mut(key) else {
                return;
            };
            if delayed || first {
                buffer.delayed_response = false;
                buffer.timeout = buffer.timeout_init;
            } else {
                let next =
                    retransmission_timeout(&mut *self.random, buffer.timeout_init, buffer.timeout_max);
                trace!(msg_id = key.msg_id(), timeout = next, "backoff");
                buffer.timeout_init = next;
                buffer.timeout = next;
            }
        }
    }

    /// One transmission attempt: orphan check, token check, build and send.
    pub(crate) fn transmit(&mut self, key: BufferKey) -> Transmit {
        let Some(buffer) = self.buffers.get(key) else {
            return Transmit::Freed;
        };
        let interface_id = buffer.interface_id;
        let priority = buffer.tokens_priority;
        let was_delayed = buffer.tokens_delay;

        if self.registry.find(interface_id).is_none()
            || self.keys.security_level(interface_id).is_none()
        {
            debug!(msg_id = key.msg_id(), interface_id, "orphaned message freed");
            self.release(key);
            return Transmit::Freed;
        }

        let (granted, refilling) = match self.registry.find_mut(interface_id) {
            Some(instance) => (
                instance.token_bucket.consume(priority),
                instance.token_bucket.needs_refill(),
            ),
            None => (false, false),
        };
        if refilling {
            self.ensure_timer();
        }

        if !granted {
            if was_delayed || self.buffers.token_delayed_count() < self.config.token_delay_max_buffers
            {
                let min_delay = self.config.token_delay_ticks;
                if let Some(buffer) = self.buffers.get_mut(key) {
                    buffer.tokens_delay = true;
                    buffer.timeout = buffer.timeout.max(min_delay);
                }
                if !was_delayed {
                    debug!(msg_id = key.msg_id(), interface_id, "waiting for tokens");
                }
                self.ensure_timer();
                return Transmit::TokenDelayed;
            }
            warn!(msg_id = key.msg_id(), interface_id, "token delay queue full, message dropped");
            self.release(key);
            return Transmit::Freed;
        }

        let (first, delayed) = match self.buffers.get_mut(key) {
            Some(buffer) => {
                buffer.tokens_delay = false;
                (!buffer.message_sent, buffer.delayed_response)
            }
            None => return Transmit::Freed,
        };

        match self.build_datagram(key) {
            Ok(datagram) => {
                if let Err(err) = self.transport.send(&datagram) {
                    warn!(msg_id = key.msg_id(), interface_id, error = %err, "send failed");
                } else {
                    trace!(
                        msg_id = key.msg_id(),
                        interface_id,
                        len = datagram.payload.len(),
                        "message sent"
                    );
                }
                if let Some(buffer) = self.buffers.get_mut(key) {
                    buffer.message_sent = true;
                }
            }
            Err(MleError::OutOfMemory) => {
                warn!(msg_id = key.msg_id(), "no memory to build message, retrying");
                if let Some(buffer) = self.buffers.get_mut(key) {
                    buffer.delayed_response = true;
                    buffer.timeout = 1;
                    buffer.retrans_max = buffer.retrans_max.saturating_add(1);
                }
                self.ensure_timer();
                return Transmit::Deferred;
            }
            Err(err) => {
                warn!(msg_id = key.msg_id(), interface_id, error = %err, "message build failed");
                self.release(key);
                return Transmit::Freed;
            }
        }

        let one_shot = self
            .buffers
            .get(key)
            .is_none_or(|buffer| buffer.retrans_max == 0);
        if one_shot {
            self.release(key);
            return Transmit::Freed;
        }
        Transmit::Sent { first, delayed }
    }

    fn release(&mut self, key: BufferKey) {
        if let Err(err) = self.buffers.free(key) {
            debug!(error = %err, "buffer already released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JITTER_FACTOR_LOW, RandomSource};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Lowest;

    impl RandomSource for Lowest {
        fn random_u16(&mut self) -> u16 {
            0
        }
        fn random_bytes(&mut self, buf: &mut [u8]) {
            buf.fill(0);
        }
    }

    #[test]
    fn test_backoff_with_low_factor() {
        assert_eq!(retransmission_timeout(&mut Lowest, 5, 0), 10);
        assert_eq!(retransmission_timeout(&mut Lowest, 10, 0), 19);
        // 19 + 18 exceeds the cap, resampled around the cap
        assert_eq!(
            retransmission_timeout(&mut Lowest, 19, 30),
            ((30 * u32::from(JITTER_FACTOR_LOW) + 0x7FFF) >> 15) as u16
        );
    }

    #[test]
    fn test_backoff_overflow_clamps() {
        assert_eq!(retransmission_timeout(&mut Lowest, 0xF000, 0), u16::MAX);
    }

    #[test]
    fn test_backoff_never_zero() {
        assert_eq!(retransmission_timeout(&mut Lowest, 0, 0), 1);
    }

    #[test]
    fn test_backoff_growth_then_cap() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut timeout = 10u16;
        for _ in 0..20 {
            let next = retransmission_timeout(&mut rng, timeout, 200);
            assert!(next <= 220, "above cap window: {next}");
            assert!(
                next >= timeout || (180..=220).contains(&next),
                "shrank outside cap window: {timeout} -> {next}"
            );
            timeout = next;
        }
        assert!((180..=220).contains(&timeout));
    }
}
