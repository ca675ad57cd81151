//! Per-interface transmit token bucket.
//!
//! A bucket of size 0 disables rate limiting. Otherwise `count` tokens are
//! added every `rate` ticks, never exceeding `size`.

use crate::core::TOKEN_PRIORITY_FLOOR;

/// Token bucket state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenBucket {
    tokens: i16,
    size: u8,
    rate: u8,
    count: u8,
    ticks: u16,
}

impl TokenBucket {
    /// Configure the bucket and fill it.
    pub fn set(&mut self, size: u8, rate: u8, count: u8) {
        self.size = size;
        self.rate = rate;
        self.count = count;
        self.tokens = i16::from(size);
        self.ticks = 0;
    }

    /// Check if rate limiting is active.
    pub fn is_limited(&self) -> bool {
        self.size != 0
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> i16 {
        self.tokens
    }

    /// Configured size.
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Check if the bucket still needs ticks to fill up.
    pub fn needs_refill(&self) -> bool {
        self.is_limited() && self.tokens < i16::from(self.size)
    }

    /// Account `elapsed` ticks. Returns whether further ticks are needed.
    pub fn refill(&mut self, elapsed: u16) -> bool {
        if !self.is_limited() {
            return false;
        }
        let size = i16::from(self.size);
        if self.tokens >= size {
            self.ticks = 0;
            return false;
        }
        if self.rate == 0 {
            self.tokens = size;
            self.ticks = 0;
            return false;
        }

        self.ticks = self.ticks.saturating_add(elapsed);
        let rate = u16::from(self.rate);
        while self.ticks >= rate && self.tokens < size {
            self.ticks -= rate;
            self.tokens = (self.tokens + i16::from(self.count)).min(size);
        }
        if self.tokens >= size {
            self.ticks = 0;
        }
        self.needs_refill()
    }

    /// Take a token for one transmission.
    ///
    /// Priority traffic always passes but only takes a token while one is
    /// left above the floor. Normal traffic needs a token.
    pub fn consume(&mut self, priority: bool) -> bool {
        if !self.is_limited() {
            return true;
        }
        if priority {
            if self.tokens > TOKEN_PRIORITY_FLOOR {
                self.tokens -= 1;
            }
            return true;
        }
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_by_default() {
        let mut bucket = TokenBucket::default();
        for _ in 0..100 {
            assert!(bucket.consume(false));
        }
        assert!(!bucket.refill(1));
        assert!(!bucket.needs_refill());
    }

    #[test]
    fn test_consume_until_empty() {
        let mut bucket = TokenBucket::default();
        bucket.set(2, 5, 1);
        assert!(bucket.consume(false));
        assert!(bucket.consume(false));
        assert!(!bucket.consume(false));
        assert_eq!(bucket.tokens(), 0);
    }

    #[test]
    fn test_priority_bypass_never_goes_negative() {
        let mut bucket = TokenBucket::default();
        bucket.set(1, 5, 1);
        assert!(bucket.consume(true));
        assert!(bucket.consume(true));
        assert_eq!(bucket.tokens(), 0);
        assert!(!bucket.consume(false));
    }

    #[test]
    fn test_refill_rate() {
        let mut bucket = TokenBucket::default();
        bucket.set(3, 5, 1);
        for _ in 0..3 {
            bucket.consume(false);
        }

        assert!(bucket.refill(4));
        assert_eq!(bucket.tokens(), 0);
        assert!(bucket.refill(1));
        assert_eq!(bucket.tokens(), 1);
        assert!(!bucket.refill(100));
        assert_eq!(bucket.tokens(), 3);
    }

    #[test]
    fn test_refill_saturates() {
        let mut bucket = TokenBucket::default();
        bucket.set(4, 1, 3);
        bucket.consume(false);
        assert!(!bucket.refill(1));
        assert_eq!(bucket.tokens(), 4);
    }

    #[test]
    fn test_tokens_stay_in_bounds() {
        let mut bucket = TokenBucket::default();
        bucket.set(5, 2, 2);
        for step in 0u16..200 {
            match step % 3 {
                0 => {
                    bucket.consume(step % 2 == 0);
                }
                1 => {
                    bucket.refill(step % 4);
                }
                _ => {
                    bucket.consume(false);
                }
            }
            assert!((0..=5).contains(&bucket.tokens()));
        }
    }
}
