//! Frame counter anti-replay.
//!
//! Each neighbor carries the last accepted MLE frame counter and key
//! sequence. A secured message is only accepted if it moves that pair
//! forward, except right after a key switch where the neighbor is
//! resynchronised.

use std::collections::HashMap;
use std::net::Ipv6Addr;

use crate::core::CryptoError;

/// Anti-replay state kept for one neighbor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighborSecurity {
    /// Last accepted MLE frame counter.
    pub mle_frame_counter: u32,
    /// Key sequence of the last accepted message.
    pub last_key_sequence: u32,
    /// Set when the neighbor is expected to move to a new key.
    pub new_key_pending: bool,
}

/// Neighbor lookup used by the receive path.
pub trait NeighborTable {
    /// Security state of the neighbor owning `link_local` on `interface_id`.
    fn neighbor_security(
        &mut self,
        interface_id: i8,
        link_local: &Ipv6Addr,
    ) -> Option<&mut NeighborSecurity>;
}

/// Neighbor table that knows nobody. Anti-replay is skipped for every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNeighbors;

impl NeighborTable for NoNeighbors {
    fn neighbor_security(&mut self, _: i8, _: &Ipv6Addr) -> Option<&mut NeighborSecurity> {
        None
    }
}

/// In-memory neighbor table keyed by interface and link-local address.
#[derive(Debug, Default)]
pub struct NeighborMap {
    entries: HashMap<(i8, Ipv6Addr), NeighborSecurity>,
}

impl NeighborMap {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a neighbor.
    pub fn insert(&mut self, interface_id: i8, link_local: Ipv6Addr, state: NeighborSecurity) {
        self.entries.insert((interface_id, link_local), state);
    }

    /// Remove a neighbor.
    pub fn remove(&mut self, interface_id: i8, link_local: &Ipv6Addr) -> Option<NeighborSecurity> {
        self.entries.remove(&(interface_id, *link_local))
    }

    /// Read a neighbor's state.
    pub fn get(&self, interface_id: i8, link_local: &Ipv6Addr) -> Option<&NeighborSecurity> {
        self.entries.get(&(interface_id, *link_local))
    }

    /// Number of known neighbors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NeighborTable for NeighborMap {
    fn neighbor_security(
        &mut self,
        interface_id: i8,
        link_local: &Ipv6Addr,
    ) -> Option<&mut NeighborSecurity> {
        self.entries.get_mut(&(interface_id, *link_local))
    }
}

/// Outcome of an accepted frame counter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayVerdict {
    /// Counter moved forward, state updated.
    Fresh,
    /// Neighbor was waiting for a key switch and has been resynchronised.
    Resynchronised,
    /// Stale counter let through by the override; state left untouched.
    Overridden,
}

/// Check an inbound `(frame_counter, key_sequence)` against a neighbor.
///
/// On acceptance the neighbor is updated in place, except for
/// [`ReplayVerdict::Overridden`].
pub fn check_frame_counter(
    neighbor: &mut NeighborSecurity,
    frame_counter: u32,
    key_sequence: u32,
    accept_invalid: bool,
) -> Result<ReplayVerdict, CryptoError> {
    if neighbor.new_key_pending
        && (frame_counter < neighbor.mle_frame_counter
            || key_sequence != neighbor.last_key_sequence)
    {
        neighbor.new_key_pending = false;
        neighbor.mle_frame_counter = frame_counter;
        neighbor.last_key_sequence = key_sequence;
        return Ok(ReplayVerdict::Resynchronised);
    }

    if key_sequence < neighbor.last_key_sequence {
        return Err(CryptoError::KeySequenceDowngrade);
    }

    if key_sequence == neighbor.last_key_sequence && frame_counter <= neighbor.mle_frame_counter {
        if accept_invalid {
            return Ok(ReplayVerdict::Overridden);
        }
        return Err(CryptoError::ReplayDetected);
    }

    neighbor.mle_frame_counter = frame_counter;
    neighbor.last_key_sequence = key_sequence;
    Ok(ReplayVerdict::Fresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(counter: u32, seq: u32) -> NeighborSecurity {
        NeighborSecurity {
            mle_frame_counter: counter,
            last_key_sequence: seq,
            new_key_pending: false,
        }
    }

    #[test]
    fn test_next_counter_accepted() {
        let mut n = neighbor(100, 3);
        assert_eq!(check_frame_counter(&mut n, 101, 3, false), Ok(ReplayVerdict::Fresh));
        assert_eq!(n, neighbor(101, 3));
    }

    #[test]
    fn test_replay_rejected() {
        let mut n = neighbor(100, 3);
        assert_eq!(
            check_frame_counter(&mut n, 100, 3, false),
            Err(CryptoError::ReplayDetected)
        );
        assert_eq!(
            check_frame_counter(&mut n, 42, 3, false),
            Err(CryptoError::ReplayDetected)
        );
        assert_eq!(n, neighbor(100, 3));
    }

    #[test]
    fn test_override_accepts_without_update() {
        let mut n = neighbor(100, 3);
        assert_eq!(
            check_frame_counter(&mut n, 50, 3, true),
            Ok(ReplayVerdict::Overridden)
        );
        assert_eq!(n, neighbor(100, 3));
    }

    #[test]
    fn test_key_sequence_downgrade() {
        let mut n = neighbor(10, 5);
        assert_eq!(
            check_frame_counter(&mut n, 1000, 4, true),
            Err(CryptoError::KeySequenceDowngrade)
        );
    }

    #[test]
    fn test_new_key_sequence_resets_counter_window() {
        let mut n = neighbor(1000, 5);
        assert_eq!(check_frame_counter(&mut n, 1, 6, false), Ok(ReplayVerdict::Fresh));
        assert_eq!(n, neighbor(1, 6));
    }

    #[test]
    fn test_pending_key_resync() {
        let mut n = NeighborSecurity {
            mle_frame_counter: 500,
            last_key_sequence: 2,
            new_key_pending: true,
        };
        assert_eq!(
            check_frame_counter(&mut n, 3, 2, false),
            Ok(ReplayVerdict::Resynchronised)
        );
        assert_eq!(n, neighbor(3, 2));
    }

    #[test]
    fn test_neighbor_map_lookup() {
        let addr: Ipv6Addr = "fe80::1".parse().unwrap();
        let mut map = NeighborMap::new();
        map.insert(1, addr, neighbor(7, 0));

        assert!(map.neighbor_security(2, &addr).is_none());
        let state = map.neighbor_security(1, &addr).unwrap();
        state.mle_frame_counter = 8;
        assert_eq!(map.get(1, &addr).unwrap().mle_frame_counter, 8);
        assert_eq!(map.len(), 1);
    }
}
