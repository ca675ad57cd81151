//! Message buffer pool.
//!
//! Buffers live in a generation-checked arena. Callers only ever see the
//! random 16-bit `msg_id`; the engine works on [`BufferKey`]s, which go stale
//! as soon as their slot is freed.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::core::{BUFFER_GROWTH_STEP, MleError, MleResult, RandomSource};

use super::message::MessageBuffer;

/// Arena handle of a live buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    index: usize,
    generation: u32,
    msg_id: u16,
}

impl BufferKey {
    /// Message id the key was issued for.
    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<MessageBuffer>,
}

/// Round `len` up to the next growth step.
pub(crate) fn round_up(len: usize) -> usize {
    len.div_ceil(BUFFER_GROWTH_STEP) * BUFFER_GROWTH_STEP
}

/// Owner of every pending outgoing message.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    ids: HashMap<u16, BufferKey>,
    max_buffers: usize,
}

impl BufferPool {
    /// Create a pool holding at most `max_buffers` live messages.
    pub fn new(max_buffers: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            ids: HashMap::new(),
            max_buffers,
        }
    }

    /// Allocate a buffer with room for `data_length` bytes after the type byte.
    ///
    /// The new buffer has `len() == 1` and every flag cleared. Returns the
    /// fresh non-zero msg_id.
    pub fn allocate<R: RandomSource + ?Sized>(
        &mut self,
        interface_id: i8,
        data_length: usize,
        random: &mut R,
    ) -> MleResult<u16> {
        if self.ids.len() >= self.max_buffers {
            debug!(interface_id, max = self.max_buffers, "buffer pool exhausted");
            return Err(MleError::OutOfMemory);
        }

        let size = round_up(data_length + 1);
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| MleError::OutOfMemory)?;
        buf.resize(size, 0);

        let msg_id = self.unique_id(random.random_u16())?;

        let index = match self.free_slots.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.entry = Some(MessageBuffer::new(msg_id, interface_id, buf));
        self.ids.insert(
            msg_id,
            BufferKey {
                index,
                generation: slot.generation,
                msg_id,
            },
        );

        trace!(msg_id, interface_id, size, "buffer allocated");
        Ok(msg_id)
    }

    fn unique_id(&self, seed: u16) -> MleResult<u16> {
        let mut candidate = seed;
        for _ in 0..=u16::MAX {
            if candidate != 0 && !self.ids.contains_key(&candidate) {
                return Ok(candidate);
            }
            candidate = candidate.wrapping_add(1);
        }
        Err(MleError::OutOfMemory)
    }

    /// Arena key of a live message.
    pub fn key(&self, msg_id: u16) -> Option<BufferKey> {
        self.ids.get(&msg_id).copied()
    }

    /// Look up a live message by id.
    pub fn find(&self, msg_id: u16) -> Option<&MessageBuffer> {
        self.key(msg_id).and_then(|key| self.get(key))
    }

    /// Look up a live message by id for mutation.
    pub fn find_mut(&mut self, msg_id: u16) -> Option<&mut MessageBuffer> {
        let key = self.key(msg_id)?;
        self.get_mut(key)
    }

    /// Resolve a key, `None` once the buffer has been freed.
    pub fn get(&self, key: BufferKey) -> Option<&MessageBuffer> {
        let slot = self.slots.get(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    /// Resolve a key for mutation.
    pub fn get_mut(&mut self, key: BufferKey) -> Option<&mut MessageBuffer> {
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Find the message whose challenge equals `response`.
    pub fn find_for_response(&self, response: &[u8]) -> Option<u16> {
        self.iter()
            .find(|buffer| buffer.challenge() == Some(response))
            .map(MessageBuffer::msg_id)
    }

    /// Reserve `extra` bytes at the tail and return them.
    ///
    /// Storage grows in whole steps; written bytes and the challenge offset
    /// are preserved.
    pub fn grow_tail(&mut self, msg_id: u16, extra: usize) -> MleResult<&mut [u8]> {
        let buffer = self
            .find_mut(msg_id)
            .ok_or(MleError::MessageNotFound(msg_id))?;

        let start = buffer.buf_end;
        let required = start + extra;
        if required > buffer.buf.len() {
            let size = round_up(required);
            buffer
                .buf
                .try_reserve_exact(size - buffer.buf.len())
                .map_err(|_| MleError::OutOfMemory)?;
            buffer.buf.resize(size, 0);
            trace!(msg_id, size, "buffer grown");
        }
        buffer.buf_end = required;
        Ok(&mut buffer.buf[start..required])
    }

    /// Free a buffer. A stale key is rejected.
    pub fn free(&mut self, key: BufferKey) -> MleResult<MessageBuffer> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .ok_or(MleError::InvalidHandle(key.msg_id))?;
        let buffer = slot.entry.take().ok_or(MleError::InvalidHandle(key.msg_id))?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(key.index);
        self.ids.remove(&key.msg_id);
        trace!(msg_id = key.msg_id, "buffer freed");
        Ok(buffer)
    }

    /// Free a buffer by message id.
    pub fn free_id(&mut self, msg_id: u16) -> MleResult<MessageBuffer> {
        let key = self.key(msg_id).ok_or(MleError::MessageNotFound(msg_id))?;
        self.free(key)
    }

    /// Free every buffer of an interface, returning how many went.
    pub fn free_by_interface(&mut self, interface_id: i8) -> usize {
        let keys: Vec<BufferKey> = self
            .keyed()
            .filter(|(_, buffer)| buffer.interface_id == interface_id)
            .map(|(key, _)| key)
            .collect();
        let freed = keys.into_iter().filter(|key| self.free(*key).is_ok()).count();
        if freed > 0 {
            debug!(interface_id, freed, "interface buffers freed");
        }
        freed
    }

    /// Number of live buffers owned by an interface.
    pub fn count_by_interface(&self, interface_id: i8) -> usize {
        self.iter()
            .filter(|buffer| buffer.interface_id == interface_id)
            .count()
    }

    /// Number of buffers parked waiting for tokens.
    pub fn token_delayed_count(&self) -> usize {
        self.iter().filter(|buffer| buffer.tokens_delay).count()
    }

    /// Advance every armed buffer by `elapsed` ticks.
    ///
    /// Returns the buffers that are due: their countdown is at zero, or they
    /// are parked on tokens and must be re-checked.
    pub fn expire(&mut self, elapsed: u16) -> Vec<BufferKey> {
        let mut due = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(buffer) = slot.entry.as_mut() else {
                continue;
            };
            if !buffer.armed {
                continue;
            }
            let fired = if buffer.timeout > 0 {
                buffer.timeout = buffer.timeout.saturating_sub(elapsed);
                buffer.timeout == 0
            } else {
                true
            };
            if fired || buffer.tokens_delay {
                due.push(BufferKey {
                    index,
                    generation: slot.generation,
                    msg_id: buffer.msg_id,
                });
            }
        }
        due
    }

    /// Live buffers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageBuffer> {
        self.slots.iter().filter_map(|slot| slot.entry.as_ref())
    }

    fn keyed(&self) -> impl Iterator<Item = (BufferKey, &MessageBuffer)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|buffer| {
                (
                    BufferKey {
                        index,
                        generation: slot.generation,
                        msg_id: buffer.msg_id,
                    },
                    buffer,
                )
            })
        })
    }

    /// Number of live buffers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if no buffer is live.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Free everything.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free_slots = (0..self.slots.len()).rev().collect();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct FixedIds(u16);

    impl RandomSource for FixedIds {
        fn random_u16(&mut self) -> u16 {
            self.0
        }
        fn random_bytes(&mut self, buf: &mut [u8]) {
            buf.fill(0xAB);
        }
    }

    #[test]
    fn test_allocate_defaults() {
        let mut pool = BufferPool::new(8);
        let id = pool.allocate(1, 10, &mut StdRng::seed_from_u64(1)).unwrap();
        let buffer = pool.find(id).unwrap();

        assert_ne!(id, 0);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.interface_id(), 1);
        assert!(!buffer.message_sent());
        assert!(!buffer.is_token_delayed());
        assert!(buffer.challenge().is_none());
    }

    #[test]
    fn test_capacity_rounding() {
        let mut pool = BufferPool::new(8);
        let mut rng = StdRng::seed_from_u64(2);
        let a = pool.allocate(1, 63, &mut rng).unwrap();
        let b = pool.allocate(1, 64, &mut rng).unwrap();
        assert_eq!(pool.find(a).unwrap().capacity(), 64);
        assert_eq!(pool.find(b).unwrap().capacity(), 128);
    }

    #[test]
    fn test_ids_unique_and_nonzero_on_collision() {
        let mut pool = BufferPool::new(8);
        let mut zero = FixedIds(0);
        let a = pool.allocate(1, 0, &mut zero).unwrap();
        let b = pool.allocate(1, 0, &mut zero).unwrap();
        let c = pool.allocate(1, 0, &mut zero).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));

        let mut top = FixedIds(u16::MAX);
        let d = pool.allocate(1, 0, &mut top).unwrap();
        let e = pool.allocate(1, 0, &mut top).unwrap();
        assert_eq!((d, e), (u16::MAX, 4));
    }

    #[test]
    fn test_pool_limit() {
        let mut pool = BufferPool::new(2);
        let mut rng = StdRng::seed_from_u64(3);
        pool.allocate(1, 0, &mut rng).unwrap();
        pool.allocate(1, 0, &mut rng).unwrap();
        let err = pool.allocate(1, 0, &mut rng).unwrap_err();
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_grow_tail_preserves_content() {
        let mut pool = BufferPool::new(4);
        let id = pool.allocate(1, 4, &mut StdRng::seed_from_u64(4)).unwrap();

        pool.grow_tail(id, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(pool.find(id).unwrap().len(), 5);

        let tail = pool.grow_tail(id, 100).unwrap();
        assert_eq!(tail.len(), 100);
        tail.fill(9);

        let buffer = pool.find(id).unwrap();
        assert_eq!(buffer.len(), 105);
        assert_eq!(buffer.capacity(), 128);
        assert_eq!(&buffer.payload()[1..5], &[1, 2, 3, 4]);
        assert!(buffer.payload()[5..].iter().all(|b| *b == 9));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool = BufferPool::new(4);
        let id = pool.allocate(1, 0, &mut StdRng::seed_from_u64(5)).unwrap();
        let key = pool.key(id).unwrap();

        pool.free(key).unwrap();
        assert!(matches!(pool.free(key), Err(MleError::InvalidHandle(i)) if i == id));
        assert!(pool.find(id).is_none());
        assert!(matches!(pool.free_id(id), Err(MleError::MessageNotFound(_))));
    }

    #[test]
    fn test_stale_key_after_slot_reuse() {
        let mut pool = BufferPool::new(4);
        let mut rng = StdRng::seed_from_u64(6);
        let a = pool.allocate(1, 0, &mut rng).unwrap();
        let stale = pool.key(a).unwrap();
        pool.free(stale).unwrap();

        let b = pool.allocate(1, 0, &mut rng).unwrap();
        assert!(pool.get(stale).is_none());
        assert!(pool.free(stale).is_err());
        assert!(pool.find(b).is_some());
    }

    #[test]
    fn test_free_by_interface() {
        let mut pool = BufferPool::new(8);
        let mut rng = StdRng::seed_from_u64(7);
        pool.allocate(1, 0, &mut rng).unwrap();
        pool.allocate(2, 0, &mut rng).unwrap();
        pool.allocate(1, 0, &mut rng).unwrap();

        assert_eq!(pool.count_by_interface(1), 2);
        assert_eq!(pool.free_by_interface(1), 2);
        assert_eq!(pool.count_by_interface(1), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_find_for_response() {
        let mut pool = BufferPool::new(4);
        let mut rng = StdRng::seed_from_u64(8);
        let id = pool.allocate(1, 10, &mut rng).unwrap();
        let other = pool.allocate(1, 10, &mut rng).unwrap();

        pool.grow_tail(id, 6)
            .unwrap()
            .copy_from_slice(&[3, 4, 0xde, 0xad, 0xbe, 0xef]);
        pool.find_mut(id).unwrap().challenge = Some(crate::buffer::ChallengeSlot { offset: 3, len: 4 });

        assert_eq!(pool.find_for_response(&[0xde, 0xad, 0xbe, 0xef]), Some(id));
        assert_eq!(pool.find_for_response(&[0xde, 0xad, 0xbe]), None);
        assert_ne!(pool.find_for_response(&[0xde, 0xad, 0xbe, 0xef]), Some(other));
    }

    #[test]
    fn test_expire_fires_on_zero_and_token_delay() {
        let mut pool = BufferPool::new(4);
        let mut rng = StdRng::seed_from_u64(9);
        let a = pool.allocate(1, 0, &mut rng).unwrap();
        let b = pool.allocate(1, 0, &mut rng).unwrap();
        let idle = pool.allocate(1, 0, &mut rng).unwrap();

        {
            let buffer = pool.find_mut(a).unwrap();
            buffer.armed = true;
            buffer.timeout = 3;
        }
        {
            let buffer = pool.find_mut(b).unwrap();
            buffer.armed = true;
            buffer.timeout = 20;
            buffer.tokens_delay = true;
        }
        pool.find_mut(idle).unwrap().timeout = 1;

        let due: Vec<u16> = pool.expire(2).iter().map(BufferKey::msg_id).collect();
        assert_eq!(due, vec![b]);

        let due: Vec<u16> = pool.expire(2).iter().map(BufferKey::msg_id).collect();
        assert_eq!(due, vec![a, b]);
        assert_eq!(pool.find(a).unwrap().timeout(), 0);
        assert_eq!(pool.find(idle).unwrap().timeout(), 1);
    }

    #[test]
    fn test_expire_armed_buffer_at_zero_is_due() {
        let mut pool = BufferPool::new(4);
        let id = pool.allocate(1, 0, &mut StdRng::seed_from_u64(10)).unwrap();
        pool.find_mut(id).unwrap().armed = true;

        let due: Vec<u16> = pool.expire(1).iter().map(BufferKey::msg_id).collect();
        assert_eq!(due, vec![id]);
    }
}
