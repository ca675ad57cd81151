//! MLE service - Service context
//!
//! [`MleService`] owns the buffer pool, the interface registry and the
//! collaborators, and exposes the application API:
//!
//! - interface registration and per-interface settings
//! - message allocation, payload writing and per-message settings
//! - [`msg_send`](MleService::msg_send), which hands a message to the
//!   retransmission engine
//! - [`timer_tick`](MleService::timer_tick) and
//!   [`receive`](MleService::receive), the two entry points the event loop
//!   drives
//!
//! Everything runs on one execution context; no locking is involved.

mod address;
mod engine;
mod handler;
mod receive;
mod send;
mod tlv;

use std::net::Ipv6Addr;
use std::time::Duration;

use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::buffer::{BufferPool, ChallengeSlot, MessageBuffer, TimeoutParams};
use crate::core::{
    CHALLENGE_VALUE_OFFSET, DEFAULT_MAX_BUFFERS, MAX_CHALLENGE_LEN, MAX_SECURITY_LEVEL,
    MIN_CHALLENGE_LEN, MLE_PORT, MleError, MleResult, RandomSource, Scheduler, TICK_PERIOD,
    TLV_CHALLENGE, TOKEN_DELAY_MAX_BUFFERS, TOKEN_DELAY_TICKS, TimeoutHandler, TimerHandle,
    Transport,
};
use crate::crypto::{KeyIdMode, KeyStore, NeighborTable, NoNeighbors, SecurityHeader};
use crate::interface::{InterfaceRegistry, ServiceInstance, TimerDefaults};

pub use address::{
    is_link_local_multicast, is_link_local_scope, is_link_local_unicast, link_local_from_mac,
    mac_from_link_local,
};
pub use engine::retransmission_timeout;
pub use handler::{MleMessage, ReceiveHandler};
pub use receive::ReceiveOutcome;
pub use tlv::{TlvIter, find_tlv, is_well_formed, write_u32_tlv};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// UDP port the transport binds.
    pub port: u16,
    /// Period of the shared timer.
    pub tick_period: Duration,
    /// Maximum number of live message buffers.
    pub max_buffers: usize,
    /// Minimum timeout of a token-delayed buffer.
    pub token_delay_ticks: u16,
    /// Maximum number of token-delayed buffers before new ones are dropped.
    pub token_delay_max_buffers: usize,
    /// Check inbound MLE frame counters against the neighbor table.
    pub frame_counter_check: bool,
    /// Let stale frame counters through (logged, state not updated).
    pub accept_invalid_frame_counter: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: MLE_PORT,
            tick_period: TICK_PERIOD,
            max_buffers: DEFAULT_MAX_BUFFERS,
            token_delay_ticks: TOKEN_DELAY_TICKS,
            token_delay_max_buffers: TOKEN_DELAY_MAX_BUFFERS,
            frame_counter_check: false,
            accept_invalid_frame_counter: false,
        }
    }
}

/// Builder for [`MleService`].
pub struct MleServiceBuilder<K, N = NoNeighbors> {
    config: ServiceConfig,
    keys: K,
    neighbors: N,
    transport: Option<Box<dyn Transport>>,
    scheduler: Option<Box<dyn Scheduler>>,
    random: Option<Box<dyn RandomSource>>,
}

impl<K: KeyStore> MleServiceBuilder<K, NoNeighbors> {
    /// Start a builder around a key store.
    pub fn new(keys: K) -> Self {
        Self {
            config: ServiceConfig::default(),
            keys,
            neighbors: NoNeighbors,
            transport: None,
            scheduler: None,
            random: None,
        }
    }
}

impl<K: KeyStore, N: NeighborTable> MleServiceBuilder<K, N> {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the UDP port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the timer period.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    /// Set the buffer limit.
    pub fn max_buffers(mut self, max: usize) -> Self {
        self.config.max_buffers = max;
        self
    }

    /// Set the token delay and the token-delay queue bound.
    pub fn token_delay(mut self, ticks: u16, max_buffers: usize) -> Self {
        self.config.token_delay_ticks = ticks;
        self.config.token_delay_max_buffers = max_buffers;
        self
    }

    /// Enable inbound frame counter checking.
    pub fn frame_counter_check(mut self, enabled: bool) -> Self {
        self.config.frame_counter_check = enabled;
        self
    }

    /// Accept stale frame counters.
    pub fn accept_invalid_frame_counter(mut self, enabled: bool) -> Self {
        self.config.accept_invalid_frame_counter = enabled;
        self
    }

    /// Set the datagram transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Set the timer service.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Set the random source (defaults to the OS generator).
    pub fn random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Some(Box::new(random));
        self
    }

    /// Use a neighbor table for anti-replay.
    pub fn neighbors<M: NeighborTable>(self, neighbors: M) -> MleServiceBuilder<K, M> {
        MleServiceBuilder {
            config: self.config,
            keys: self.keys,
            neighbors,
            transport: self.transport,
            scheduler: self.scheduler,
            random: self.random,
        }
    }

    /// Build the service.
    pub fn build(self) -> MleResult<MleService<K, N>> {
        let transport = self
            .transport
            .ok_or(MleError::InvalidParameter("transport missing"))?;
        let scheduler = self
            .scheduler
            .ok_or(MleError::InvalidParameter("scheduler missing"))?;
        if self.config.tick_period.is_zero() {
            return Err(MleError::InvalidParameter("tick period must be non-zero"));
        }
        let random = self.random.unwrap_or_else(|| Box::new(OsRng));

        Ok(MleService {
            buffers: BufferPool::new(self.config.max_buffers),
            registry: InterfaceRegistry::new(),
            config: self.config,
            keys: self.keys,
            neighbors: self.neighbors,
            transport,
            scheduler,
            random,
            timer: None,
            transport_open: false,
        })
    }
}

/// The MLE service context.
pub struct MleService<K, N = NoNeighbors> {
    config: ServiceConfig,
    buffers: BufferPool,
    registry: InterfaceRegistry,
    keys: K,
    neighbors: N,
    transport: Box<dyn Transport>,
    scheduler: Box<dyn Scheduler>,
    random: Box<dyn RandomSource>,
    timer: Option<TimerHandle>,
    transport_open: bool,
}

impl<K: KeyStore> MleService<K, NoNeighbors> {
    /// Start building a service around a key store.
    pub fn builder(keys: K) -> MleServiceBuilder<K, NoNeighbors> {
        MleServiceBuilder::new(keys)
    }
}

impl<K: KeyStore, N: NeighborTable> MleService<K, N> {
    // ========================================================================
    // Accessors
    // ========================================================================

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Key store.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Key store, mutable.
    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    /// Neighbor table.
    pub fn neighbors(&self) -> &N {
        &self.neighbors
    }

    /// Neighbor table, mutable.
    pub fn neighbors_mut(&mut self) -> &mut N {
        &mut self.neighbors
    }

    /// Enable or disable inbound frame counter checking.
    pub fn set_frame_counter_check(&mut self, enabled: bool) {
        self.config.frame_counter_check = enabled;
    }

    /// Accept stale inbound frame counters.
    pub fn set_accept_invalid_frame_counter(&mut self, enabled: bool) {
        self.config.accept_invalid_frame_counter = enabled;
    }

    /// Check if the shared timer is currently requested.
    pub fn is_timer_active(&self) -> bool {
        self.timer.is_some()
    }

    /// Check if the transport is open.
    pub fn is_transport_open(&self) -> bool {
        self.transport_open
    }

    /// Registered interface.
    pub fn interface(&self, interface_id: i8) -> Option<&ServiceInstance> {
        self.registry.find(interface_id)
    }

    /// Live message.
    pub fn message(&self, msg_id: u16) -> Option<&MessageBuffer> {
        self.buffers.find(msg_id)
    }

    /// Number of live messages.
    pub fn pending_messages(&self) -> usize {
        self.buffers.len()
    }

    // ========================================================================
    // Interfaces
    // ========================================================================

    /// Register an interface, opening the transport on first use.
    ///
    /// Registering an id again replaces its receive handler, MAC and
    /// challenge length.
    pub fn interface_register(
        &mut self,
        interface_id: i8,
        handler: impl ReceiveHandler + 'static,
        mac64: [u8; 8],
        challenge_length: u8,
    ) -> MleResult<()> {
        if !(MIN_CHALLENGE_LEN..=MAX_CHALLENGE_LEN).contains(&challenge_length) {
            return Err(MleError::InvalidParameter("challenge length out of range"));
        }
        if mac64 == [0u8; 8] {
            return Err(MleError::InvalidParameter("missing MAC address"));
        }

        if !self.transport_open {
            self.transport.open(self.config.port)?;
            self.transport_open = true;
            debug!(port = self.config.port, "transport opened");
        }

        let instance = self
            .registry
            .get_or_create(interface_id, mac64, challenge_length);
        instance.receive_handler = Some(Box::new(handler));
        info!(interface_id, challenge_length, "interface registered");
        Ok(())
    }

    /// Unregister an interface, freeing its pending messages.
    ///
    /// The transport closes when the last interface leaves.
    pub fn interface_unregister(&mut self, interface_id: i8) -> MleResult<()> {
        if self.registry.find(interface_id).is_none() {
            return Err(MleError::InterfaceNotFound(interface_id));
        }
        let freed = self.buffers.free_by_interface(interface_id);
        self.registry.delete(interface_id)?;
        info!(interface_id, freed, "interface unregistered");

        if self.registry.is_empty() {
            self.close_transport();
        }
        self.update_timer();
        Ok(())
    }

    /// Replace the receive handler.
    pub fn interface_set_receive_handler(
        &mut self,
        interface_id: i8,
        handler: impl ReceiveHandler + 'static,
    ) -> MleResult<()> {
        self.instance_mut(interface_id)?.receive_handler = Some(Box::new(handler));
        Ok(())
    }

    /// Install a handler for unsecured messages on a secured interface.
    pub fn interface_set_bypass_handler(
        &mut self,
        interface_id: i8,
        handler: impl ReceiveHandler + 'static,
    ) -> MleResult<()> {
        self.instance_mut(interface_id)?.bypass_handler = Some(Box::new(handler));
        Ok(())
    }

    /// Remove the security bypass handler.
    pub fn interface_clear_bypass_handler(&mut self, interface_id: i8) -> MleResult<()> {
        self.instance_mut(interface_id)?.bypass_handler = None;
        Ok(())
    }

    /// Set the interface's retransmission defaults.
    pub fn interface_set_timer_defaults(
        &mut self,
        interface_id: i8,
        defaults: TimerDefaults,
    ) -> MleResult<()> {
        self.instance_mut(interface_id)?.timers = defaults;
        Ok(())
    }

    /// Configure the transmit token bucket. `size == 0` disables it.
    pub fn interface_token_bucket_settings(
        &mut self,
        interface_id: i8,
        size: u8,
        rate: u8,
        count: u8,
    ) -> MleResult<()> {
        self.instance_mut(interface_id)?
            .token_bucket
            .set(size, rate, count);
        debug!(interface_id, size, rate, count, "token bucket configured");
        Ok(())
    }

    /// Tokens currently in the interface's bucket.
    pub fn interface_token_bucket_level(&self, interface_id: i8) -> MleResult<i16> {
        self.registry
            .find(interface_id)
            .map(|instance| instance.token_bucket().tokens())
            .ok_or(MleError::InterfaceNotFound(interface_id))
    }

    /// Drop every pending message of an interface.
    pub fn interface_tx_queue_clean(&mut self, interface_id: i8) -> usize {
        let freed = self.buffers.free_by_interface(interface_id);
        self.update_timer();
        freed
    }

    /// Number of pending messages of an interface.
    pub fn interface_tx_queue_size(&self, interface_id: i8) -> usize {
        self.buffers.count_by_interface(interface_id)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Allocate a message of `msg_type` with room for `data_length` bytes.
    ///
    /// With `challenge`, a Challenge TLV with a fresh random value of the
    /// interface's challenge length is written right after the type byte.
    /// Security defaults to the interface's level from the key store.
    pub fn msg_allocate(
        &mut self,
        interface_id: i8,
        data_length: usize,
        challenge: bool,
        msg_type: u8,
    ) -> MleResult<u16> {
        let challenge_length = self
            .registry
            .find(interface_id)
            .map(ServiceInstance::challenge_length)
            .ok_or(MleError::InterfaceNotFound(interface_id))?;

        let mut length = data_length;
        if challenge {
            length += usize::from(challenge_length) + 2;
        }
        let msg_id = self
            .buffers
            .allocate(interface_id, length, &mut *self.random)?;

        let level = self.keys.security_level(interface_id).unwrap_or(0);
        let mode = if level == 0 {
            KeyIdMode::Implicit
        } else {
            KeyIdMode::Source4Index
        };
        let security = SecurityHeader {
            security_level: level,
            key_id_mode: mode,
            ..SecurityHeader::default()
        };

        if challenge {
            match self
                .buffers
                .grow_tail(msg_id, usize::from(challenge_length) + 2)
            {
                Ok(tlv) => {
                    tlv[0] = TLV_CHALLENGE;
                    tlv[1] = challenge_length;
                    self.random.random_bytes(&mut tlv[2..]);
                }
                Err(err) => {
                    if let Err(free_err) = self.buffers.free_id(msg_id) {
                        debug!(msg_id, error = %free_err, "buffer already released");
                    }
                    return Err(err);
                }
            }
        }

        let buffer = self.buffer_mut(msg_id)?;
        buffer.buf[0] = msg_type;
        buffer.security = security;
        if challenge {
            buffer.challenge = Some(ChallengeSlot {
                offset: CHALLENGE_VALUE_OFFSET,
                len: usize::from(challenge_length),
            });
        }
        debug!(msg_id, interface_id, challenge, "message allocated");
        Ok(msg_id)
    }

    /// Free a message.
    pub fn msg_free(&mut self, msg_id: u16) -> MleResult<()> {
        self.buffers.free_id(msg_id)?;
        self.update_timer();
        Ok(())
    }

    /// Set the MLE command type.
    pub fn msg_set_type(&mut self, msg_id: u16, msg_type: u8) -> MleResult<()> {
        self.buffer_mut(msg_id)?.buf[0] = msg_type;
        Ok(())
    }

    /// Reserve `len` bytes at the end of the payload and return them.
    pub fn msg_tail_mut(&mut self, msg_id: u16, len: usize) -> MleResult<&mut [u8]> {
        self.buffers.grow_tail(msg_id, len)
    }

    /// Append bytes to the payload.
    pub fn msg_write(&mut self, msg_id: u16, bytes: &[u8]) -> MleResult<()> {
        self.buffers
            .grow_tail(msg_id, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Payload written so far: type byte and TLVs.
    pub fn msg_data(&self, msg_id: u16) -> MleResult<&[u8]> {
        self.buffers
            .find(msg_id)
            .map(MessageBuffer::payload)
            .ok_or(MleError::MessageNotFound(msg_id))
    }

    /// Payload written so far, mutable.
    pub fn msg_data_mut(&mut self, msg_id: u16) -> MleResult<&mut [u8]> {
        Ok(self.buffer_mut(msg_id)?.payload_mut())
    }

    /// Truncate the payload to `len` bytes (type byte included).
    pub fn msg_set_length(&mut self, msg_id: u16, len: usize) -> MleResult<()> {
        let buffer = self.buffer_mut(msg_id)?;
        if len == 0 || len > buffer.buf_end {
            return Err(MleError::InvalidParameter("length beyond written payload"));
        }
        buffer.buf_end = len;
        if let Some(slot) = buffer.challenge {
            if slot.offset + slot.len > len {
                buffer.challenge = None;
            }
        }
        Ok(())
    }

    /// Set the destination address.
    pub fn msg_set_destination(&mut self, msg_id: u16, destination: Ipv6Addr) -> MleResult<()> {
        self.buffer_mut(msg_id)?.destination = destination;
        Ok(())
    }

    /// Set retransmission parameters.
    ///
    /// A non-zero `delay` postpones the first transmission by a random number
    /// of ticks in `1..=delay`.
    pub fn msg_set_timeouts(&mut self, msg_id: u16, params: TimeoutParams) -> MleResult<()> {
        if params.retrans_max > 0 && params.timeout_init == 0 {
            return Err(MleError::InvalidParameter("retries need a non-zero timeout"));
        }
        let delay = if params.delay > 0 {
            Some(self.random.random_in_range(1, params.delay))
        } else {
            None
        };

        let buffer = self.buffer_mut(msg_id)?;
        buffer.apply_timeouts(params);
        if let Some(delay) = delay {
            buffer.delayed_response = true;
            buffer.timeout = delay;
        }
        Ok(())
    }

    /// Use the interface's URT/MRT/MRC.
    pub fn msg_use_default_timeouts(&mut self, msg_id: u16) -> MleResult<()> {
        let interface_id = self.buffer(msg_id)?.interface_id;
        let timers = self
            .registry
            .find(interface_id)
            .map(ServiceInstance::timer_defaults)
            .ok_or(MleError::InterfaceNotFound(interface_id))?;
        self.msg_set_timeouts(
            msg_id,
            TimeoutParams {
                retrans_max: timers.mrc,
                timeout_init: timers.urt,
                timeout_max: timers.mrt,
                delay: 0,
            },
        )
    }

    /// Delay the first transmission by exactly `ticks`.
    pub fn msg_set_response_delay(&mut self, msg_id: u16, ticks: u16) -> MleResult<()> {
        if ticks == 0 {
            return Err(MleError::InvalidParameter("response delay must be non-zero"));
        }
        let buffer = self.buffer_mut(msg_id)?;
        buffer.delayed_response = true;
        buffer.timeout = ticks;
        Ok(())
    }

    /// Set the security parameters. Without `key_sequence` the key store's
    /// active key is used when the message is built.
    pub fn msg_set_security(
        &mut self,
        msg_id: u16,
        security_level: u8,
        key_id_mode: KeyIdMode,
        key_sequence: Option<u32>,
    ) -> MleResult<()> {
        if security_level > MAX_SECURITY_LEVEL {
            return Err(MleError::InvalidParameter("security level above 7"));
        }
        let mut header = SecurityHeader::new(security_level, key_id_mode)?;
        if let Some(sequence) = key_sequence {
            header.set_key_sequence(sequence);
        }
        self.buffer_mut(msg_id)?.security = header;
        Ok(())
    }

    /// Let the message bypass the token bucket.
    pub fn msg_set_priority(&mut self, msg_id: u16, priority: bool) -> MleResult<()> {
        self.buffer_mut(msg_id)?.tokens_priority = priority;
        Ok(())
    }

    /// Send on a specific RF channel.
    pub fn msg_set_channel(&mut self, msg_id: u16, channel: Option<u8>) -> MleResult<()> {
        self.buffer_mut(msg_id)?.options.channel = channel;
        Ok(())
    }

    /// Send with a specific PAN ID.
    pub fn msg_set_pan_id(&mut self, msg_id: u16, pan_id: Option<u16>) -> MleResult<()> {
        self.buffer_mut(msg_id)?.options.pan_id = pan_id;
        Ok(())
    }

    /// Request link-layer security.
    pub fn msg_set_link_layer_security(&mut self, msg_id: u16, enabled: bool) -> MleResult<()> {
        self.buffer_mut(msg_id)?.options.link_layer_security = enabled;
        Ok(())
    }

    /// Use the PSK with key id mode 2 at the link layer.
    pub fn msg_set_psk_key_id_mode_2(&mut self, msg_id: u16, enabled: bool) -> MleResult<()> {
        self.buffer_mut(msg_id)?.options.psk_key_id_mode_2 = enabled;
        Ok(())
    }

    /// Install a per-message timeout handler.
    pub fn msg_set_timeout_handler(
        &mut self,
        msg_id: u16,
        handler: impl TimeoutHandler + 'static,
    ) -> MleResult<()> {
        self.buffer_mut(msg_id)?.timeout_handler = Some(Box::new(handler));
        Ok(())
    }

    /// Check if a matching response has arrived.
    pub fn msg_response_received(&self, msg_id: u16) -> MleResult<bool> {
        Ok(self.buffer(msg_id)?.response_status)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Free every message and interface, stop the timer and close the
    /// transport.
    pub fn teardown(&mut self) {
        let buffers = self.buffers.len();
        let interfaces = self.registry.len();
        self.buffers.clear();
        self.registry.clear();
        self.stop_timer();
        self.close_transport();
        info!(buffers, interfaces, "service torn down");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn buffer(&self, msg_id: u16) -> MleResult<&MessageBuffer> {
        self.buffers
            .find(msg_id)
            .ok_or(MleError::MessageNotFound(msg_id))
    }

    fn buffer_mut(&mut self, msg_id: u16) -> MleResult<&mut MessageBuffer> {
        self.buffers
            .find_mut(msg_id)
            .ok_or(MleError::MessageNotFound(msg_id))
    }

    fn instance_mut(&mut self, interface_id: i8) -> MleResult<&mut ServiceInstance> {
        self.registry
            .find_mut(interface_id)
            .ok_or(MleError::InterfaceNotFound(interface_id))
    }

    fn close_transport(&mut self) {
        if self.transport_open {
            self.transport.close();
            self.transport_open = false;
            debug!("transport closed");
        }
    }

    fn ensure_timer(&mut self) {
        if self.timer.is_none() {
            self.timer = Some(self.scheduler.request_periodic(self.config.tick_period));
        }
    }

    fn stop_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    /// Keep the timer only while buffers or refilling buckets need it.
    fn update_timer(&mut self) -> bool {
        let active = !self.buffers.is_empty() || self.registry.needs_tick();
        if !active {
            self.stop_timer();
        }
        active
    }
}
