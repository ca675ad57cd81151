//! Tokio UDP transport and timer scheduler.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::core::{Datagram, Scheduler, TimerHandle, Transport};

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1280;

/// [`Transport`] over a non-blocking tokio UDP socket bound on `[::]:port`.
///
/// `open` must run inside a tokio runtime.
#[derive(Debug, Default)]
pub struct UdpTransport {
    bind_address: Option<Ipv6Addr>,
    socket: Option<Arc<UdpSocket>>,
    scope_ids: HashMap<i8, u32>,
}

impl UdpTransport {
    /// Create a transport bound to the unspecified address when opened.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a specific local address instead of `::`.
    pub fn bind_address(mut self, address: Ipv6Addr) -> Self {
        self.bind_address = Some(address);
        self
    }

    /// Map an interface id to the IPv6 scope id used for link-local sends.
    pub fn scope_id(mut self, interface_id: i8, scope_id: u32) -> Self {
        self.scope_ids.insert(interface_id, scope_id);
        self
    }

    /// Shared handle to the socket, for the receive loop.
    pub fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.clone()
    }

    /// Get the local address, if open.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.open_socket()?.local_addr()
    }

    fn open_socket(&self) -> io::Result<&Arc<UdpSocket>> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "MLE socket not open"))
    }
}

impl Transport for UdpTransport {
    fn open(&mut self, port: u16) -> io::Result<()> {
        let address = self.bind_address.unwrap_or(Ipv6Addr::UNSPECIFIED);
        let socket = std::net::UdpSocket::bind(SocketAddrV6::new(address, port, 0, 0))?;
        socket.set_nonblocking(true)?;
        socket.set_multicast_loop_v6(false)?;
        let socket = UdpSocket::from_std(socket)?;
        debug!(local = %socket.local_addr()?, "MLE socket bound");
        self.socket = Some(Arc::new(socket));
        Ok(())
    }

    fn send(&mut self, datagram: &Datagram) -> io::Result<()> {
        let socket = self.open_socket()?;
        let scope_id = self
            .scope_ids
            .get(&datagram.interface_id)
            .copied()
            .unwrap_or(0);
        let target = SocketAddrV6::new(datagram.destination, datagram.port, 0, scope_id);
        socket.try_send_to(&datagram.payload, SocketAddr::V6(target))?;
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("MLE socket closed");
        }
    }
}

/// Shared view of whether the service currently wants timer ticks.
#[derive(Debug, Clone, Default)]
pub struct TickState {
    active: Arc<AtomicBool>,
}

impl TickState {
    /// Check if a periodic timer is requested.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// [`Scheduler`] recording the timer request for the driver loop.
///
/// The driver owns the actual `tokio::time::Interval`; this only tells it
/// whether ticks should reach the service.
#[derive(Debug, Default)]
pub struct TickScheduler {
    state: TickState,
    next_handle: u32,
    period: Option<Duration>,
}

impl TickScheduler {
    /// Create a scheduler and the state handle the driver reads.
    pub fn new() -> (Self, TickState) {
        let scheduler = Self::default();
        let state = scheduler.state.clone();
        (scheduler, state)
    }

    /// Period of the last request.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl Scheduler for TickScheduler {
    fn request_periodic(&mut self, period: Duration) -> TimerHandle {
        self.period = Some(period);
        self.state.active.store(true, Ordering::Release);
        let handle = TimerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        handle
    }

    fn cancel(&mut self, _handle: TimerHandle) {
        self.state.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_open_fails() {
        let mut transport = UdpTransport::new();
        let datagram = Datagram::new(
            1,
            "fe80::1".parse().unwrap(),
            "ff02::1".parse().unwrap(),
            vec![0xFF, 0x00],
        );
        let err = transport.send(&datagram).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(transport.local_addr().is_err());
    }

    #[test]
    fn test_tick_scheduler_state() {
        let (mut scheduler, state) = TickScheduler::new();
        assert!(!state.is_active());

        let handle = scheduler.request_periodic(Duration::from_millis(100));
        assert!(state.is_active());
        assert_eq!(scheduler.period(), Some(Duration::from_millis(100)));

        scheduler.cancel(handle);
        assert!(!state.is_active());
        assert_ne!(scheduler.request_periodic(Duration::from_millis(100)), handle);
    }
}
