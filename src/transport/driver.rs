//! Event loop feeding ticks and datagrams into the service.

use std::future::Future;
use std::io;
use std::net::{Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::InboundDatagram;
use crate::crypto::{KeyStore, NeighborTable};
use crate::service::MleService;

use super::udp::{DEFAULT_RECV_BUFFER_SIZE, TickState};

/// Drive `service` until `shutdown` resolves.
///
/// Ticks reach the service only while [`TickState`] reports an active
/// timer. Datagrams from non-IPv6 senders are ignored. The socket does not
/// report the destination address, so `local_address` stands in for it.
pub async fn run_driver<K, N, F>(
    service: &mut MleService<K, N>,
    socket: &UdpSocket,
    ticks: TickState,
    interface_id: i8,
    local_address: Ipv6Addr,
    shutdown: F,
) -> io::Result<()>
where
    K: KeyStore,
    N: NeighborTable,
    F: Future<Output = ()>,
{
    let period = service.config().tick_period;
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = vec![0u8; DEFAULT_RECV_BUFFER_SIZE];
    tokio::pin!(shutdown);

    info!(interface_id, ?period, "MLE driver started");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if ticks.is_active() {
                    service.timer_tick(1);
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
                        debug!(error = %err, "ICMP error on MLE socket");
                        continue;
                    }
                    Err(err) => {
                        warn!(error = %err, "MLE socket receive failed");
                        return Err(err);
                    }
                };
                let SocketAddr::V6(from) = from else {
                    debug!(%from, "non-IPv6 sender ignored");
                    continue;
                };
                let datagram =
                    InboundDatagram::new(interface_id, *from.ip(), local_address, buf[..len].to_vec());
                // Drops are logged by the service.
                let _ = service.receive(datagram);
            }
        }
    }
    info!(interface_id, pending = service.pending_messages(), "MLE driver stopped");
    Ok(())
}
