use std::cell::RefCell;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::http::connection::{Connection, ConnectionSettings, Peer};
use crate::server::reaper::{IdleReaper, Registration};

/// State shared by every task on the reactor thread.
pub(crate) struct Reactor {
    pub reaper: Rc<RefCell<IdleReaper>>,
    pub dispatcher: Rc<Dispatcher>,
    pub settings: ConnectionSettings,
    pub tick: Duration,
    pub resolve_hosts: bool,
}

/// The reactor loop: accepts connections, drives the reaper tick, and stops
/// when `shutdown` fires.
///
/// Must run inside a `LocalSet`; connections are spawned as local tasks.
pub(crate) async fn run(
    listener: TcpListener,
    reactor: Reactor,
    mut shutdown: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    let mut ticker = tokio::time::interval_at(Instant::now() + reactor.tick, reactor.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }

            _ = ticker.tick() => {
                let reaped = reactor.reaper.borrow_mut().tick();
                if reaped > 0 {
                    debug!(reaped, "idle connections closed");
                }
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => spawn_connection(&reactor, socket, peer),
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }

    let detached = reactor.reaper.borrow_mut().close_all();
    info!(connections = detached, "detached open connections");
    drop(listener);
    Ok(())
}

fn spawn_connection(reactor: &Reactor, socket: TcpStream, peer: SocketAddr) {
    debug!("Accepted connection from {}", peer);
    if let Err(e) = socket.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }

    // Registered before the task starts, removed when the task drops it.
    let (registration, close) = Registration::new(&reactor.reaper);
    let dispatcher = Rc::clone(&reactor.dispatcher);
    let settings = reactor.settings;
    let resolve = reactor.resolve_hosts;

    tokio::task::spawn_local(async move {
        let mut close = close;
        let host = if resolve {
            tokio::select! {
                _ = &mut close => {
                    debug!(peer = %peer, "connection closed during reverse lookup");
                    return;
                }
                host = resolve_host(peer.ip()) => host,
            }
        } else {
            None
        };
        let peer_info = Peer {
            addr: peer.ip(),
            host,
        };

        let mut conn = Connection::new(socket, peer_info, settings, dispatcher);
        match conn.run(&registration, close).await {
            Ok(()) => {}
            Err(Error::Protocol(e)) => warn!(peer = %peer, error = %e, "protocol error, closing connection"),
            Err(e) => debug!(peer = %peer, error = %e, "connection error"),
        }
    });
}

/// Reverse DNS for the peer, off the reactor thread.
async fn resolve_host(ip: IpAddr) -> Option<String> {
    match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await {
        Ok(Ok(host)) => Some(host),
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "reverse lookup failed");
            None
        }
        Err(_) => None,
    }
}
