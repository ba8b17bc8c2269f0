//! The reactor thread and its lifecycle.
//!
//! [`Server::start`] binds on the calling thread, then hands the socket to a
//! dedicated worker thread running a current-thread runtime. Everything after
//! that (accepting, parsing, dispatch, idle reaping) happens on that one
//! thread. [`Server::shutdown`] stops the loop and joins the worker.

pub mod listener;
pub mod reaper;

use anyhow::{Context, anyhow};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing::{error, info};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::http::connection::ConnectionSettings;
use listener::Reactor;
use reaper::IdleReaper;

/// How long connection tasks get to wind down after the loop stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Server {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<anyhow::Result<()>>>,
}

impl Server {
    pub fn start(cfg: &Config, dispatcher: Dispatcher) -> anyhow::Result<Self> {
        cfg.validate()?;

        let addr = cfg.listen_addr();
        let std_listener = std::net::TcpListener::bind(&addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let settings = ConnectionSettings::from(cfg);
        let timeout = cfg.keepalive_timeout;
        let tick = cfg.tick_interval();
        let resolve_hosts = cfg.record_remote_host;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = std::thread::Builder::new()
            .name("eventgate-reactor".to_string())
            .spawn(move || -> anyhow::Result<()> {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("failed to build reactor runtime")?;
                let local = LocalSet::new();

                let result = local.block_on(&rt, async move {
                    let listener = tokio::net::TcpListener::from_std(std_listener)?;
                    let reactor = Reactor {
                        reaper: Rc::new(RefCell::new(IdleReaper::new(timeout))),
                        dispatcher: Rc::new(dispatcher),
                        settings,
                        tick,
                        resolve_hosts,
                    };
                    listener::run(listener, reactor, shutdown_rx).await
                });

                if let Err(e) = &result {
                    error!(error = %e, "reactor loop failed");
                }

                // Let closed connections finish unwinding before the runtime goes.
                rt.block_on(async {
                    let _ = tokio::time::timeout(DRAIN_TIMEOUT, local).await;
                });
                result
            })
            .context("failed to spawn reactor thread")?;

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `false` once the reactor thread has exited, for whatever reason.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stops the reactor and joins its thread, returning the loop's result.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            // The loop may already be gone; the join below reports why.
            let _ = tx.send(());
        }
        match self.worker.take() {
            Some(worker) => {
                let result = worker
                    .join()
                    .map_err(|_| anyhow!("reactor thread panicked"))?;
                info!(addr = %self.local_addr, "server stopped");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "error while stopping server");
        }
    }
}
