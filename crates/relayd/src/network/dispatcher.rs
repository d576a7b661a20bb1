//! Accept loop and request routing
//!
//! Owns the listening endpoint for its whole life: accepts connections,
//! reads exactly one framed request from each, and either answers an
//! enumeration query or hands the connection to a bridging session. The
//! loop stops on the acknowledged shutdown signal; already-running sessions
//! are left to drain on their own.

use crate::hid::DeviceBackend;
use crate::network::listener::Accept;
use crate::network::session;
use common::{ShutdownHandle, ShutdownListener, shutdown_pair};
use protocol::{Command, Message, read_framed, write_framed};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Dispatcher<L, B> {
    listener: L,
    backend: Arc<B>,
    stop: ShutdownListener,
}

impl<L, B> Dispatcher<L, B>
where
    L: Accept,
    B: DeviceBackend,
{
    /// Create a dispatcher around an open endpoint. The returned handle is
    /// the only way to stop the accept loop; it blocks until the endpoint
    /// is fully released.
    pub fn new(listener: L, backend: Arc<B>) -> (Self, ShutdownHandle) {
        let (handle, stop) = shutdown_pair();
        (
            Self {
                listener,
                backend,
                stop,
            },
            handle,
        )
    }

    /// Accept and route connections until shutdown is requested.
    pub async fn run(mut self) {
        info!("dispatcher accepting connections");

        loop {
            tokio::select! {
                _ = self.stop.requested() => {
                    info!("stop requested, closing listening endpoint");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        debug!("accepted connection");
                        self.dispatch(conn).await;
                    }
                    Err(e) => {
                        // Local to one accept attempt; keep listening.
                        error!(error = %e, "accept failed");
                        continue;
                    }
                },
            }
        }

        // Release the endpoint before acknowledging so the stop requester
        // can rely on it being fully closed when the call returns.
        drop(self.listener);
        self.stop.ack();
        info!("listening endpoint closed");
    }

    /// Read the single request message and branch on its command. Every
    /// failure path simply drops (closes) the connection and returns to
    /// the accept loop.
    async fn dispatch(&self, mut conn: L::Conn) {
        let msg = match read_framed(&mut conn).await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "failed to read request, closing connection");
                return;
            }
        };

        match msg.command() {
            Some(Command::Enumerate) => self.reply_enumerate(conn).await,
            Some(Command::Start) => match msg.device_path() {
                Ok(path) => {
                    info!(%path, "starting bridging session");
                    tokio::spawn(session::run_session(conn, path, self.backend.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "malformed start payload, closing connection");
                }
            },
            None => {
                // Fail closed rather than leaving an unhandled connection
                // open.
                warn!(command = msg.command, "unknown command tag, closing connection");
            }
        }
    }

    /// Answer one enumeration request, then close the connection.
    async fn reply_enumerate(&self, mut conn: L::Conn) {
        let backend = self.backend.clone();
        let devices = match tokio::task::spawn_blocking(move || backend.enumerate()).await {
            Ok(Ok(devices)) => devices,
            Ok(Err(e)) => {
                warn!(error = %e, "enumeration failed, closing connection");
                return;
            }
            Err(e) => {
                error!(error = %e, "enumeration task failed");
                return;
            }
        };

        let reply = match Message::enumerate_reply(&devices) {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "failed to encode enumeration reply");
                return;
            }
        };

        if let Err(e) = write_framed(&mut conn, &reply).await {
            warn!(error = %e, "failed to write enumeration reply");
        } else {
            debug!(count = devices.len(), "enumeration reply sent");
        }
    }
}
