//! Session bridge
//!
//! Wires one accepted connection to one device actor and tears all three
//! parties down together: a closed connection stops the actor through the
//! write channel, a stopped actor closes the connection through the read
//! channel. Failures stay inside the session; the dispatcher and sibling
//! sessions never observe them.

use crate::hid::DeviceBackend;
use crate::hid::actor::spawn_device_actor;
use protocol::WIRE_REPORT_SIZE;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Per-direction channel capacity between the pumps and the device actor.
const CHANNEL_CAPACITY: usize = 256;

/// Run one bridging session to completion.
///
/// Opens the device (off the runtime, the open blocks), then pumps records
/// in both directions until either side fails or closes. The connection is
/// closed on every exit path; an open failure means no pumps are ever
/// started.
pub async fn run_session<C, B>(conn: C, path: String, backend: Arc<B>)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: DeviceBackend,
{
    let device = {
        let backend = backend.clone();
        let path = path.clone();
        match tokio::task::spawn_blocking(move || backend.open(&path)).await {
            Ok(Ok(device)) => device,
            Ok(Err(e)) => {
                warn!(error = %e, "device open failed, dropping session");
                return;
            }
            Err(e) => {
                error!(error = %e, "device open task failed");
                return;
            }
        }
    };

    info!(%path, "session bridged to device");

    let (write_tx, write_rx) = async_channel::bounded(CHANNEL_CAPACITY);
    let (read_tx, read_rx) = async_channel::bounded(CHANNEL_CAPACITY);

    let actor = spawn_device_actor(device, write_rx, read_tx);

    let (reader, writer) = tokio::io::split(conn);
    let mut inbound = tokio::spawn(pump_inbound(reader, write_tx));
    let mut outbound = tokio::spawn(pump_outbound(read_rx, writer));

    tokio::select! {
        _ = &mut inbound => {
            // Caller side ended; the close cascades through the actor to
            // the outbound pump, which then shuts the stream down.
            let _ = outbound.await;
        }
        _ = &mut outbound => {
            // Device side ended and the outbound pump closed the stream. A
            // peer that never writes again would park the inbound read
            // forever, so it is torn down with the connection.
            inbound.abort();
            let _ = inbound.await;
        }
    }

    // Both pumps are down, so the actor is stopping too (closed write
    // channel or dead read sink). Join it off the runtime so the device
    // handle is known to be released before the session is reported closed.
    let joined = tokio::task::spawn_blocking(move || actor.join()).await;
    if !matches!(joined, Ok(Ok(()))) {
        error!("device actor thread did not shut down cleanly");
    }

    info!(%path, "session closed");
}

/// Connection to device. Reads wire records (64-byte report plus the
/// report-id byte) and queues them for the actor; a clean end-of-stream or
/// a read error closes the write channel, which stops the actor.
async fn pump_inbound<R>(mut reader: R, writes: async_channel::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; WIRE_REPORT_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("connection closed by peer");
                break;
            }
            Ok(n) => {
                if writes.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "connection read failed");
                break;
            }
        }
    }
    // No more sends will ever occur; the actor observes this promptly and
    // winds down.
    writes.close();
}

/// Device to connection. Forwards records produced by the actor as-is; when
/// the actor stops and its channel closes, the connection is shut down.
async fn pump_outbound<W>(reads: async_channel::Receiver<Vec<u8>>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Ok(report) = reads.recv().await {
        if let Err(e) = writer.write_all(&report).await {
            warn!(error = %e, "connection write failed");
            return;
        }
    }
    debug!("device stream ended, closing connection");
    let _ = writer.shutdown().await;
}
