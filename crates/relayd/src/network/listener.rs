//! Listening endpoint
//!
//! The dispatcher only needs "accept yields a bidirectional byte stream",
//! expressed by the [`Accept`] trait. The production endpoint is a local
//! socket with an access policy applied at creation time; a loopback TCP
//! listener is available for debugging clients that cannot speak the local
//! socket transport.

use crate::config::TransportSettings;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::info;

/// Source of accepted connections.
///
/// Implementations own the endpoint; dropping the implementation closes it.
pub trait Accept: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for and return the next connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// The daemon's listening endpoint.
pub enum TransportListener {
    /// Loopback TCP (debug transport).
    Tcp(TcpListener),
    /// Local socket (production transport).
    #[cfg(unix)]
    Local(UnixListener),
}

impl TransportListener {
    /// Open the configured endpoint and apply its access policy.
    pub async fn open(settings: &TransportSettings) -> io::Result<Self> {
        if settings.debug {
            let listener = TcpListener::bind(&settings.address).await?;
            info!(addr = %settings.address, "listening on loopback TCP (debug transport)");
            return Ok(Self::Tcp(listener));
        }

        #[cfg(unix)]
        {
            if let Some(dir) = settings.socket_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            // A stale socket file from an unclean exit blocks the bind.
            match std::fs::remove_file(&settings.socket_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }

            let listener = UnixListener::bind(&settings.socket_path)?;

            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(
                &settings.socket_path,
                std::fs::Permissions::from_mode(settings.socket_mode),
            )?;

            info!(
                path = %settings.socket_path.display(),
                mode = %format!("{:o}", settings.socket_mode),
                "listening on local socket"
            );
            Ok(Self::Local(listener))
        }

        #[cfg(not(unix))]
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "production transport requires a Unix host; use the debug TCP transport",
        ))
    }

    /// Local address of the debug TCP endpoint, if that is the active
    /// transport.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            TransportListener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            TransportListener::Local(_) => None,
        }
    }
}

impl Accept for TransportListener {
    type Conn = TransportStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<TransportStream>> + Send {
        async move {
            match self {
                TransportListener::Tcp(listener) => {
                    let (stream, _) = listener.accept().await?;
                    Ok(TransportStream::Tcp(stream))
                }
                #[cfg(unix)]
                TransportListener::Local(listener) => {
                    let (stream, _) = listener.accept().await?;
                    Ok(TransportStream::Local(stream))
                }
            }
        }
    }
}

/// One accepted connection, whichever transport produced it.
pub enum TransportStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Local(UnixStream),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            TransportStream::Local(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            TransportStream::Local(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            TransportStream::Local(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            TransportStream::Local(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportSettings;

    #[tokio::test]
    async fn debug_transport_binds_loopback_tcp() {
        let settings = TransportSettings {
            debug: true,
            address: "127.0.0.1:0".to_string(),
            ..TransportSettings::default()
        };
        let listener = TransportListener::open(&settings).await.unwrap();
        assert!(matches!(listener, TransportListener::Tcp(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_socket_gets_the_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let settings = TransportSettings {
            debug: false,
            socket_path: dir.path().join("relay.sock"),
            socket_mode: 0o660,
            ..TransportSettings::default()
        };

        let _listener = TransportListener::open(&settings).await.unwrap();
        let mode = std::fs::metadata(&settings.socket_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o660);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        std::fs::write(&path, b"stale").unwrap();

        let settings = TransportSettings {
            debug: false,
            socket_path: path,
            ..TransportSettings::default()
        };
        let listener = TransportListener::open(&settings).await;
        assert!(listener.is_ok());
    }
}
