use std::net::SocketAddr;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    config::ServerConfig,
    context,
    tlstcp::{self, Acceptor, Credentials},
};

/// Size of the per-connection echo buffer.
pub const ECHO_BUFFER_SIZE: usize = 32 << 10;

/// Loads the server identity and binds the listening socket.
pub async fn listen(config: &ServerConfig) -> std::io::Result<Acceptor> {
    let credentials = Credentials::load(&config.cert, &config.key)
        .map_err(|error| context(error, "error loading key pair"))?;

    let client_roots = match &config.client_ca {
        Some(path) => {
            let certs = tlstcp::load_certs(path)
                .map_err(|error| context(error, "error loading client ca"))?;
            info!("client certificates are required");
            Some(certs)
        }
        None => None,
    };

    tlstcp::server::new(tlstcp::server::Config {
        addr: config.addr(),
        credentials,
        client_roots,
    })
    .await
    .map_err(|error| context(error, "error creating listener"))
}

/// Accepts connections until accepting fails, handing each one to its own task.
pub async fn serve(acceptor: Acceptor) -> std::io::Result<()> {
    info!("listening on {}", acceptor.local_addr()?);

    loop {
        let accepting = acceptor.accept().await.inspect_err(|error| {
            error!("error accept connection: {}", error);
        })?;

        let peer = accepting.peer();
        info!("connection accepted from {}", peer);

        tokio::spawn(async move {
            match accepting.accept().await {
                Ok(conn) => {
                    handle_connection(conn, peer).await;
                }
                Err(error) => {
                    error!("tls handshake with {} failed: {}", peer, error);
                }
            }
        });
    }
}

/// Echoes everything read from `conn` back to it, then closes it.
///
/// Returns the number of bytes echoed. Read and write errors end the loop
/// the same way end-of-stream does; they only affect this connection.
pub async fn handle_connection<S>(mut conn: S, peer: SocketAddr) -> u64
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; ECHO_BUFFER_SIZE];
    let mut echoed = 0u64;

    loop {
        debug!("waiting for {}", peer);
        let n = match conn.read(&mut buf).await {
            Ok(0) => {
                info!("eof received from {}", peer);
                break;
            }
            Ok(n) => n,
            Err(error) => {
                error!("error reading from {}: {}", peer, error);
                break;
            }
        };

        if let Err(error) = echo(&mut conn, &buf[..n]).await {
            error!("error writing to {}: {}", peer, error);
            break;
        }

        echoed += n as u64;
        info!(
            "echoing {} bytes to {} - {:?}",
            n,
            peer,
            String::from_utf8_lossy(&buf[..n])
        );
    }

    release(conn, peer, echoed).await;
    echoed
}

async fn echo<S: AsyncWrite + Unpin>(conn: &mut S, data: &[u8]) -> std::io::Result<()> {
    conn.write_all(data).await?;
    conn.flush().await
}

async fn release<S: AsyncWrite + Unpin>(mut conn: S, peer: SocketAddr, echoed: u64) {
    match conn.shutdown().await {
        Ok(()) => info!("connection {} closed, {} bytes echoed", peer, echoed),
        Err(error) => warn!("error closing connection {}: {}", peer, error),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[tokio::test]
    async fn echoes_until_eof() {
        let (conn, mut client) = duplex(64);
        let handler = tokio::spawn(handle_connection(conn, peer()));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.write_all(b" world").await.unwrap();
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b" world");

        client.shutdown().await.unwrap();
        assert_eq!(handler.await.unwrap(), 11);

        // The handler closed its side after end-of-stream.
        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);
    }

    // Payloads larger than the duplex capacity force partial reads and writes.
    #[tokio::test]
    async fn echoes_large_payload_in_order() {
        let (conn, client) = duplex(1024);
        let handler = tokio::spawn(handle_connection(conn, peer()));

        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let (mut reader, mut writer) = tokio::io::split(client);

        let expected = payload.clone();
        let writing = tokio::spawn(async move {
            writer.write_all(&payload).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let mut echoed = Vec::new();
        reader.read_to_end(&mut echoed).await.unwrap();
        writing.await.unwrap();

        assert_eq!(echoed, expected);
        assert_eq!(handler.await.unwrap(), expected.len() as u64);
    }

    #[tokio::test]
    async fn peer_drop_ends_handler() {
        let (conn, mut client) = duplex(64);
        let handler = tokio::spawn(handle_connection(conn, peer()));

        client.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        client.read_exact(&mut buf).await.unwrap();
        drop(client);

        assert_eq!(handler.await.unwrap(), 1);
    }
}
