use std::time::Duration;

use log::{error, info, warn};
use tokio::io::{self, AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    config::ClientConfig,
    context,
    framing::MessageReader,
    shutdown::Shutdown,
    tlstcp::{self, Credentials, TlsStream},
};

/// Upper bound of a single read from the host. Not a message boundary.
pub const READ_CHUNK: usize = 256;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub messages: usize,
    pub sent: u64,
    pub received: u64,
}

/// Loads the client identity and dials the configured host.
pub async fn connect(config: &ClientConfig) -> std::io::Result<TlsStream> {
    let credentials = Credentials::load(&config.cert, &config.key)
        .map_err(|error| context(error, "error loading key pair"))?;

    let server_roots = match &config.server_ca {
        Some(path) => Some(
            tlstcp::load_certs(path).map_err(|error| context(error, "error loading server ca"))?,
        ),
        None => {
            warn!("server certificate verification is disabled");
            None
        }
    };

    let connector = tlstcp::client::new(tlstcp::client::Config {
        server_addr: config.addr.clone(),
        server_name: config.server_name.clone(),
        credentials,
        server_roots,
    })?;

    let stream = connector
        .connect()
        .await
        .map_err(|error| context(error, "error connecting to host"))?;
    info!("connected to {}", stream.get_ref().0.peer_addr()?);

    Ok(stream)
}

/// Runs the reader and writer over one connection until either side ends.
///
/// The reader is spawned, the writer runs on the calling task. Whichever
/// finishes first fires `shutdown`, which also stops the other one. The
/// connection is closed exactly once, after both have returned.
pub async fn run<S, I>(
    conn: S,
    mut input: MessageReader<I>,
    pacing: Duration,
    shutdown: Shutdown,
) -> std::io::Result<Report>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    I: AsyncBufRead + Unpin,
{
    let (reader, mut writer) = io::split(conn);
    let reading = tokio::spawn(read_loop(reader, shutdown.clone()));

    let mut report = Report::default();
    let result = write_loop(&mut writer, &mut input, pacing, &shutdown, &mut report).await;
    shutdown.fire();

    let (reader, received) = reading
        .await
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error))?;
    report.received = received;

    let mut conn = reader.unsplit(writer);
    if let Err(error) = conn.shutdown().await {
        warn!("error closing connection: {}", error);
    } else {
        info!("connection closed");
    }

    result.map(|_| report)
}

async fn read_loop<R>(mut reader: R, shutdown: Shutdown) -> (R, u64)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let mut received = 0u64;

    while !shutdown.is_fired() {
        let result = tokio::select! {
            _ = shutdown.wait() => break,
            result = reader.read(&mut buf) => result,
        };

        match result {
            Ok(0) => {
                info!("eof received from host");
                shutdown.fire();
            }
            Ok(n) => {
                received += n as u64;
                info!(
                    "received {} bytes - {:?}",
                    n,
                    String::from_utf8_lossy(&buf[..n])
                );
            }
            Err(error) => {
                error!("error reading from host: {}", error);
                shutdown.fire();
            }
        }
    }

    info!("reading done");
    (reader, received)
}

async fn write_loop<W, I>(
    writer: &mut W,
    input: &mut MessageReader<I>,
    pacing: Duration,
    shutdown: &Shutdown,
    report: &mut Report,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
{
    loop {
        if shutdown.is_fired() {
            info!("writing done");
            return Ok(());
        }

        let message = tokio::select! {
            _ = shutdown.wait() => continue,
            message = input.next_message() => message,
        };
        let message = message
            .map_err(|error| context(error, "error reading from source"))?
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "input exhausted")
            })?;

        writer
            .write_all(&message)
            .await
            .map_err(|error| context(error, "error writing to host"))?;
        writer
            .flush()
            .await
            .map_err(|error| context(error, "error writing to host"))?;

        report.messages += 1;
        report.sent += message.len() as u64;
        info!(
            "write {} bytes - {:?}",
            message.len(),
            String::from_utf8_lossy(&message)
        );

        tokio::select! {
            _ = shutdown.wait() => {}
            _ = tokio::time::sleep(pacing) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        task::{Context, Poll},
    };

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader, ReadBuf};

    use super::*;
    use crate::framing::{Framing, FILE_DELIMITER};

    const PACE: Duration = Duration::from_millis(10);
    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn input_exhaustion_is_fatal_and_closes_connection() {
        let (conn, mut peer) = duplex(1024);
        let input = MessageReader::new(&b"a\x10b\x10"[..], Framing::Delimiter(FILE_DELIMITER));

        let error = tokio::time::timeout(LIMIT, run(conn, input, PACE, Shutdown::new()))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::UnexpectedEof);

        // Messages arrive without delimiters, then the stream is closed.
        let mut sent = Vec::new();
        peer.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, b"ab");
    }

    #[tokio::test]
    async fn peer_close_stops_writer() {
        let (conn, peer) = duplex(1024);
        // Input that never yields a message keeps the writer waiting.
        let (_keep_open, pending) = duplex(16);
        let input = MessageReader::new(BufReader::new(pending), Framing::Line);
        let shutdown = Shutdown::new();

        drop(peer);
        let report = tokio::time::timeout(LIMIT, run(conn, input, PACE, shutdown.clone()))
            .await
            .unwrap()
            .unwrap();

        assert!(shutdown.is_fired());
        assert!(!shutdown.fire());
        assert_eq!(report, Report::default());
    }

    #[tokio::test]
    async fn peer_close_interrupts_pacing() {
        let (conn, mut peer) = duplex(1024);
        let (mut source, pending) = duplex(64);
        let input = MessageReader::new(BufReader::new(pending), Framing::Line);
        source.write_all(b"ping\n").await.unwrap();

        let client = tokio::spawn(run(conn, input, Duration::from_secs(3600), Shutdown::new()));

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        peer.write_all(b"pong").await.unwrap();
        peer.shutdown().await.unwrap();

        let report = tokio::time::timeout(LIMIT, client)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            report,
            Report {
                messages: 1,
                sent: 4,
                received: 4
            }
        );
    }

    #[tokio::test]
    async fn external_fire_is_graceful() {
        let (conn, mut peer) = duplex(1024);
        let (_source, pending) = duplex(64);
        let input = MessageReader::new(BufReader::new(pending), Framing::Line);
        let shutdown = Shutdown::new();

        let client = tokio::spawn(run(conn, input, PACE, shutdown.clone()));
        shutdown.fire();

        tokio::time::timeout(LIMIT, client)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // The client side was closed once and only once.
        let mut rest = Vec::new();
        assert_eq!(peer.read_to_end(&mut rest).await.unwrap(), 0);
    }

    /// Connection whose reads and writes always fail. Counts close attempts.
    #[derive(Default)]
    struct Broken {
        write_pending: bool,
        shutdowns: Arc<AtomicUsize>,
    }

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::ConnectionReset.into()))
        }
    }

    impl AsyncWrite for Broken {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            // Yield once so the reader gets to fail too.
            if self.write_pending {
                self.write_pending = false;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_error_is_fatal() {
        let mut conn = Broken::default();
        let mut input = MessageReader::new(&b"hello\nworld\n"[..], Framing::Line);
        let mut report = Report::default();

        let error = write_loop(&mut conn, &mut input, PACE, &Shutdown::new(), &mut report)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(report, Report::default());
    }

    #[tokio::test]
    async fn read_error_fires_shutdown_once() {
        let shutdown = Shutdown::new();

        let (_, received) =
            tokio::time::timeout(LIMIT, read_loop(Broken::default(), shutdown.clone()))
                .await
                .unwrap();

        assert_eq!(received, 0);
        assert!(shutdown.is_fired());
        assert!(!shutdown.fire());
    }

    #[tokio::test]
    async fn failing_connection_is_closed_once() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let conn = Broken {
            write_pending: true,
            shutdowns: shutdowns.clone(),
        };
        let input = MessageReader::new(&b"hello\n"[..], Framing::Line);

        let error = tokio::time::timeout(LIMIT, run(conn, input, PACE, Shutdown::new()))
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
