use std::{net::SocketAddr, sync::Arc};

use rustls::{pki_types::CertificateDer, server::WebPkiClientVerifier};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use super::{provider, roots, tls_error, Credentials, TlsStream};

pub struct Config {
    pub addr: String,
    pub credentials: Credentials,
    /// Trust anchors for client certificates. `Some` makes a client certificate mandatory.
    pub client_roots: Option<Vec<CertificateDer<'static>>>,
}

pub struct Acceptor {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl Acceptor {
    /// Waits for the next TCP connection. The handshake is left to the caller
    /// so that a slow peer never holds up the accept loop.
    pub async fn accept(&self) -> std::io::Result<Accepting> {
        let (stream, peer) = self.listener.accept().await?;
        let acceptor = self.acceptor.clone();
        Ok(Accepting {
            stream,
            peer,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

pub struct Accepting {
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
}

impl Accepting {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn accept(self) -> std::io::Result<TlsStream> {
        self.stream.set_nodelay(true)?;
        let stream = self.acceptor.accept(self.stream).await?;
        Ok(TlsStream::Server(stream))
    }
}

pub async fn new(config: Config) -> std::io::Result<Acceptor> {
    let provider = provider();
    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_error)?;

    let builder = match config.client_roots {
        Some(certs) => {
            let client_verifier =
                WebPkiClientVerifier::builder_with_provider(Arc::new(roots(certs)?), provider)
                    .build()
                    .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;
            builder.with_client_cert_verifier(client_verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let Credentials { certs, key } = config.credentials;
    let server_config = builder
        .with_single_cert(certs, key)
        .map_err(tls_error)?;

    let listener = TcpListener::bind(&config.addr).await?;
    let acceptor = TlsAcceptor::from(Arc::new(server_config));
    Ok(Acceptor { listener, acceptor })
}
