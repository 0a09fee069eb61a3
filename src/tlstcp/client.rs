use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{provider, roots, tls_error, verifier::AcceptAnyServerCert, Credentials, TlsStream};

pub struct Config {
    pub server_addr: String,
    pub server_name: String,
    pub credentials: Credentials,
    /// Trust anchors for the server certificate. `None` skips verification.
    pub server_roots: Option<Vec<CertificateDer<'static>>>,
}

#[derive(Clone)]
pub struct Connector {
    connector: TlsConnector,
    server_addr: String,
    server_name: ServerName<'static>,
}

impl Connector {
    pub async fn connect(&self) -> std::io::Result<TlsStream> {
        let stream = TcpStream::connect(&self.server_addr).await?;
        stream.set_nodelay(true)?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await?;
        Ok(TlsStream::Client(stream))
    }
}

pub fn new(config: Config) -> std::io::Result<Connector> {
    let server_name = ServerName::try_from(config.server_name)
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;

    let provider = provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_error)?;

    let builder = match config.server_roots {
        Some(certs) => builder.with_root_certificates(roots(certs)?),
        None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(provider))),
    };

    let Credentials { certs, key } = config.credentials;
    let client_config = builder
        .with_client_auth_cert(certs, key)
        .map_err(tls_error)?;

    Ok(Connector {
        connector: TlsConnector::from(Arc::new(client_config)),
        server_addr: config.server_addr,
        server_name,
    })
}
