use std::path::Path;

use rustls::pki_types::{
    pem::{self, PemObject},
    CertificateDer, PrivateKeyDer,
};
use tokio::net::TcpStream;

pub mod client;
pub mod server;
mod verifier;

pub use client::Connector;
pub use server::Acceptor;

pub type TlsStream = tokio_rustls::TlsStream<TcpStream>;

/// Identity presented during the handshake: a certificate chain and its key.
///
/// Loaded once at startup and then only read; both `Connector` and `Acceptor`
/// clone it into their rustls configs.
pub struct Credentials {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Credentials {
    pub fn load(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> std::io::Result<Self> {
        let certs = load_certs(cert)?;
        let key = PrivateKeyDer::from_pem_file(key.as_ref()).map_err(pem_error)?;
        Ok(Credentials { certs, key })
    }

    pub fn from_pem(cert: &[u8], key: &[u8]) -> std::io::Result<Self> {
        let certs = CertificateDer::pem_slice_iter(cert)
            .collect::<Result<Vec<_>, _>>()
            .map_err(pem_error)?;
        if certs.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no certificate found",
            ));
        }
        let key = PrivateKeyDer::from_pem_slice(key).map_err(pem_error)?;
        Ok(Credentials { certs, key })
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Credentials {
            certs: self.certs.clone(),
            key: self.key.clone_key(),
        }
    }
}

/// Reads every certificate of a PEM file, used for chains and trust anchors.
pub fn load_certs(path: impl AsRef<Path>) -> std::io::Result<Vec<CertificateDer<'static>>> {
    let path = path.as_ref();
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(pem_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error)?;

    if certs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("no certificate found in {}", path.display()),
        ));
    }

    Ok(certs)
}

pub(crate) fn roots(certs: Vec<CertificateDer<'static>>) -> std::io::Result<rustls::RootCertStore> {
    let mut store = rustls::RootCertStore::empty();
    for cert in certs {
        store.add(cert).map_err(tls_error)?;
    }
    Ok(store)
}

pub(crate) fn provider() -> std::sync::Arc<rustls::crypto::CryptoProvider> {
    std::sync::Arc::new(rustls::crypto::ring::default_provider())
}

fn pem_error(error: pem::Error) -> std::io::Error {
    match error {
        pem::Error::Io(e) => e,
        _ => std::io::Error::new(std::io::ErrorKind::InvalidData, error),
    }
}

pub(crate) fn tls_error(error: rustls::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, error)
}
