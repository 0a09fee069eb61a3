use std::net::SocketAddr;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::CertificateDer;
use tlsecho::{
    server,
    tlstcp::{self, Credentials},
};

pub struct Identity {
    pub credentials: Credentials,
    pub cert: CertificateDer<'static>,
}

pub fn identity(name: &str) -> Identity {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec![name.to_string()]).unwrap();
    let credentials =
        Credentials::from_pem(cert.pem().as_bytes(), key_pair.serialize_pem().as_bytes()).unwrap();
    Identity {
        credentials,
        cert: cert.der().clone(),
    }
}

/// Starts an echo server on an ephemeral loopback port.
pub async fn start_server(
    identity: &Identity,
    client_roots: Option<Vec<CertificateDer<'static>>>,
) -> SocketAddr {
    let acceptor = tlstcp::server::new(tlstcp::server::Config {
        addr: "127.0.0.1:0".to_string(),
        credentials: identity.credentials.clone(),
        client_roots,
    })
    .await
    .unwrap();
    let addr = acceptor.local_addr().unwrap();

    tokio::spawn(server::serve(acceptor));
    addr
}

pub fn connector(
    addr: SocketAddr,
    identity: &Identity,
    server_roots: Option<Vec<CertificateDer<'static>>>,
) -> tlstcp::Connector {
    tlstcp::client::new(tlstcp::client::Config {
        server_addr: addr.to_string(),
        server_name: "localhost".to_string(),
        credentials: identity.credentials.clone(),
        server_roots,
    })
    .unwrap()
}
