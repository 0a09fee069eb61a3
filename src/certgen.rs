use std::{
    fs,
    path::{Path, PathBuf},
};

use rcgen::{generate_simple_self_signed, CertifiedKey};

pub const CERT_FILE: &str = "tls.crt";
pub const KEY_FILE: &str = "tls.key";

pub struct CertFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Writes a fresh self-signed certificate and its key into `dir`.
pub fn write_self_signed(dir: &Path, subject_alt_names: &[String]) -> std::io::Result<CertFiles> {
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names.to_vec())
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;

    fs::create_dir_all(dir)?;

    let files = CertFiles {
        cert: dir.join(CERT_FILE),
        key: dir.join(KEY_FILE),
    };
    fs::write(&files.cert, cert.pem())?;
    fs::write(&files.key, key_pair.serialize_pem())?;

    Ok(files)
}
