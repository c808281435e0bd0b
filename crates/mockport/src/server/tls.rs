//! TLS acceptor for HTTPS endpoints.

use super::ServerError;
use rustls::pki_types::CertificateDer;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Create TLS acceptor from certificate and key files.
pub fn create_tls_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, ServerError> {
    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        ServerError::Tls(format!("failed to open certificate file '{cert_path}': {e}"))
    })?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificate file: {e}")))?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates found in certificate file: {cert_path}"
        )));
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        ServerError::Tls(format!("failed to open private key file '{key_path}': {e}"))
    })?;
    let mut key_reader = std::io::BufReader::new(key_file);

    // PKCS8, RSA or SEC1
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse private key file: {e}")))?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in key file: {key_path}")))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(format!("unsupported protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("failed to build TLS configuration: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
