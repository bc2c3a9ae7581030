//! TLS termination for https server groups.
use crate::error::Error;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// The certificate chain and private key served by every https group.
///
/// Certificates are never generated: they are supplied by the caller.
#[derive(Clone)]
pub enum TlsMaterial {
    /// PEM-encoded certificate chain (leaf first) and private key.
    Pem { cert_chain: Vec<u8>, key: Vec<u8> },
    /// Paths to PEM files, read when the server starts.
    Files { cert_chain: PathBuf, key: PathBuf },
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsMaterial::Pem { cert_chain, .. } => f
                .debug_struct("Pem")
                .field("cert_chain", &format!("<{} bytes>", cert_chain.len()))
                .field("key", &"<redacted>")
                .finish(),
            TlsMaterial::Files { cert_chain, key } => f
                .debug_struct("Files")
                .field("cert_chain", cert_chain)
                .field("key", key)
                .finish(),
        }
    }
}

impl TlsMaterial {
    fn read(&self) -> Result<(Vec<u8>, Vec<u8>), Error> {
        match self {
            TlsMaterial::Pem { cert_chain, key } => Ok((cert_chain.clone(), key.clone())),
            TlsMaterial::Files { cert_chain, key } => {
                let read = |path: &PathBuf| {
                    std::fs::read(path).map_err(|e| {
                        Error::InvalidTlsMaterial(format!(
                            "failed to read {}: {}",
                            path.display(),
                            e
                        ))
                    })
                };
                Ok((read(cert_chain)?, read(key)?))
            }
        }
    }
}

/// Parse the material and build an acceptor offering HTTP/2 and HTTP/1.1 through ALPN.
pub(crate) fn acceptor(material: &TlsMaterial) -> Result<TlsAcceptor, Error> {
    let (cert_pem, key_pem) = material.read()?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| Error::InvalidTlsMaterial(format!("failed to parse certificates: {}", e)))?;
    if certs.is_empty() {
        return Err(Error::InvalidTlsMaterial(
            "no certificate found in the certificate chain".to_string(),
        ));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| Error::InvalidTlsMaterial(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| Error::InvalidTlsMaterial("no private key found".to_string()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::InvalidTlsMaterial(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::InvalidTlsMaterial(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_rejected_without_panicking() {
        let material = TlsMaterial::Pem {
            cert_chain: b"not a pem".to_vec(),
            key: b"not a key".to_vec(),
        };
        assert!(matches!(
            acceptor(&material),
            Err(Error::InvalidTlsMaterial(_))
        ));
    }

    #[test]
    fn missing_files_are_reported() {
        let material = TlsMaterial::Files {
            cert_chain: "/definitely/not/here.pem".into(),
            key: "/definitely/not/here.key".into(),
        };
        let Err(Error::InvalidTlsMaterial(reason)) = acceptor(&material) else {
            panic!("expected an invalid material error");
        };
        assert!(reason.contains("here.pem"));
    }
}
