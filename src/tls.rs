use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("unable to read certificate {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable certificate found in {0}")]
    NoCertificate(PathBuf),
}

/// Trusts whatever certificate the server presents, so an intercepting
/// proxy can re-sign traffic without its CA being installed.
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _: &[Certificate],
        server_name: &ServerName,
        _: &mut dyn Iterator<Item = &[u8]>,
        _: &[u8],
        _: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        debug!(?server_name, bytes = end_entity.0.len(), "accepting server certificate unverified");
        Ok(ServerCertVerified::assertion())
    }
}

pub fn accept_any_cert_config() -> ClientConfig {
    ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth()
}

/// System roots, plus the certificates of `extra_cert` when given.
pub fn trusted_roots_config(extra_cert: Option<&Path>) -> Result<ClientConfig, TlsError> {
    let mut roots = RootCertStore::empty();

    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let der: Vec<Vec<u8>> = certs.into_iter().map(|cert| cert.0).collect();
            let (added, ignored) = roots.add_parsable_certificates(&der);
            debug!(added, ignored, "loaded native root certificates");
        }
        Err(err) => warn!(%err, "unable to load native root certificates"),
    }

    if let Some(path) = extra_cert {
        let added = add_pem_file(&mut roots, path)?;
        debug!(added, path = %path.display(), "loaded local certificate");
    }

    Ok(ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

fn add_pem_file(roots: &mut RootCertStore, path: &Path) -> Result<usize, TlsError> {
    let read_error = |source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_error)?;
    let der = rustls_pemfile::certs(&mut BufReader::new(file)).map_err(read_error)?;

    let (added, _) = roots.add_parsable_certificates(&der);
    if added == 0 {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certificate_file_is_an_error() {
        let result = trusted_roots_config(Some(Path::new("/nonexistent/ca.pem")));
        assert!(matches!(result, Err(TlsError::Read { .. })));
    }

    #[test]
    fn file_without_pem_blocks_is_rejected() {
        let path = std::env::temp_dir().join(format!("privilege-fuzzer-{}.pem", std::process::id()));
        std::fs::write(&path, "not a certificate").unwrap();
        let result = trusted_roots_config(Some(&path));
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(TlsError::NoCertificate(_))));
    }
}
