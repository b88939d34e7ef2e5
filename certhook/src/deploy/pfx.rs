//! PKCS12 export of a lineage's key and certificates.

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::X509;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PRIVKEY_FILE: &str = "privkey.pem";
pub const CERT_FILE: &str = "cert.pem";
pub const CHAIN_FILE: &str = "chain.pem";
pub const PFX_FILE: &str = "cert.pfx";

#[derive(Debug, Error)]
pub enum PfxError {
    #[error("Missing artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PEM data in {path}: {source}")]
    InvalidPem {
        path: PathBuf,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("Failed to build PKCS12 bundle: {0}")]
    Build(#[from] openssl::error::ErrorStack),
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, PfxError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            PfxError::MissingArtifact(path.to_path_buf())
        } else {
            PfxError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

struct Material {
    key: PKey<Private>,
    cert: X509,
    chain: Vec<X509>,
}

impl Material {
    fn load(archive_dir: &Path) -> Result<Self, PfxError> {
        let key_path = archive_dir.join(PRIVKEY_FILE);
        let cert_path = archive_dir.join(CERT_FILE);
        let chain_path = archive_dir.join(CHAIN_FILE);

        // Read everything first so a missing file is reported before a bad one.
        let key_pem = read_artifact(&key_path)?;
        let cert_pem = read_artifact(&cert_path)?;
        let chain_pem = read_artifact(&chain_path)?;

        let key = PKey::private_key_from_pem(&key_pem).map_err(|source| PfxError::InvalidPem {
            path: key_path,
            source,
        })?;
        let cert = X509::from_pem(&cert_pem).map_err(|source| PfxError::InvalidPem {
            path: cert_path,
            source,
        })?;
        let chain = X509::stack_from_pem(&chain_pem).map_err(|source| PfxError::InvalidPem {
            path: chain_path,
            source,
        })?;

        Ok(Self { key, cert, chain })
    }

    fn to_pkcs12_der(&self, friendly_name: &str, passphrase: &str) -> Result<Vec<u8>, PfxError> {
        let mut ca = Stack::new()?;
        for cert in &self.chain {
            ca.push(cert.clone())?;
        }

        let mut builder = Pkcs12::builder();
        builder
            .name(friendly_name)
            .pkey(&self.key)
            .cert(&self.cert)
            .ca(ca);
        let pkcs12 = builder.build2(passphrase)?;
        Ok(pkcs12.to_der()?)
    }

    /// Whether an existing bundle already holds exactly this material.
    fn matches_bundle(&self, der: &[u8], passphrase: &str) -> bool {
        let Ok(parsed) = Pkcs12::from_der(der).and_then(|p| p.parse2(passphrase)) else {
            return false;
        };

        let key_matches = parsed
            .pkey
            .as_ref()
            .is_some_and(|key| key.public_eq(&self.key));
        let cert_matches = match (parsed.cert.as_ref(), self.cert.to_der()) {
            (Some(cert), Ok(expected)) => cert.to_der().is_ok_and(|der| der == expected),
            _ => false,
        };

        let mut bundled: Vec<Vec<u8>> = parsed
            .ca
            .as_ref()
            .map(|stack| stack.iter().filter_map(|c| c.to_der().ok()).collect())
            .unwrap_or_default();
        let mut expected: Vec<Vec<u8>> =
            self.chain.iter().filter_map(|c| c.to_der().ok()).collect();
        bundled.sort();
        expected.sort();

        key_matches && cert_matches && bundled == expected
    }
}

/// Write `cert.pfx` next to the PEM files in `archive_dir`.
///
/// An existing bundle holding the same key, certificate and chain is kept as
/// is, so re-running a deploy leaves the file untouched.
pub fn export_pfx(
    archive_dir: &Path,
    friendly_name: &str,
    passphrase: Option<&str>,
) -> Result<PathBuf, PfxError> {
    let passphrase = passphrase.unwrap_or("");
    let material = Material::load(archive_dir)?;
    let pfx_path = archive_dir.join(PFX_FILE);

    if let Ok(existing) = std::fs::read(&pfx_path)
        && material.matches_bundle(&existing, passphrase)
    {
        tracing::debug!(path = %pfx_path.display(), "PKCS12 bundle already up to date");
        return Ok(pfx_path);
    }

    let der = material.to_pkcs12_der(friendly_name, passphrase)?;
    std::fs::write(&pfx_path, der).map_err(|source| PfxError::Io {
        path: pfx_path.clone(),
        source,
    })?;

    tracing::info!(path = %pfx_path.display(), "Exported PKCS12 bundle");
    Ok(pfx_path)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Write a self-signed key/cert/chain triple into `dir`.
    pub fn write_pem_files(dir: &Path, domain: &str) {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        std::fs::write(dir.join(PRIVKEY_FILE), key_pair.serialize_pem()).unwrap();
        std::fs::write(dir.join(CERT_FILE), cert.pem()).unwrap();
        std::fs::write(dir.join(CHAIN_FILE), cert.pem()).unwrap();
    }
}
