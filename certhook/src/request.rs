//! Validated hook requests.
//!
//! Built once from the command line and certbot's environment, then handed to
//! the dispatcher or deployer. Nothing below this layer reads the environment.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{0} is not set; this hook must be run by certbot")]
    MissingEnvironment(&'static str),

    #[error("No lineage given and RENEWED_LINEAGE is not set")]
    MissingLineage,

    #[error("Cannot derive a lineage name from {0}")]
    InvalidLineagePath(PathBuf),
}

/// DNS-01 challenge for one domain of a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub lineage: String,
    /// Domain under validation, possibly a wildcard
    pub domain: String,
    /// TXT record content
    pub validation: String,
}

/// Post-issuance deploy of one lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub lineage: String,
    /// `<certs-dir>/live/<lineage>`, a symlink to the archive directory
    pub live_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRequest {
    Auth(ChallengeRequest),
    Cleanup(ChallengeRequest),
    Deploy(DeployRequest),
}

impl HookRequest {
    pub fn lineage(&self) -> &str {
        match self {
            HookRequest::Auth(req) | HookRequest::Cleanup(req) => &req.lineage,
            HookRequest::Deploy(req) => &req.lineage,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ChallengeRequest {
    pub fn from_parts(
        lineage: Option<&str>,
        domain: Option<&str>,
        validation: Option<&str>,
    ) -> Result<Self, RequestError> {
        let domain =
            non_empty(domain).ok_or(RequestError::MissingEnvironment("CERTBOT_DOMAIN"))?;
        let validation = non_empty(validation)
            .ok_or(RequestError::MissingEnvironment("CERTBOT_VALIDATION"))?;
        let lineage = non_empty(lineage).unwrap_or(certhook_core::challenge_domain(domain));

        Ok(Self {
            lineage: lineage.to_string(),
            domain: domain.to_string(),
            validation: validation.to_string(),
        })
    }
}

impl DeployRequest {
    pub fn from_parts(
        lineage: Option<&str>,
        renewed_lineage: Option<&str>,
        certs_dir: &std::path::Path,
    ) -> Result<Self, RequestError> {
        let renewed = non_empty(renewed_lineage).map(PathBuf::from);

        let lineage = match (non_empty(lineage), &renewed) {
            (Some(lineage), _) => lineage.to_string(),
            (None, Some(path)) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .ok_or_else(|| RequestError::InvalidLineagePath(path.clone()))?,
            (None, None) => return Err(RequestError::MissingLineage),
        };

        let live_path = renewed.unwrap_or_else(|| certs_dir.join("live").join(&lineage));

        Ok(Self { lineage, live_path })
    }
}
