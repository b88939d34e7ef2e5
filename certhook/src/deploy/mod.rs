//! Post-issuance deploy pipeline
//!
//! Stages run in a fixed order for the matched certificate:
//! 1. PKCS12 export (`[certificates.pfx]`)
//! 2. Commands inside containers (`[[certificates.autocmd]]`)
//! 3. Container restarts and swarm service updates (`[[certificates.autorestart]]`)
//! 4. Permission normalization (`[acme.certs_permissions]`)
//!
//! Permissions come last so they also cover files written by earlier stages.
//! A failing stage is reported and the next one still runs.

mod containers;
mod permissions;
mod pfx;

pub use containers::NotifyError;
pub use permissions::PermissionsFailed;
pub use pfx::{PFX_FILE, PfxError};

use containers::ContainerNotifier;
use permissions::normalize;
use pfx::export_pfx;

use certhook_core::{Certificate, CerthookToml, MatchError};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::exec::CommandRunner;
use crate::request::DeployRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    PfxExport,
    AutoCommand,
    AutoRestart,
    Permissions,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStage::PfxExport => "pfx export",
            DeployStage::AutoCommand => "autocmd",
            DeployStage::AutoRestart => "autorestart",
            DeployStage::Permissions => "permissions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Archive directory not found behind {0}")]
    MissingArchive(PathBuf),

    #[error(transparent)]
    Pfx(#[from] PfxError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Permissions(#[from] PermissionsFailed),
}

#[derive(Debug)]
pub struct StageOutcome {
    pub stage: DeployStage,
    pub result: Result<(), StageError>,
}

/// Outcome of every stage that was attempted for one lineage.
#[derive(Debug)]
pub struct DeployReport {
    pub lineage: String,
    pub certificate: String,
    pub outcomes: Vec<StageOutcome>,
}

impl DeployReport {
    pub fn failures(&self) -> impl Iterator<Item = (DeployStage, &StageError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.stage, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn stages(&self) -> Vec<DeployStage> {
        self.outcomes.iter().map(|o| o.stage).collect()
    }
}

pub struct Deployer<'a> {
    config: &'a CerthookToml,
    runner: &'a dyn CommandRunner,
}

impl<'a> Deployer<'a> {
    pub fn new(config: &'a CerthookToml, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Run the deploy pipeline for the certificate managing `request.lineage`.
    ///
    /// Returns `Ok(None)` when no certificate matches: the lineage belongs to
    /// something else sharing the ACME client and is skipped. Stage failures
    /// never turn into an `Err`; they are collected in the report.
    pub fn deploy(&self, request: &DeployRequest) -> Result<Option<DeployReport>, MatchError> {
        let Some(certificate) = self.config.find_certificate(&request.lineage)? else {
            tracing::warn!(
                lineage = %request.lineage,
                "No certificate in configuration matches lineage, skipping deploy"
            );
            return Ok(None);
        };

        tracing::info!(
            lineage = %request.lineage,
            certificate = %certificate.name,
            "Deploying certificate"
        );

        let archive = resolve_archive(&request.live_path);
        let mut report = DeployReport {
            lineage: request.lineage.clone(),
            certificate: certificate.name.clone(),
            outcomes: Vec::new(),
        };

        for stage in [
            DeployStage::PfxExport,
            DeployStage::AutoCommand,
            DeployStage::AutoRestart,
            DeployStage::Permissions,
        ] {
            let Some(result) = self.run_stage(stage, certificate, request, archive.as_deref())
            else {
                tracing::debug!(stage = %stage, "Stage not configured, skipping");
                continue;
            };

            match &result {
                Ok(()) => tracing::info!(stage = %stage, "Deploy stage completed"),
                Err(e) => tracing::error!(stage = %stage, "Deploy stage failed: {}", e),
            }
            report.outcomes.push(StageOutcome { stage, result });
        }

        Ok(Some(report))
    }

    /// `None` when the stage has nothing configured.
    fn run_stage(
        &self,
        stage: DeployStage,
        certificate: &Certificate,
        request: &DeployRequest,
        archive: Option<&Path>,
    ) -> Option<Result<(), StageError>> {
        let archive_dir =
            || archive.ok_or_else(|| StageError::MissingArchive(request.live_path.clone()));
        let notifier = ContainerNotifier::new(self.runner);

        match stage {
            DeployStage::PfxExport => {
                let pfx = certificate.pfx_export()?;
                Some(archive_dir().and_then(|dir| {
                    export_pfx(dir, &request.lineage, pfx.passphrase.as_deref())?;
                    Ok(())
                }))
            }
            DeployStage::AutoCommand => {
                if certificate.autocmd.is_empty() {
                    return None;
                }
                Some(
                    notifier
                        .exec(&certificate.autocmd)
                        .into_result()
                        .map(drop)
                        .map_err(Into::into),
                )
            }
            DeployStage::AutoRestart => {
                if certificate.autorestart.is_empty() {
                    return None;
                }
                Some(
                    notifier
                        .restart(&certificate.autorestart)
                        .into_result()
                        .map(drop)
                        .map_err(Into::into),
                )
            }
            DeployStage::Permissions => {
                let perms = self.config.certs_permissions()?;
                Some(archive_dir().and_then(|dir| {
                    normalize(dir, perms).into_result(dir)?;
                    Ok(())
                }))
            }
        }
    }
}

/// Follow the live symlink to the archive directory holding the PEM files.
fn resolve_archive(live_path: &Path) -> Option<PathBuf> {
    match std::fs::canonicalize(live_path) {
        Ok(path) if path.is_dir() => {
            tracing::debug!(
                live = %live_path.display(),
                archive = %path.display(),
                "Resolved archive directory"
            );
            Some(path)
        }
        Ok(path) => {
            tracing::warn!(path = %path.display(), "Live path does not resolve to a directory");
            None
        }
        Err(e) => {
            tracing::warn!(path = %live_path.display(), "Cannot resolve live path: {}", e);
            None
        }
    }
}
