use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use thiserror::Error;

use certhook_core::{CerthookToml, ConfigError, MatchError};

use crate::challenge::{
    ChallengeDispatcher, DispatchError, LexiconProvider, RecordAction, ThreadSleeper,
};
use crate::deploy::Deployer;
use crate::exec::SystemRunner;
use crate::output;
use crate::request::{ChallengeRequest, DeployRequest, HookRequest, RequestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookType {
    /// Create the DNS-01 challenge record
    Auth,
    /// Delete the DNS-01 challenge record
    Cleanup,
    /// Post-issuance deploy of the certificate
    Deploy,
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Certhook - certbot manual hook for DNS-01 challenges and certificate deploys
#[derive(Parser, Debug)]
#[command(name = "certhook")]
#[command(version)]
#[command(about = "Certhook - certbot manual hook for DNS-01 challenges and certificate deploys")]
pub struct Cli {
    /// Hook to run
    #[arg(short = 't', long = "type", value_enum)]
    pub hook_type: HookType,

    /// Path to certhook.toml
    #[arg(short, long)]
    pub config: PathBuf,

    /// Certificate lineage (defaults to the challenged domain or RENEWED_LINEAGE)
    #[arg(short, long)]
    pub lineage: Option<String>,

    /// Base directory holding live/ and archive/
    #[arg(long, env = "CERTHOOK_CERTS_DIR", default_value = "/etc/letsencrypt")]
    pub certs_dir: PathBuf,

    /// Domain under validation
    #[arg(long, env = "CERTBOT_DOMAIN", hide = true)]
    pub domain: Option<String>,

    /// Validation token to publish
    #[arg(long, env = "CERTBOT_VALIDATION", hide = true, hide_env_values = true)]
    pub validation: Option<String>,

    /// Live directory of the renewed lineage
    #[arg(long, env = "RENEWED_LINEAGE", hide = true)]
    pub renewed_lineage: Option<String>,

    /// Show debug output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn request(&self) -> Result<HookRequest, RequestError> {
        let lineage = self.lineage.as_deref();
        match self.hook_type {
            HookType::Auth | HookType::Cleanup => {
                let challenge = ChallengeRequest::from_parts(
                    lineage,
                    self.domain.as_deref(),
                    self.validation.as_deref(),
                )?;
                Ok(if self.hook_type == HookType::Auth {
                    HookRequest::Auth(challenge)
                } else {
                    HookRequest::Cleanup(challenge)
                })
            }
            HookType::Deploy => Ok(HookRequest::Deploy(DeployRequest::from_parts(
                lineage,
                self.renewed_lineage.as_deref(),
                &self.certs_dir,
            )?)),
        }
    }

    pub fn run(self) -> Result<(), HookError> {
        let request = self.request()?;
        let config = CerthookToml::load_from_file(&self.config)?;
        tracing::debug!(
            config = %self.config.display(),
            lineage = %request.lineage(),
            "Loaded configuration"
        );

        match request {
            HookRequest::Auth(challenge) => dispatch(&config, RecordAction::Create, &challenge),
            HookRequest::Cleanup(challenge) => dispatch(&config, RecordAction::Delete, &challenge),
            HookRequest::Deploy(deploy) => run_deploy(&config, &deploy),
        }
    }
}

fn dispatch(
    config: &CerthookToml,
    action: RecordAction,
    challenge: &ChallengeRequest,
) -> Result<(), HookError> {
    let runner = SystemRunner;
    let provider = LexiconProvider::new(&runner);
    ChallengeDispatcher::new(config, &provider, &ThreadSleeper).dispatch(action, challenge)?;
    Ok(())
}

fn run_deploy(config: &CerthookToml, request: &DeployRequest) -> Result<(), HookError> {
    let Some(report) = Deployer::new(config, &SystemRunner).deploy(request)? else {
        return Ok(());
    };

    if report.is_success() {
        output::success_stderr(&format!(
            "Deployed certificate {} for lineage {}",
            report.certificate, report.lineage
        ));
    } else {
        let failed = report
            .failures()
            .map(|(stage, _)| stage.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        output::warning_stderr(&format!(
            "Deployed certificate {} with failures in: {}",
            report.certificate, failed
        ));
    }
    Ok(())
}
