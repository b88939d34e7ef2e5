//! DNS-01 challenge handling for the `auth` and `cleanup` hooks
//!
//! Handles:
//! - Selecting the certificate and profile for a lineage
//! - Creating/deleting the `_acme-challenge` TXT record through a DNS provider
//! - Waiting for DNS propagation after a record is created

mod lexicon;
mod provider;

pub use lexicon::LexiconProvider;
pub use provider::{DnsProvider, ProviderError, RecordAction, RecordRequest};

#[cfg(test)]
pub use provider::testing;

use certhook_core::{CerthookToml, ConfigError, MatchError};
use std::time::Duration;
use thiserror::Error;

use crate::request::ChallengeRequest;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No certificate in configuration matches lineage '{0}'")]
    NoCertificate(String),

    #[error(transparent)]
    Ambiguous(#[from] MatchError),

    #[error("Certificate '{certificate}' does not cover domain '{domain}'")]
    DomainNotCovered { certificate: String, domain: String },

    #[error("Profile '{profile}' has an unusable sleep_time {sleep_time}")]
    InvalidSleepTime { profile: String, sleep_time: f64 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Blocking pause used for DNS propagation.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct ChallengeDispatcher<'a> {
    config: &'a CerthookToml,
    provider: &'a dyn DnsProvider,
    sleeper: &'a dyn Sleeper,
}

impl<'a> ChallengeDispatcher<'a> {
    pub fn new(
        config: &'a CerthookToml,
        provider: &'a dyn DnsProvider,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            provider,
            sleeper,
        }
    }

    /// Create or delete the challenge record for `request`.
    ///
    /// Provider failures are returned as-is and never retried; certbot decides
    /// whether to try again.
    pub fn dispatch(
        &self,
        action: RecordAction,
        request: &ChallengeRequest,
    ) -> Result<(), DispatchError> {
        let certificate = self
            .config
            .find_certificate(&request.lineage)?
            .ok_or_else(|| DispatchError::NoCertificate(request.lineage.clone()))?;

        if !certificate.covers(&request.domain) {
            return Err(DispatchError::DomainNotCovered {
                certificate: certificate.name.clone(),
                domain: request.domain.clone(),
            });
        }

        let profile = self.config.profile_for(certificate)?;
        let wait = Duration::try_from_secs_f64(profile.sleep_time).map_err(|_| {
            DispatchError::InvalidSleepTime {
                profile: profile.name.clone(),
                sleep_time: profile.sleep_time,
            }
        })?;
        let record =
            RecordRequest::txt_challenge(action, &request.domain, &request.validation, profile);

        tracing::info!(
            lineage = %request.lineage,
            profile = %profile.name,
            provider = %record.provider_name,
            name = %record.name,
            "{} TXT challenge record",
            match action {
                RecordAction::Create => "Creating",
                RecordAction::Delete => "Deleting",
            }
        );

        self.provider.resolve(&record)?;

        if action == RecordAction::Create && !wait.is_zero() {
            tracing::info!(
                provider = %record.provider_name,
                "Waiting {:.1} seconds for DNS propagation",
                wait.as_secs_f64()
            );
            self.sleeper.sleep(wait);
        }

        Ok(())
    }
}
