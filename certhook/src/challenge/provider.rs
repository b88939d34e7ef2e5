use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use certhook_core::{Profile, challenge_domain, challenge_record_name};

use crate::exec::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Create,
    Delete,
}

impl RecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordAction::Create => "create",
            RecordAction::Delete => "delete",
        }
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One DNS record mutation handed to a provider backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRequest {
    pub action: RecordAction,
    pub domain: String,
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub provider_name: String,
    pub provider_options: BTreeMap<String, String>,
    pub ttl: Option<u32>,
    pub delegated: Option<String>,
}

impl RecordRequest {
    /// TXT record for the DNS-01 challenge of `domain` using `profile`'s provider.
    pub fn txt_challenge(
        action: RecordAction,
        domain: &str,
        validation: &str,
        profile: &Profile,
    ) -> Self {
        Self {
            action,
            domain: challenge_domain(domain).to_string(),
            record_type: "TXT".to_string(),
            name: challenge_record_name(domain),
            content: validation.to_string(),
            provider_name: profile.provider.clone(),
            provider_options: profile.provider_options.clone(),
            ttl: profile.ttl,
            delegated: profile.delegated_subdomain.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider '{provider}' failed to {action} {name}: {source}")]
    Command {
        provider: String,
        action: RecordAction,
        name: String,
        #[source]
        source: CommandError,
    },
}

/// A DNS backend able to create and delete records.
pub trait DnsProvider {
    fn resolve(&self, request: &RecordRequest) -> Result<(), ProviderError>;
}
