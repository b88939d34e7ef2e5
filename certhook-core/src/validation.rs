use std::collections::HashSet;
use std::time::Duration;

use crate::config::{CerthookToml, ConfigError, Result};

const MAX_MODE: u32 = 0o7777;

/// Validation result with warnings
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent operation
    pub errors: Vec<String>,
    /// Warnings that should be shown to user
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Convert to Result, failing if there are errors
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.has_errors() {
            Err(ConfigError::Validation(self.errors.join("\n")))
        } else {
            Ok(self.warnings)
        }
    }
}

/// Validate a parsed certhook.toml
pub fn validate_certhook_toml(config: &CerthookToml) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Some(perms) = &config.acme.certs_permissions {
        if perms.files_mode > MAX_MODE {
            result.error(format!("files_mode {:o} is out of range", perms.files_mode));
        }
        if perms.dirs_mode > MAX_MODE {
            result.error(format!("dirs_mode {:o} is out of range", perms.dirs_mode));
        }
        if perms.user.as_deref().is_some_and(|u| u.trim().is_empty()) {
            result.error("certs_permissions.user cannot be empty");
        }
        if perms.group.as_deref().is_some_and(|g| g.trim().is_empty()) {
            result.error("certs_permissions.group cannot be empty");
        }
    }

    let mut profile_names = HashSet::new();
    for profile in &config.profiles {
        if profile.name.trim().is_empty() {
            result.error("Profile name cannot be empty");
        } else if !profile_names.insert(profile.name.as_str()) {
            result.error(format!("Duplicate profile name: {}", profile.name));
        }

        if profile.provider.trim().is_empty() {
            result.error(format!("Profile '{}' has an empty provider", profile.name));
        }

        if Duration::try_from_secs_f64(profile.sleep_time).is_err() {
            result.error(format!(
                "Profile '{}' has invalid sleep_time {}",
                profile.name, profile.sleep_time
            ));
        }

        if profile.provider_options.is_empty() {
            result.warn(format!(
                "No provider_options are defined for profile '{}', any call to the provider API is likely to fail",
                profile.name
            ));
        }
    }

    let mut certificate_names = HashSet::new();
    for certificate in &config.certificates {
        let name = certificate.name.as_str();

        if certificate.domains.is_empty() {
            result.error(format!("Certificate '{}' has no domains", name));
        }
        if certificate.domains.iter().any(|d| d.trim().is_empty()) {
            result.error(format!("Certificate '{}' has an empty domain", name));
        }

        if name.trim().is_empty() {
            result.error("Certificate name cannot be empty");
        } else if !certificate_names.insert(name) {
            result.error(format!("Duplicate certificate name: {}", name));
        }

        if !profile_names.contains(certificate.profile.as_str()) {
            result.error(format!(
                "Certificate '{}' references unknown profile '{}'",
                name, certificate.profile
            ));
        }

        for entry in &certificate.autocmd {
            if entry.cmd.is_empty() {
                result.error(format!("Certificate '{}' has an empty autocmd command", name));
            }
            if entry.containers.is_empty() {
                result.error(format!(
                    "Certificate '{}' has an autocmd entry without containers",
                    name
                ));
            }
        }

        for entry in &certificate.autorestart {
            if entry.containers.is_empty() && entry.swarm_services.is_empty() {
                result.error(format!(
                    "Certificate '{}' has an autorestart entry without containers or swarm_services",
                    name
                ));
            }
        }
    }

    result
}
