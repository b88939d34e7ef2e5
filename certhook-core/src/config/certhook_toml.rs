use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::matching::{self, MatchError};
use crate::validation::validate_certhook_toml;

/// Root configuration from certhook.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CerthookToml {
    /// [acme] section - global settings applied to every certificate
    #[serde(default)]
    pub acme: AcmeSettings,

    /// [[profiles]] - DNS provider profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,

    /// [[certificates]] - certificates managed by this hook
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

/// [acme] section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AcmeSettings {
    /// Permissions applied to each certificate archive after deploy
    pub certs_permissions: Option<CertsPermissions>,
}

/// [acme.certs_permissions] section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertsPermissions {
    /// Mode for plain files (POSIX permission bits)
    #[serde(default = "default_files_mode", deserialize_with = "deserialize_mode")]
    pub files_mode: u32,

    /// Mode for directories, including the archive root
    #[serde(default = "default_dirs_mode", deserialize_with = "deserialize_mode")]
    pub dirs_mode: u32,

    /// Owner user name (or numeric uid)
    pub user: Option<String>,

    /// Owner group name (or numeric gid)
    pub group: Option<String>,
}

impl Default for CertsPermissions {
    fn default() -> Self {
        Self {
            files_mode: default_files_mode(),
            dirs_mode: default_dirs_mode(),
            user: None,
            group: None,
        }
    }
}

/// A DNS provider profile from [[profiles]]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub name: String,

    /// Provider identifier understood by the DNS backend (e.g. "cloudflare")
    pub provider: String,

    /// Opaque options passed through to the provider
    #[serde(default, deserialize_with = "deserialize_provider_options")]
    pub provider_options: BTreeMap<String, String>,

    /// Seconds to wait after creating a record, for DNS propagation
    #[serde(default = "default_sleep_time")]
    pub sleep_time: f64,

    /// TTL of the challenge record, provider default when unset
    pub ttl: Option<u32>,

    /// Zone delegated below the registered domain, if any
    pub delegated_subdomain: Option<String>,
}

/// A managed certificate from [[certificates]]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    /// Certificate (lineage) name, defaults to the first domain
    #[serde(default)]
    pub name: String,

    /// Domain patterns covered by the certificate, wildcards allowed
    pub domains: Vec<String>,

    /// Name of the profile used for DNS challenges
    pub profile: String,

    pub pfx: Option<PfxExport>,

    #[serde(default)]
    pub autocmd: Vec<AutoCommand>,

    #[serde(default)]
    pub autorestart: Vec<AutoRestart>,
}

/// PKCS12 export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PfxExport {
    #[serde(default)]
    pub export: bool,

    pub passphrase: Option<String>,
}

/// A command executed inside containers after deploy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoCommand {
    pub cmd: CommandSpec,
    pub containers: Vec<String>,
}

/// Either a shell command line or an explicit argv
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandSpec {
    /// Run through `sh -c` inside the container. Images without a shell
    /// need the argv form, even for a single-word command.
    Shell(String),
    /// Exec'd as-is, no shell involved.
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Shell(line) => line.trim().is_empty(),
            CommandSpec::Argv(argv) => argv.is_empty() || argv[0].trim().is_empty(),
        }
    }
}

/// Containers and swarm services restarted after deploy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoRestart {
    #[serde(default)]
    pub containers: Vec<String>,

    #[serde(default)]
    pub swarm_services: Vec<String>,
}

fn default_files_mode() -> u32 {
    0o640
}

fn default_dirs_mode() -> u32 {
    0o750
}

fn default_sleep_time() -> f64 {
    30.0
}

/// Accept modes as integers (`0o640`) or octal strings (`"0640"`).
fn deserialize_mode<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMode {
        Int(u32),
        Str(String),
    }

    match RawMode::deserialize(deserializer)? {
        RawMode::Int(mode) => Ok(mode),
        RawMode::Str(s) => parse_octal_mode(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid octal mode '{}'", s))
        }),
    }
}

pub fn parse_octal_mode(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 8).ok()
}

fn deserialize_provider_options<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, toml::Value>::deserialize(deserializer)?;
    let mut options = BTreeMap::new();
    for (key, value) in raw {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "provider option '{}' must be a scalar, got {}",
                    key,
                    other.type_str()
                )));
            }
        };
        options.insert(key, value);
    }
    Ok(options)
}

impl CerthookToml {
    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration content
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: CerthookToml = toml::from_str(content)?;

        for certificate in &mut config.certificates {
            if certificate.name.trim().is_empty()
                && let Some(first) = certificate.domains.first()
            {
                certificate.name = matching::challenge_domain(first).to_string();
            }
        }

        let warnings = validate_certhook_toml(&config).into_result()?;
        for warning in warnings {
            tracing::warn!("{}", warning);
        }

        Ok(config)
    }

    /// Get a profile by name
    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Get the profile referenced by a certificate
    pub fn profile_for(&self, certificate: &Certificate) -> Result<&Profile> {
        self.get_profile(&certificate.profile)
            .ok_or_else(|| ConfigError::ProfileNotFound(certificate.profile.clone()))
    }

    /// Find the certificate managing a lineage
    pub fn find_certificate(
        &self,
        lineage: &str,
    ) -> std::result::Result<Option<&Certificate>, MatchError> {
        matching::find_certificate(&self.certificates, lineage)
    }

    /// Permissions to apply after deploy, if configured
    pub fn certs_permissions(&self) -> Option<&CertsPermissions> {
        self.acme.certs_permissions.as_ref()
    }
}

impl Certificate {
    /// Whether any of the certificate's domain patterns covers `domain`
    pub fn covers(&self, domain: &str) -> bool {
        self.domains
            .iter()
            .any(|pattern| matching::pattern_matches(pattern, domain))
    }

    pub fn pfx_export(&self) -> Option<&PfxExport> {
        self.pfx.as_ref().filter(|pfx| pfx.export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
[acme.certs_permissions]
files_mode = 0o666
dirs_mode = "0777"
user = "nobody"
group = "nogroup"

[[profiles]]
name = "dummy-profile"
provider = "dummy"
sleep_time = 0.1
provider_options = { auth_token = "TOKEN", port = 8053 }

[[certificates]]
name = "test.example.com"
domains = ["test.example.com"]
profile = "dummy-profile"
pfx = { export = true }

[[certificates.autocmd]]
cmd = "echo 'Hello World!'"
containers = ["foo", "bar"]

[[certificates.autorestart]]
containers = ["container1", "container2"]

[[certificates.autorestart]]
swarm_services = ["service1", "service2"]
"#;

    #[test]
    fn test_parse_full_config() {
        let config = CerthookToml::parse(FULL).unwrap();

        let perms = config.certs_permissions().unwrap();
        assert_eq!(perms.files_mode, 0o666);
        assert_eq!(perms.dirs_mode, 0o777);
        assert_eq!(perms.user.as_deref(), Some("nobody"));
        assert_eq!(perms.group.as_deref(), Some("nogroup"));

        let profile = config.get_profile("dummy-profile").unwrap();
        assert_eq!(profile.provider, "dummy");
        assert_eq!(profile.sleep_time, 0.1);
        assert_eq!(
            profile.provider_options.get("auth_token"),
            Some(&"TOKEN".to_string())
        );
        assert_eq!(profile.provider_options.get("port"), Some(&"8053".to_string()));

        let cert = &config.certificates[0];
        assert!(cert.pfx_export().is_some());
        assert_eq!(
            cert.autocmd[0].cmd,
            CommandSpec::Shell("echo 'Hello World!'".to_string())
        );
        assert_eq!(cert.autocmd[0].containers, vec!["foo", "bar"]);
        assert_eq!(cert.autorestart[0].containers, vec!["container1", "container2"]);
        assert!(cert.autorestart[0].swarm_services.is_empty());
        assert_eq!(cert.autorestart[1].swarm_services, vec!["service1", "service2"]);
    }

    #[test]
    fn test_defaults_applied() {
        let toml = r#"
[acme.certs_permissions]

[[profiles]]
name = "p"
provider = "cloudflare"

[[certificates]]
domains = ["*.example.com", "example.com"]
profile = "p"
"#;
        let config = CerthookToml::parse(toml).unwrap();
        let perms = config.certs_permissions().unwrap();
        assert_eq!(perms.files_mode, 0o640);
        assert_eq!(perms.dirs_mode, 0o750);
        assert_eq!(config.profiles[0].sleep_time, 30.0);
        assert!(config.profiles[0].ttl.is_none());
        assert_eq!(config.certificates[0].name, "example.com");
        assert!(config.certificates[0].pfx_export().is_none());
    }

    #[test]
    fn test_argv_command_parses() {
        let toml = r#"
[[profiles]]
name = "p"
provider = "dummy"

[[certificates]]
domains = ["example.com"]
profile = "p"

[[certificates.autocmd]]
cmd = ["nginx", "-s", "reload"]
containers = ["web"]
"#;
        let config = CerthookToml::parse(toml).unwrap();
        assert_eq!(
            config.certificates[0].autocmd[0].cmd,
            CommandSpec::Argv(vec![
                "nginx".to_string(),
                "-s".to_string(),
                "reload".to_string()
            ])
        );
    }

    #[test]
    fn test_invalid_mode_string_is_rejected() {
        let toml = r#"
[acme.certs_permissions]
files_mode = "rw-r--r--"
"#;
        let err = CerthookToml::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)), "unexpected: {err}");
    }

    #[test]
    fn test_nested_provider_option_is_rejected() {
        let toml = r#"
[[profiles]]
name = "p"
provider = "dummy"
provider_options = { nested = { a = 1 } }
"#;
        let err = CerthookToml::parse(toml).unwrap_err();
        assert!(err.to_string().contains("must be a scalar"), "unexpected: {err}");
    }

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_octal_mode("0640"), Some(0o640));
        assert_eq!(parse_octal_mode("0o750"), Some(0o750));
        assert_eq!(parse_octal_mode("755"), Some(0o755));
        assert_eq!(parse_octal_mode("0o"), None);
        assert_eq!(parse_octal_mode("0999"), None);
    }

    #[test]
    fn test_profile_for_unknown_profile() {
        let config = CerthookToml::default();
        let cert = Certificate {
            name: "x".to_string(),
            domains: vec!["x.example.com".to_string()],
            profile: "missing".to_string(),
            pfx: None,
            autocmd: Vec::new(),
            autorestart: Vec::new(),
        };
        let err = config.profile_for(&cert).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = CerthookToml::load_from_file(file.path()).unwrap();
        assert_eq!(config.certificates.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CerthookToml::load_from_file("/nonexistent/certhook.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_, _)));
    }
}
