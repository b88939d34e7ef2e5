//! DNS backend driven through the `lexicon` CLI.

use super::provider::{DnsProvider, ProviderError, RecordRequest};
use crate::exec::{CommandRunner, Invocation};

const LEXICON_BIN: &str = "lexicon";

/// Environment variable lexicon reads for a provider option.
///
/// `cloudflare` + `auth_token` -> `LEXICON_CLOUDFLARE_AUTH_TOKEN`
pub fn option_env_var(provider: &str, option: &str) -> String {
    fn env_part(value: &str) -> String {
        value
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' => c.to_ascii_uppercase(),
                _ => '_',
            })
            .collect()
    }

    format!("LEXICON_{}_{}", env_part(provider), env_part(option))
}

/// Provider options travel as environment variables so credentials stay off
/// the process list.
pub struct LexiconProvider<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
}

impl<'a> LexiconProvider<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            program: LEXICON_BIN.to_string(),
        }
    }

    pub fn invocation(&self, request: &RecordRequest) -> Invocation {
        let mut invocation = Invocation::new(&self.program);

        if let Some(delegated) = &request.delegated {
            invocation = invocation.arg(format!("--delegated={}", delegated));
        }

        // `=` form: validation tokens may start with '-'.
        invocation = invocation
            .args([
                request.provider_name.as_str(),
                request.action.as_str(),
                request.domain.as_str(),
                request.record_type.as_str(),
            ])
            .arg(format!("--name={}", request.name))
            .arg(format!("--content={}", request.content));

        if let Some(ttl) = request.ttl {
            invocation = invocation.arg(format!("--ttl={}", ttl));
        }

        for (key, value) in &request.provider_options {
            invocation = invocation.env(option_env_var(&request.provider_name, key), value);
        }

        invocation
    }
}

impl DnsProvider for LexiconProvider<'_> {
    fn resolve(&self, request: &RecordRequest) -> Result<(), ProviderError> {
        let invocation = self.invocation(request);
        self.runner
            .run(&invocation)
            .map_err(|source| ProviderError::Command {
                provider: request.provider_name.clone(),
                action: request.action,
                name: request.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::provider::RecordAction;
    use crate::exec::testing::RecordingRunner;
    use std::collections::BTreeMap;

    fn request() -> RecordRequest {
        RecordRequest {
            action: RecordAction::Create,
            domain: "test.example.com".to_string(),
            record_type: "TXT".to_string(),
            name: "_acme-challenge.test.example.com.".to_string(),
            content: "-VALIDATION".to_string(),
            provider_name: "dummy".to_string(),
            provider_options: BTreeMap::from([("auth_token".to_string(), "TOKEN".to_string())]),
            ttl: None,
            delegated: None,
        }
    }

    #[test]
    fn option_env_var_is_upper_snake_case() {
        assert_eq!(
            option_env_var("dummy", "auth_token"),
            "LEXICON_DUMMY_AUTH_TOKEN"
        );
        assert_eq!(
            option_env_var("route53", "auth-access-key"),
            "LEXICON_ROUTE53_AUTH_ACCESS_KEY"
        );
    }

    #[test]
    fn invocation_carries_record_and_options() {
        let runner = RecordingRunner::new();
        let inv = LexiconProvider::new(&runner).invocation(&request());
        assert_eq!(inv.program, "lexicon");
        assert_eq!(
            inv.args,
            vec![
                "dummy",
                "create",
                "test.example.com",
                "TXT",
                "--name=_acme-challenge.test.example.com.",
                "--content=-VALIDATION",
            ]
        );
        assert_eq!(
            inv.envs,
            vec![("LEXICON_DUMMY_AUTH_TOKEN".to_string(), "TOKEN".to_string())]
        );
    }

    #[test]
    fn invocation_with_ttl_and_delegation() {
        let runner = RecordingRunner::new();
        let mut req = request();
        req.action = RecordAction::Delete;
        req.ttl = Some(120);
        req.delegated = Some("sub.example.com".to_string());

        let inv = LexiconProvider::new(&runner).invocation(&req);
        assert_eq!(inv.args[0], "--delegated=sub.example.com");
        assert_eq!(inv.args[2], "delete");
        assert_eq!(inv.args.last().map(String::as_str), Some("--ttl=120"));
    }

    #[test]
    fn runner_failure_becomes_provider_error() {
        let runner = RecordingRunner::failing_on(&["dummy"]);
        let err = LexiconProvider::new(&runner).resolve(&request()).unwrap_err();
        assert!(err.to_string().contains("Provider 'dummy' failed to create"));
        assert_eq!(runner.calls.borrow().len(), 1);
    }
}
