//! Mapping of lineages and challenge domains onto configured certificates.

use thiserror::Error;

use crate::config::Certificate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("Lineage '{lineage}' matches several certificates: {}", .certificates.join(", "))]
    Ambiguous {
        lineage: String,
        certificates: Vec<String>,
    },
}

/// Strip the leading wildcard label and any trailing root dot.
pub fn challenge_domain(domain: &str) -> &str {
    let domain = domain.trim().trim_end_matches('.');
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// TXT record name used for the DNS-01 challenge of `domain`.
pub fn challenge_record_name(domain: &str) -> String {
    format!("_acme-challenge.{}.", challenge_domain(domain))
}

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Whether a certificate domain pattern covers `domain`.
///
/// `*.example.com` covers `www.example.com` and, because ACME clients drop the
/// wildcard label when asking for a DNS-01 challenge, `example.com` itself.
pub fn pattern_matches(pattern: &str, domain: &str) -> bool {
    let pattern = normalize(pattern);
    let domain = normalize(domain);

    if pattern == domain {
        return true;
    }

    let Some(base) = pattern.strip_prefix("*.") else {
        return false;
    };

    if domain == base {
        return true;
    }

    match domain.split_once('.') {
        Some((label, rest)) => !label.is_empty() && label != "*" && rest == base,
        None => false,
    }
}

/// Find the single certificate managing `lineage`.
///
/// A certificate named after the lineage always wins. Otherwise the lineage is
/// matched against every certificate's domain patterns, and more than one hit
/// is a configuration error.
pub fn find_certificate<'a>(
    certificates: &'a [Certificate],
    lineage: &str,
) -> Result<Option<&'a Certificate>, MatchError> {
    if let Some(named) = certificates.iter().find(|c| c.name == lineage) {
        return Ok(Some(named));
    }

    let matches: Vec<&Certificate> = certificates.iter().filter(|c| c.covers(lineage)).collect();

    match matches.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        _ => Err(MatchError::Ambiguous {
            lineage: lineage.to_string(),
            certificates: matches.iter().map(|c| c.name.clone()).collect(),
        }),
    }
}
