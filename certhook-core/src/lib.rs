//! Certhook Core - Configuration model and domain matching
//!
//! This crate holds the typed configuration consumed by the `certhook` binary:
//! DNS profiles, managed certificates and the global ACME settings, together with
//! the rules that map a certbot lineage or challenge domain onto a certificate.
//!
//! Everything that touches DNS providers, containers or the certificate archive
//! lives in the `certhook` crate.

pub mod config;
pub mod matching;
pub mod validation;

pub use config::*;
pub use matching::{
    MatchError, challenge_domain, challenge_record_name, find_certificate, pattern_matches,
};
