mod certhook_toml;
mod error;

pub use certhook_toml::*;
pub use error::*;
