//! Shared utilities: IPv4 prefixes and name validation.

pub mod ip_utils;
pub mod validation;

pub use ip_utils::Ipv4Prefix;
pub use validation::{find_duplicate, is_literal_name, validate_name};
