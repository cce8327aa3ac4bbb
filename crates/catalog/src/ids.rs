//! Identifier parsing and link token generation.

use uuid::{Uuid, Variant};

use crate::error::{CatalogError, Result};

/// Length of a hyphenated UUID in its canonical text form.
const CANONICAL_UUID_LEN: usize = 36;

/// Number of random UUIDs concatenated into one link token.
const LINK_TOKEN_PARTS: usize = 3;

/// Parses an entry identifier received from a caller.
///
/// Only the canonical hyphenated form is accepted, with an RFC 4122 variant
/// and a version between 1 and 5. Braced, URN and simple forms are rejected.
pub fn parse_entry_id(raw: &str) -> Result<Uuid> {
    let invalid = || CatalogError::InvalidArgument(format!("bad uuid: {raw:?}"));

    if raw.len() != CANONICAL_UUID_LEN {
        return Err(invalid());
    }
    let id = Uuid::parse_str(raw).map_err(|_| invalid())?;
    if id.get_variant() != Variant::RFC4122 {
        return Err(invalid());
    }
    match id.get_version_num() {
        1..=5 => Ok(id),
        _ => Err(invalid()),
    }
}

/// Parses a strictly positive integer query parameter such as a link's
/// `expires` minutes or `maxdownloads`.
pub fn parse_positive_int(field: &str, raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CatalogError::InvalidArgument(format!(
            "{field} must be a positive integer, got {raw:?}"
        ))),
    }
}

/// Generates an unguessable one-time link token.
///
/// Three v4 UUIDs with separators stripped: 96 lowercase hex characters.
pub fn generate_link_token() -> String {
    let mut token = String::with_capacity(LINK_TOKEN_PARTS * 32);
    for _ in 0..LINK_TOKEN_PARTS {
        token.push_str(&Uuid::new_v4().simple().to_string());
    }
    token
}
