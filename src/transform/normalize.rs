//! Identifier normalization shared by the DOI and organization transformers.

use regex::Regex;
use std::sync::OnceLock;

use crate::constants::{prefixes, ror::BARE_ID_PATTERN};

/// Canonical `https://doi.org/` form of a DOI-like string.
///
/// Values that are not recognizably a DOI come back trimmed but otherwise
/// untouched, so normalizing twice gives the same result as normalizing once.
pub fn normalize_doi(value: &str) -> String {
    let value = value.trim();
    if value.starts_with(prefixes::DOI_RESOLVER) {
        value.to_string()
    } else if value.starts_with(prefixes::DOI_HOST) {
        format!("https://{value}")
    } else if value.starts_with(prefixes::DOI_DIRECTORY) {
        format!("{}{value}", prefixes::DOI_RESOLVER)
    } else {
        value.to_string()
    }
}

fn is_bare_ror_id(value: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(BARE_ID_PATTERN).ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}

/// Resolvable URL form of an organization identifier (ROR, GRID, ISNI or
/// Crossref funder DOI)
pub fn normalize_external_id(value: &str) -> String {
    let value = value.trim();
    let isni_path = prefixes::ISNI.trim_end_matches('/');
    if value.starts_with(prefixes::ROR) || value.starts_with(prefixes::DOI_RESOLVER) {
        value.to_string()
    } else if value.starts_with(prefixes::GRID_ID) {
        format!("{}{value}", prefixes::GRID)
    } else if value.starts_with(prefixes::ISNI_ID) {
        format!("{}{}", prefixes::ISNI, value.replace(' ', ""))
    } else if value.starts_with(prefixes::DOI_DIRECTORY) {
        format!("{}{value}", prefixes::DOI_RESOLVER)
    } else if is_bare_ror_id(value) {
        format!("{}{value}", prefixes::ROR)
    } else if value.starts_with(prefixes::ISNI_HOST) && !value.starts_with(isni_path) {
        value.replacen(prefixes::ISNI_HOST, isni_path, 1)
    } else {
        value.to_string()
    }
}
