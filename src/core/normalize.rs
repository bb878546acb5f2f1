use crate::domain::model::Identity;

/// Canonical identifier width shared by phones and national ids.
pub const IDENTITY_DIGITS: usize = 11;

fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Canonicalize a free-form phone string to its last 11 digits.
///
/// Anything shorter than 11 digits is unusable as a join key and becomes
/// absent. Longer inputs keep only the trailing 11 digits, which drops
/// country-code/area-code ambiguity: "+55 11 98765-4321" and
/// "(11) 98765-4321" normalize to the same key.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits = digits(raw);
    if digits.len() < IDENTITY_DIGITS {
        return None;
    }
    Some(digits[digits.len() - IDENTITY_DIGITS..].to_string())
}

/// Canonicalize a free-form national-id (CPF) string.
///
/// Ids are zero-left-padded to 11 digits, never truncated: an id with more
/// than 11 digits is not a valid document and becomes absent. The
/// asymmetry with `normalize_phone` (pad-left vs truncate-left) is
/// deliberate and load-bearing for the cross-source join.
pub fn normalize_national_id(raw: &str) -> Option<String> {
    let digits = digits(raw);
    if digits.is_empty() || digits.len() > IDENTITY_DIGITS {
        return None;
    }
    Some(format!("{:0>width$}", digits, width = IDENTITY_DIGITS))
}

/// Build a normalized identity from raw field values. Fields that fail
/// normalization are absent; no error path exists here.
pub fn identity(phone_raw: Option<&str>, national_id_raw: Option<&str>) -> Identity {
    Identity {
        phone: phone_raw.and_then(normalize_phone),
        national_id: national_id_raw.and_then(normalize_national_id),
    }
}
