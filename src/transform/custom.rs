use serde::Serialize;
use uuid::Uuid;

use super::string_ops::digits_only;

/// Closed set of `custom` transform behaviours. Free-text rules are classified once,
/// when the mapping specification is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomRule {
    PhoneE164,
    DeterministicId,
    Passthrough,
}

impl CustomRule {
    /// Accepts the structured tags (`phone_e164`, `deterministic_id`) as well as
    /// free-text descriptions such as "Standardize to E.164" or "Generate UUID".
    pub fn classify(rule: &str) -> Self {
        let lowered = rule.trim().to_ascii_lowercase();
        if lowered.contains("phone") || lowered.contains("e.164") || lowered.contains("e164") {
            CustomRule::PhoneE164
        } else if lowered.contains("uuid")
            || lowered.contains("deterministic")
            || lowered.contains("identifier")
        {
            CustomRule::DeterministicId
        } else {
            CustomRule::Passthrough
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CustomRule::PhoneE164 => "phone_e164",
            CustomRule::DeterministicId => "deterministic_id",
            CustomRule::Passthrough => "passthrough",
        }
    }
}

/// Version-5 UUID of `seed` in the DNS namespace; stable across runs and platforms.
pub fn deterministic_id(seed: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes()).to_string()
}

/// Seeds a deterministic identifier, optionally salted with a namespace so distinct
/// synthetic-key spaces never collide.
pub fn namespaced_id(namespace: Option<&str>, seed: &str) -> String {
    match namespace {
        Some(ns) => deterministic_id(&format!("{ns}_{seed}")),
        None => deterministic_id(seed),
    }
}

/// Formats a phone number as `+<digits>`, or `None` when the digit count does not
/// identify a country prefix.
pub fn phone_e164(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        n if n > 11 => Some(format!("+{digits}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_handles_free_text_rules() {
        assert_eq!(
            CustomRule::classify("Standardize phone to E.164"),
            CustomRule::PhoneE164
        );
        assert_eq!(
            CustomRule::classify("Generate UUID from customerId"),
            CustomRule::DeterministicId
        );
        assert_eq!(CustomRule::classify("deterministic_id"), CustomRule::DeterministicId);
        assert_eq!(CustomRule::classify("split full name"), CustomRule::Passthrough);
    }

    #[test]
    fn deterministic_id_is_uuid_v5_dns() {
        let id = deterministic_id("C1");
        assert_eq!(id, deterministic_id("C1"));
        assert_ne!(id, deterministic_id("C2"));
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn namespaced_id_salts_the_seed() {
        assert_eq!(
            namespaced_id(Some("loan accounts"), "A1"),
            deterministic_id("loan accounts_A1")
        );
        assert_eq!(namespaced_id(None, "A1"), deterministic_id("A1"));
    }

    #[test]
    fn phone_numbers_format_by_digit_count() {
        assert_eq!(phone_e164("5551234567").as_deref(), Some("+15551234567"));
        assert_eq!(phone_e164("1-555-123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(phone_e164("+44 20 7946 0958").as_deref(), Some("+442079460958"));
        assert_eq!(phone_e164("12345"), None);
        assert_eq!(phone_e164("25551234567"), None);
    }
}
