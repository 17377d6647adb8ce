// 📞 Phone Normalizer - free-form sheet input → "+<country><subscriber>"
//
// Pipeline per number:
//   first line → digits (+ leading plus) → default country code
//   → fake-number heuristics → Saudi ranges or the generic number-plan check
//
// Rejections never fail a row; the caller nulls the field and moves on.
// Accepted output is a fixed point: normalizing it again returns it unchanged.

use crate::rules::RuleSet;
use phonenumber::country;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SAUDI_CODE: &str = "966";

// ============================================================================
// REJECTIONS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneRejection {
    #[error("no digits")]
    Empty,

    #[error("likely fake number ({0})")]
    LikelyFake(String),

    #[error("invalid Saudi phone number")]
    InvalidSaudi,

    #[error("not a valid international number")]
    InvalidInternational,
}

// ============================================================================
// GENERIC VALIDATION (collaborator seam)
// ============================================================================

/// International phone-number syntax check
pub trait PhoneValidator: Send + Sync {
    /// `number` is "+" and digits; `region_hint` is an ISO alpha-2 code used
    /// when the number carries no calling code
    fn validate(&self, number: &str, region_hint: Option<&str>) -> bool;
}

/// Default validator backed by libphonenumber metadata (`phonenumber` crate):
/// any ITU calling code, per-country number plans
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneNumberValidator;

impl PhoneValidator for PhoneNumberValidator {
    fn validate(&self, number: &str, region_hint: Option<&str>) -> bool {
        let region = region_hint
            .map(|r| r.trim().to_ascii_uppercase())
            .and_then(|r| r.parse::<country::Id>().ok());

        match phonenumber::parse(region, number) {
            Ok(parsed) => phonenumber::is_valid(&parsed),
            Err(_) => false,
        }
    }
}

// ============================================================================
// CLEANING
// ============================================================================

/// Digits and whether the input carried a leading "+" (or "00")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanNumber {
    pub international: bool,
    pub digits: String,
}

fn ascii_digit(ch: char) -> Option<char> {
    match ch {
        '0'..='9' => Some(ch),
        // Arabic-Indic and Extended Arabic-Indic digits
        '\u{0660}'..='\u{0669}' => char::from_digit(ch as u32 - 0x0660, 10),
        '\u{06F0}'..='\u{06F9}' => char::from_digit(ch as u32 - 0x06F0, 10),
        _ => None,
    }
}

/// First non-blank line, reduced to digits; a "+" before any digit marks the
/// number as international, as does a "00" access prefix
pub fn clean(raw: &str) -> Option<CleanNumber> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;

    let mut international = false;
    let mut digits = String::with_capacity(line.len());
    for ch in line.chars() {
        if let Some(d) = ascii_digit(ch) {
            digits.push(d);
        } else if ch == '+' && digits.is_empty() {
            international = true;
        }
    }

    if !international && digits.len() > 2 && digits.starts_with("00") {
        international = true;
        digits.drain(..2);
    }

    if digits.is_empty() {
        return None;
    }

    Some(CleanNumber {
        international,
        digits,
    })
}

/// Saudi mobile written locally: 5XXXXXXXX, optionally with a trunk 0
fn saudi_local_mobile(digits: &str) -> Option<&str> {
    let local = digits.strip_prefix('0').unwrap_or(digits);
    (local.len() == 9 && local.starts_with('5')).then_some(local)
}

// ============================================================================
// PHONE NORMALIZER
// ============================================================================

/// Accepted and rejected candidates from a multi-number cell, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhoneList {
    pub accepted: Vec<String>,
    pub rejected: Vec<(String, PhoneRejection)>,
}

pub struct PhoneNormalizer {
    rules: RuleSet,
    validator: Box<dyn PhoneValidator>,
}

impl PhoneNormalizer {
    pub fn new(rules: RuleSet) -> Self {
        PhoneNormalizer {
            rules,
            validator: Box::new(PhoneNumberValidator),
        }
    }

    /// Builder pattern: swap the generic validator
    pub fn with_validator(mut self, validator: Box<dyn PhoneValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Canonical "+<digits>" form, or why the input was rejected
    pub fn normalize(&self, raw: &str) -> Result<String, PhoneRejection> {
        let cleaned = clean(raw).ok_or(PhoneRejection::Empty)?;

        let digits = if cleaned.international {
            cleaned.digits
        } else if let Some(local) = saudi_local_mobile(&cleaned.digits) {
            format!("{}{}", SAUDI_CODE, local)
        } else {
            cleaned.digits
        };

        self.reject_fake(&digits)?;

        if digits.starts_with(SAUDI_CODE) {
            let canonical = self.validate_saudi(&digits)?;
            self.reject_fake(&canonical[1..])?;
            return Ok(canonical);
        }

        // Candidates always carry their calling code, so no region hint
        let candidate = format!("+{}", digits);
        if self.validator.validate(&candidate, None) {
            Ok(candidate)
        } else {
            Err(PhoneRejection::InvalidInternational)
        }
    }

    /// `normalize` with the reason dropped
    pub fn normalize_phone_like(&self, raw: &str) -> Option<String> {
        self.normalize(raw).ok()
    }

    fn reject_fake(&self, digits: &str) -> Result<(), PhoneRejection> {
        match self.rules.fake_number_rule(digits) {
            Some(rule) => Err(PhoneRejection::LikelyFake(rule.to_string())),
            None => Ok(()),
        }
    }

    /// Saudi number in any local or international spelling → "+966<subscriber>"
    pub fn validate_saudi(&self, value: &str) -> Result<String, PhoneRejection> {
        let mut digits: String = value.chars().filter_map(ascii_digit).collect();

        if digits.starts_with("00966") {
            digits.drain(..2);
        }
        if digits.starts_with("9660") {
            digits.remove(3);
        }

        let subscriber = if let Some(rest) = digits.strip_prefix(SAUDI_CODE) {
            rest
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest
        } else if digits.len() == 9 && digits.starts_with('5') {
            digits.as_str()
        } else {
            return Err(PhoneRejection::InvalidSaudi);
        };

        match self.rules.saudi_range(subscriber) {
            Some(_) => Ok(format!("+{}{}", SAUDI_CODE, subscriber)),
            None => Err(PhoneRejection::InvalidSaudi),
        }
    }

    /// Split a cell holding several numbers and normalize each one
    pub fn normalize_list(&self, raw: &str) -> PhoneList {
        let mut list = PhoneList::default();

        for candidate in raw.split([',', ';', '\n', '\r']) {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }

            match self.normalize(candidate) {
                Ok(number) => {
                    if !list.accepted.contains(&number) {
                        list.accepted.push(number);
                    }
                }
                Err(reason) => list.rejected.push((candidate.to_string(), reason)),
            }
        }

        list
    }
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        PhoneNormalizer::new(RuleSet::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PhoneNormalizer {
        PhoneNormalizer::default()
    }

    #[test]
    fn test_saudi_local_numbers_get_country_code() {
        let phones = normalizer();
        assert_eq!(phones.normalize_phone_like("0512345678").as_deref(), Some("+966512345678"));
        assert_eq!(phones.normalize_phone_like("512345678").as_deref(), Some("+966512345678"));
        assert_eq!(phones.normalize_phone_like("050 123 4567").as_deref(), Some("+966501234567"));
    }

    #[test]
    fn test_saudi_international_spellings() {
        let phones = normalizer();
        for raw in ["+966 50 123 4567", "966501234567", "+9660501234567", "00966501234567", "++966501234567"] {
            assert_eq!(
                phones.normalize_phone_like(raw).as_deref(),
                Some("+966501234567"),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_fake_numbers_are_rejected() {
        let phones = normalizer();
        assert_eq!(
            phones.normalize("5555555555"),
            Err(PhoneRejection::LikelyFake("repeated_digits".to_string()))
        );
        assert!(matches!(phones.normalize("+1 123 456 7890"), Err(PhoneRejection::LikelyFake(_))));
        assert!(matches!(phones.normalize("0506000000"), Err(PhoneRejection::LikelyFake(_))));
        assert!(matches!(phones.normalize("+971 55 300 0000"), Err(PhoneRejection::LikelyFake(_))));
    }

    #[test]
    fn test_repeated_saudi_subscriber_is_fake() {
        let phones = normalizer();
        for raw in ["0555555555", "555555555", "+966 555 555 555", "00966555555555"] {
            assert_eq!(
                phones.normalize(raw),
                Err(PhoneRejection::LikelyFake("repeated_digits".to_string())),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_saudi_ranges_are_enforced() {
        let phones = normalizer();
        assert_eq!(phones.normalize("+966521234567"), Err(PhoneRejection::InvalidSaudi));
        assert_eq!(phones.normalize("+96651234"), Err(PhoneRejection::InvalidSaudi));
        assert_eq!(phones.normalize_phone_like("+966112345678").as_deref(), Some("+966112345678"));
        assert_eq!(phones.normalize_phone_like("+966570123456").as_deref(), Some("+966570123456"));
    }

    #[test]
    fn test_nanp_numbers() {
        let phones = normalizer();
        // Exchange code 123 cannot start with 1
        assert_eq!(phones.normalize("+1 555 123 4567"), Err(PhoneRejection::InvalidInternational));
        assert_eq!(phones.normalize_phone_like("+1 415 555 2671").as_deref(), Some("+14155552671"));
        assert_eq!(phones.normalize_phone_like("1 (415) 555-2671").as_deref(), Some("+14155552671"));
    }

    #[test]
    fn test_generic_international_numbers() {
        let phones = normalizer();
        assert_eq!(phones.normalize_phone_like("+971 4 222 3333").as_deref(), Some("+97142223333"));
        assert_eq!(phones.normalize_phone_like("+44 20 7946 0958").as_deref(), Some("+442079460958"));
        assert_eq!(phones.normalize("+999 1234 5678"), Err(PhoneRejection::InvalidInternational));
        assert_eq!(phones.normalize("+971 4 22"), Err(PhoneRejection::InvalidInternational));
        assert_eq!(phones.normalize("+12345678901234567"), Err(PhoneRejection::InvalidInternational));
    }

    #[test]
    fn test_only_first_line_is_used() {
        let phones = normalizer();
        assert_eq!(
            phones.normalize_phone_like("0512345678\n0598765432").as_deref(),
            Some("+966512345678")
        );
        assert_eq!(phones.normalize("n/a"), Err(PhoneRejection::Empty));
        assert_eq!(phones.normalize(""), Err(PhoneRejection::Empty));
    }

    #[test]
    fn test_arabic_indic_digits() {
        let phones = normalizer();
        assert_eq!(
            phones.normalize_phone_like("٠٥١٢٣٤٥٦٧٨").as_deref(),
            Some("+966512345678")
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let phones = normalizer();
        for raw in [
            "0512345678",
            "+9660501234567",
            "+1 415 555 2671",
            "+971 4 222 3333",
            "00 44 20 7946 0958",
            "0112345678",
        ] {
            if let Some(first) = phones.normalize_phone_like(raw) {
                assert_eq!(phones.normalize_phone_like(&first), Some(first.clone()), "{}", raw);
            }
        }
    }

    #[test]
    fn test_normalize_list_keeps_order_and_drops_duplicates() {
        let phones = normalizer();
        let list = phones.normalize_list("0512345678, 5555555555; +971 4 222 3333\n0512345678,,");

        assert_eq!(list.accepted, vec!["+966512345678", "+97142223333"]);
        assert_eq!(list.rejected.len(), 1);
        assert_eq!(list.rejected[0].0, "5555555555");
    }

    #[test]
    fn test_custom_validator_is_used_outside_saudi() {
        struct AcceptAll;
        impl PhoneValidator for AcceptAll {
            fn validate(&self, _number: &str, _region_hint: Option<&str>) -> bool {
                true
            }
        }

        let phones = normalizer().with_validator(Box::new(AcceptAll));
        assert_eq!(phones.normalize_phone_like("+999 1234 5678").as_deref(), Some("+99912345678"));
        // Saudi numbers still go through the range table
        assert_eq!(phones.normalize("+966521234567"), Err(PhoneRejection::InvalidSaudi));
    }

    #[test]
    fn test_numbers_from_every_region_are_accepted() {
        let phones = normalizer();
        for (raw, expected) in [
            ("+233 24 123 4567", "+233241234567"),
            ("+420 601 123 456", "+420601123456"),
            ("+359 88 123 4567", "+359881234567"),
            ("+252 61 234 5678", "+252612345678"),
            ("+995 555 12 34 56", "+995555123456"),
            ("0044 20 7946 0958", "+442079460958"),
        ] {
            assert_eq!(phones.normalize(raw).as_deref(), Ok(expected), "{}", raw);
        }
    }

    #[test]
    fn test_phone_number_validator_region_hint() {
        let validator = PhoneNumberValidator;
        assert!(validator.validate("+971501234567", None));
        assert!(validator.validate("0501234567", Some("ae")));
        assert!(!validator.validate("0501234567", None));
        assert!(!validator.validate("0501234567", Some("not-a-region")));
    }
}
