// 🏷️ Validation Rules - Rules as Data
//
// Fake-number heuristics, Saudi numbering ranges and the email pattern live in
// one serializable table. The built-in table can be replaced by a JSON file;
// `RuleSet` compiles it once so the normalizers never touch raw patterns.

use crate::error::Result;
use anyhow::Context as AnyhowContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Rule ID for tracking (shows up in degradation reasons)
    pub id: String,

    /// Regex matched against the whole value (anchors are added)
    pub pattern: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl PatternRule {
    pub fn new(id: &str, pattern: &str, description: &str) -> Self {
        PatternRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// Placeholder subscriber shapes behind a country calling code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderRule {
    pub calling_code: String,
    pub rule: PatternRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeNumberRules {
    /// Numbers made of one repeated digit at least this long are fake
    pub min_repeated_digits: usize,

    /// Literal test numbers (digits only)
    pub literal_numbers: Vec<String>,

    /// Prefixes that make a literal look international ("1", "15", ...)
    pub literal_prefixes: Vec<String>,

    pub placeholders: Vec<PlaceholderRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaudiRules {
    /// Valid subscriber ranges (digits after 966)
    pub ranges: Vec<PatternRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub fake_numbers: FakeNumberRules,
    pub saudi: SaudiRules,
    pub email_pattern: String,

    /// Dropdown placeholder left in spreadsheet templates
    pub blank_sentinel: String,
}

impl Default for ValidationRules {
    fn default() -> Self {
        let placeholders = ["966", "971"]
            .iter()
            .flat_map(|code| {
                vec![
                    PlaceholderRule {
                        calling_code: code.to_string(),
                        rule: PatternRule::new(
                            "placeholder_5x_zeros",
                            r"5[05]\d0{6}",
                            "50X000000 / 55X000000",
                        ),
                    },
                    PlaceholderRule {
                        calling_code: code.to_string(),
                        rule: PatternRule::new(
                            "placeholder_trailing_zeros",
                            r"\d*0{6}",
                            "subscriber part ending in six zeros",
                        ),
                    },
                ]
            })
            .collect();

        ValidationRules {
            fake_numbers: FakeNumberRules {
                min_repeated_digits: 8,
                literal_numbers: vec![
                    "1234567890".to_string(),
                    "1111111111".to_string(),
                    "0000000000".to_string(),
                    "9999999999".to_string(),
                ],
                literal_prefixes: vec![
                    "1".to_string(),
                    "15".to_string(),
                    "19".to_string(),
                ],
                placeholders,
            },
            saudi: SaudiRules {
                ranges: vec![
                    PatternRule::new("sa_mobile", r"5[0345689]\d{7,8}", "Mobile numbers"),
                    PatternRule::new("sa_landline", r"1[0123467]\d{7}", "Landlines"),
                    PatternRule::new("sa_nomadic", r"811\d{7}", "GO nomadic numbers"),
                    PatternRule::new("sa_mvno", r"57[01245678]\d{6}", "MVNOs"),
                    PatternRule::new("sa_salam", r"51\d{7}", "Salam Mobile"),
                ],
            },
            email_pattern: r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}".to_string(),
            blank_sentinel: "select".to_string(),
        }
    }
}

impl ValidationRules {
    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: ValidationRules =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(rules)
    }
}

// ============================================================================
// COMPILED RULE SET
// ============================================================================

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    regex: Regex,
}

impl CompiledRule {
    fn compile(rule: &PatternRule) -> Result<Self> {
        Ok(CompiledRule {
            id: rule.id.clone(),
            regex: anchored(&rule.pattern)?,
        })
    }
}

/// Longest calling code; a trunk zero is a one-digit prefix
const MAX_PREFIX_DIGITS: usize = 3;

fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    min_repeated_digits: usize,
    literal_fakes: Vec<String>,
    placeholders: Vec<(String, CompiledRule)>,
    saudi_ranges: Vec<CompiledRule>,
    email: Regex,
    blank_sentinel: String,
}

impl RuleSet {
    pub fn compile(rules: &ValidationRules) -> Result<Self> {
        let fakes = &rules.fake_numbers;

        let mut literal_fakes = fakes.literal_numbers.clone();
        for prefix in &fakes.literal_prefixes {
            for number in &fakes.literal_numbers {
                literal_fakes.push(format!("{}{}", prefix, number));
            }
        }

        let placeholders = fakes
            .placeholders
            .iter()
            .map(|p| -> Result<(String, CompiledRule)> {
                Ok((p.calling_code.clone(), CompiledRule::compile(&p.rule)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let saudi_ranges = rules
            .saudi
            .ranges
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(RuleSet {
            min_repeated_digits: fakes.min_repeated_digits,
            literal_fakes,
            placeholders,
            saudi_ranges,
            email: anchored(&rules.email_pattern)?,
            blank_sentinel: rules.blank_sentinel.trim().to_lowercase(),
        })
    }

    /// ID of the first fake-number rule matching these digits
    pub fn fake_number_rule(&self, digits: &str) -> Option<&str> {
        if self.is_repeated_run(digits) {
            return Some("repeated_digits");
        }

        if self.literal_fakes.iter().any(|fake| fake == digits) {
            return Some("literal_test_number");
        }

        self.placeholders
            .iter()
            .find(|(code, rule)| {
                digits
                    .strip_prefix(code.as_str())
                    .map_or(false, |subscriber| rule.regex.is_match(subscriber))
            })
            .map(|(_, rule)| rule.id.as_str())
    }

    /// One digit repeated, either across the whole number or across the
    /// subscriber part behind a calling code or trunk zero
    fn is_repeated_run(&self, digits: &str) -> bool {
        (0..=MAX_PREFIX_DIGITS)
            .filter_map(|skip| digits.get(skip..))
            .any(|rest| rest.len() >= self.min_repeated_digits && is_single_digit_run(rest))
    }

    pub fn is_likely_fake(&self, digits: &str) -> bool {
        self.fake_number_rule(digits).is_some()
    }

    /// ID of the Saudi range this subscriber part belongs to
    pub fn saudi_range(&self, subscriber: &str) -> Option<&str> {
        self.saudi_ranges
            .iter()
            .find(|rule| rule.regex.is_match(subscriber))
            .map(|rule| rule.id.as_str())
    }

    pub fn is_valid_email(&self, email: &str) -> bool {
        self.email.is_match(email)
    }

    /// Blank, or the dropdown placeholder ("Select"), compared trimmed and case-insensitively
    pub fn is_blank_choice(&self, value: Option<&str>) -> bool {
        match value.map(str::trim) {
            None => true,
            Some(v) if v.is_empty() => true,
            Some(v) => v.to_lowercase() == self.blank_sentinel,
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::compile(&ValidationRules::default())
            .expect("built-in validation rules are valid patterns")
    }
}

fn is_single_digit_run(digits: &str) -> bool {
    let mut chars = digits.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_digits() {
        let rules = RuleSet::default();
        assert_eq!(rules.fake_number_rule("5555555555"), Some("repeated_digits"));
        assert_eq!(rules.fake_number_rule("55555555"), Some("repeated_digits"));
        assert_eq!(rules.fake_number_rule("5555555"), None);
    }

    #[test]
    fn test_repeated_subscriber_behind_prefix() {
        let rules = RuleSet::default();
        assert_eq!(rules.fake_number_rule("0555555555"), Some("repeated_digits"));
        assert_eq!(rules.fake_number_rule("966555555555"), Some("repeated_digits"));
        assert_eq!(rules.fake_number_rule("12222222222"), Some("repeated_digits"));
        assert_eq!(rules.fake_number_rule("9665555555"), None);
        assert_eq!(rules.fake_number_rule("966512345678"), None);
    }

    #[test]
    fn test_literal_test_numbers_and_prefixed_variants() {
        let rules = RuleSet::default();
        for number in ["1234567890", "11234567890", "151234567890", "199999999999"] {
            assert!(rules.is_likely_fake(number), "{} should be fake", number);
        }
        assert!(!rules.is_likely_fake("14155552671"));
    }

    #[test]
    fn test_placeholder_subscribers() {
        let rules = RuleSet::default();
        assert_eq!(rules.fake_number_rule("966506000000"), Some("placeholder_5x_zeros"));
        assert_eq!(rules.fake_number_rule("971553000000"), Some("placeholder_5x_zeros"));
        assert_eq!(rules.fake_number_rule("966112000000"), Some("placeholder_trailing_zeros"));
        assert_eq!(rules.fake_number_rule("966512345678"), None);
        // Same subscriber shape without a known calling code is not flagged here
        assert_eq!(rules.fake_number_rule("44506000000"), None);
    }

    #[test]
    fn test_saudi_ranges() {
        let rules = RuleSet::default();
        assert_eq!(rules.saudi_range("501234567"), Some("sa_mobile"));
        assert_eq!(rules.saudi_range("5012345678"), Some("sa_mobile"));
        assert_eq!(rules.saudi_range("112345678"), Some("sa_landline"));
        assert_eq!(rules.saudi_range("8111234567"), Some("sa_nomadic"));
        assert_eq!(rules.saudi_range("570123456"), Some("sa_mvno"));
        assert_eq!(rules.saudi_range("512345678"), Some("sa_salam"));
        assert_eq!(rules.saudi_range("521234567"), None);
        assert_eq!(rules.saudi_range("151234567"), None);
    }

    #[test]
    fn test_email_pattern() {
        let rules = RuleSet::default();
        assert!(rules.is_valid_email("John@Example.com"));
        assert!(rules.is_valid_email("first.last+tag@sub.example.co"));
        assert!(!rules.is_valid_email("john@example"));
        assert!(!rules.is_valid_email("john@example.c"));
        assert!(!rules.is_valid_email(" john@example.com"));
    }

    #[test]
    fn test_blank_choice() {
        let rules = RuleSet::default();
        for value in [None, Some(""), Some("  "), Some("Select"), Some("SELECT"), Some(" select ")] {
            assert!(rules.is_blank_choice(value), "{:?} should be blank", value);
        }
        assert!(!rules.is_blank_choice(Some("Selection")));
    }

    #[test]
    fn test_rules_round_trip_through_json_file() {
        let mut rules = ValidationRules::default();
        rules.fake_numbers.literal_numbers.push("5012345678".to_string());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, serde_json::to_string_pretty(&rules).unwrap()).unwrap();

        let loaded = ValidationRules::from_file(&path).unwrap();
        assert_eq!(loaded, rules);

        let compiled = RuleSet::compile(&loaded).unwrap();
        assert!(compiled.is_likely_fake("5012345678"));
        assert!(compiled.is_likely_fake("155012345678"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut rules = ValidationRules::default();
        rules.saudi.ranges.push(PatternRule::new("broken", "5[", "unterminated"));
        assert!(RuleSet::compile(&rules).is_err());
    }
}
