//! Drift classification rules
//!
//! Each rule handles one kind of evidence and decides how severe it is.
//! Code comparisons use a character-level similarity ratio.

use super::{DriftEvidence, DriftSeverity, DriftType};

/// Below this similarity diverged code is critical
const CRITICAL_SIMILARITY: f64 = 0.3;
/// Below this similarity diverged code is a warning
const WARNING_SIMILARITY: f64 = 0.7;
/// Days without an update before a stale doc is a warning
const STALE_WARNING_DAYS: i64 = 90;
/// Days without an update before a stale doc is critical
const STALE_CRITICAL_DAYS: i64 = 180;

/// Severity and description chosen for a piece of evidence
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub severity: DriftSeverity,
    pub description: String,
}

/// Trait for drift classification rules
pub trait DriftRule: Send + Sync {
    /// Rule name
    fn name(&self) -> &str;

    /// The drift type this rule classifies
    fn drift_type(&self) -> DriftType;

    /// Classify the evidence, or `None` if it is not for this rule
    fn classify(&self, evidence: &DriftEvidence) -> Option<Classification>;
}

/// The rule set applied to every observation
pub struct DriftRules {
    rules: Vec<Box<dyn DriftRule>>,
}

impl DriftRules {
    /// Create the default rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(CodeDivergedRule),
                Box::new(MissingDocRule),
                Box::new(StaleDocRule),
                Box::new(PatternViolationRule),
            ],
        }
    }

    /// Classify evidence with the first rule for its drift type that
    /// accepts it
    pub fn classify(&self, evidence: &DriftEvidence) -> Classification {
        let drift_type = evidence.drift_type();
        for rule in self.rules.iter().filter(|r| r.drift_type() == drift_type) {
            if let Some(classification) = rule.classify(evidence) {
                tracing::debug!(
                    rule = rule.name(),
                    severity = %classification.severity,
                    "drift classified"
                );
                return classification;
            }
        }

        Classification {
            severity: DriftSeverity::Warning,
            description: format!("Unclassified {} evidence", drift_type),
        }
    }
}

impl Default for DriftRules {
    fn default() -> Self {
        Self::new()
    }
}

/// Character-level similarity of two code fragments, ignoring whitespace
/// layout. 1.0 means identical.
pub fn pattern_similarity(expected: &str, actual: &str) -> f64 {
    let expected = normalize_whitespace(expected);
    let actual = normalize_whitespace(actual);
    if expected.is_empty() && actual.is_empty() {
        return 1.0;
    }
    similar::TextDiff::from_chars(expected.as_str(), actual.as_str()).ratio() as f64
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn preview(text: &str) -> String {
    let flat = normalize_whitespace(text);
    match flat.char_indices().nth(60) {
        Some((byte, _)) => format!("{}...", &flat[..byte]),
        None => flat,
    }
}

// ==================== Rules ====================

/// Code no longer resembles the documented pattern
struct CodeDivergedRule;

impl DriftRule for CodeDivergedRule {
    fn name(&self) -> &str {
        "code_diverged"
    }

    fn drift_type(&self) -> DriftType {
        DriftType::CodeDiverged
    }

    fn classify(&self, evidence: &DriftEvidence) -> Option<Classification> {
        let DriftEvidence::CodeDiverged {
            expected_pattern,
            actual_code,
        } = evidence
        else {
            return None;
        };

        let similarity = pattern_similarity(expected_pattern, actual_code);
        let severity = if similarity < CRITICAL_SIMILARITY {
            DriftSeverity::Critical
        } else if similarity < WARNING_SIMILARITY {
            DriftSeverity::Warning
        } else {
            DriftSeverity::Info
        };

        Some(Classification {
            severity,
            description: format!(
                "Code diverged from documented pattern ({:.0}% similar)",
                similarity * 100.0
            ),
        })
    }
}

/// Code without documentation
struct MissingDocRule;

impl DriftRule for MissingDocRule {
    fn name(&self) -> &str {
        "missing_doc"
    }

    fn drift_type(&self) -> DriftType {
        DriftType::MissingDoc
    }

    fn classify(&self, evidence: &DriftEvidence) -> Option<Classification> {
        let DriftEvidence::MissingDoc { symbol, is_public } = evidence else {
            return None;
        };

        let severity = if *is_public {
            DriftSeverity::Critical
        } else {
            DriftSeverity::Warning
        };
        let description = match symbol {
            Some(name) if *is_public => format!("Public symbol `{}` is undocumented", name),
            Some(name) => format!("Symbol `{}` is undocumented", name),
            None => "Code is undocumented".to_string(),
        };

        Some(Classification {
            severity,
            description,
        })
    }
}

/// Documentation left untouched for too long
struct StaleDocRule;

impl DriftRule for StaleDocRule {
    fn name(&self) -> &str {
        "stale_doc"
    }

    fn drift_type(&self) -> DriftType {
        DriftType::StaleDoc
    }

    fn classify(&self, evidence: &DriftEvidence) -> Option<Classification> {
        let DriftEvidence::StaleDoc { days_since_update } = evidence else {
            return None;
        };

        let severity = if *days_since_update >= STALE_CRITICAL_DAYS {
            DriftSeverity::Critical
        } else if *days_since_update >= STALE_WARNING_DAYS {
            DriftSeverity::Warning
        } else {
            DriftSeverity::Info
        };

        Some(Classification {
            severity,
            description: format!("Documentation not updated for {} days", days_since_update),
        })
    }
}

/// Code breaks a rule the documentation states
struct PatternViolationRule;

impl DriftRule for PatternViolationRule {
    fn name(&self) -> &str {
        "pattern_violation"
    }

    fn drift_type(&self) -> DriftType {
        DriftType::PatternViolation
    }

    fn classify(&self, evidence: &DriftEvidence) -> Option<Classification> {
        let DriftEvidence::PatternViolation {
            expected_pattern,
            actual_code,
        } = evidence
        else {
            return None;
        };

        let expected = normalize_whitespace(expected_pattern);
        let absent = !normalize_whitespace(actual_code).contains(&expected);
        let severity = if absent {
            DriftSeverity::Critical
        } else {
            DriftSeverity::Warning
        };
        let description = if absent {
            format!("Expected pattern `{}` is missing", preview(expected_pattern))
        } else {
            format!(
                "Code uses pattern `{}` in a way the docs do not allow",
                preview(expected_pattern)
            )
        };

        Some(Classification {
            severity,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(evidence: DriftEvidence) -> Classification {
        DriftRules::new().classify(&evidence)
    }

    #[test]
    fn test_code_diverged_thresholds() {
        let identical = classify(DriftEvidence::CodeDiverged {
            expected_pattern: "verify_jwt(token, &keys)?".to_string(),
            actual_code: "verify_jwt(token,  &keys)?".to_string(),
        });
        assert_eq!(identical.severity, DriftSeverity::Info);

        let unrelated = classify(DriftEvidence::CodeDiverged {
            expected_pattern: "verify_jwt(token, &keys)?".to_string(),
            actual_code: "TODO: 42".to_string(),
        });
        assert_eq!(unrelated.severity, DriftSeverity::Critical);
    }

    #[test]
    fn test_missing_doc_public_is_critical() {
        let public = classify(DriftEvidence::MissingDoc {
            symbol: Some("authorize".to_string()),
            is_public: true,
        });
        assert_eq!(public.severity, DriftSeverity::Critical);
        assert!(public.description.contains("authorize"));

        let private = classify(DriftEvidence::MissingDoc {
            symbol: None,
            is_public: false,
        });
        assert_eq!(private.severity, DriftSeverity::Warning);
    }

    #[test]
    fn test_stale_doc_thresholds() {
        let severity = |days| classify(DriftEvidence::StaleDoc { days_since_update: days }).severity;
        assert_eq!(severity(10), DriftSeverity::Info);
        assert_eq!(severity(89), DriftSeverity::Info);
        assert_eq!(severity(90), DriftSeverity::Warning);
        assert_eq!(severity(179), DriftSeverity::Warning);
        assert_eq!(severity(180), DriftSeverity::Critical);
    }

    #[test]
    fn test_pattern_violation_absent_pattern() {
        let absent = classify(DriftEvidence::PatternViolation {
            expected_pattern: "with_retry(".to_string(),
            actual_code: "client.send(req).await".to_string(),
        });
        assert_eq!(absent.severity, DriftSeverity::Critical);

        let present = classify(DriftEvidence::PatternViolation {
            expected_pattern: "with_retry(".to_string(),
            actual_code: "with_retry(|| client.send(req), 0)".to_string(),
        });
        assert_eq!(present.severity, DriftSeverity::Warning);
    }

    #[test]
    fn test_pattern_similarity_bounds() {
        assert_eq!(pattern_similarity("", ""), 1.0);
        assert_eq!(pattern_similarity("a b", "a   b"), 1.0);
        assert!(pattern_similarity("abc", "xyz") < CRITICAL_SIMILARITY);
    }

    #[test]
    fn test_every_type_has_a_rule() {
        let rules = DriftRules::new();
        let types: Vec<DriftType> = rules.rules.iter().map(|r| r.drift_type()).collect();
        for drift_type in [
            DriftType::CodeDiverged,
            DriftType::MissingDoc,
            DriftType::StaleDoc,
            DriftType::PatternViolation,
        ] {
            assert!(types.contains(&drift_type));
        }
    }

    #[test]
    fn test_rules_only_see_their_own_type() {
        let rules = DriftRules {
            rules: vec![Box::new(StaleDocRule)],
        };
        let classification = rules.classify(&DriftEvidence::MissingDoc {
            symbol: Some("parse".to_string()),
            is_public: true,
        });
        assert_eq!(classification.severity, DriftSeverity::Warning);
        assert!(classification.description.starts_with("Unclassified"));
    }
}
