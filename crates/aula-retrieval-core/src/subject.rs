//! Filename-based subject classification.
//!
//! Subjects are assigned by an ordered rule table: the first rule with a
//! keyword contained in the lower-cased filename wins, and files matching no
//! rule get the default label. New subjects are new rows, not new code.

use serde::Deserialize;

pub const DEFAULT_SUBJECT: &str = "general";

/// One row of the rule table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SubjectRule {
    /// Lower-case substrings; any one of them matching selects `label`.
    pub keywords: Vec<String>,
    pub label: String,
}

impl SubjectRule {
    pub fn new(keywords: &[&str], label: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            label: label.to_string(),
        }
    }

    fn matches(&self, filename_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && filename_lower.contains(k.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct SubjectClassifier {
    rules: Vec<SubjectRule>,
    default_label: String,
}

impl SubjectClassifier {
    pub fn new(rules: Vec<SubjectRule>, default_label: impl Into<String>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| SubjectRule {
                keywords: r.keywords.iter().map(|k| k.to_lowercase()).collect(),
                label: r.label,
            })
            .collect();
        Self {
            rules,
            default_label: default_label.into(),
        }
    }

    pub fn classify(&self, filename: &str) -> &str {
        let lower = filename.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lower))
            .map(|r| r.label.as_str())
            .unwrap_or(&self.default_label)
    }

    pub fn rules(&self) -> &[SubjectRule] {
        &self.rules
    }
}

impl Default for SubjectClassifier {
    fn default() -> Self {
        Self::new(default_rules(), DEFAULT_SUBJECT)
    }
}

/// Rules for the school subjects of the bundled corpus.
pub fn default_rules() -> Vec<SubjectRule> {
    vec![
        SubjectRule::new(&["natural", "ciencia"], "ciencias_naturales"),
        SubjectRule::new(&["social"], "ciencias_sociales"),
        SubjectRule::new(&["mate"], "matematicas"),
        SubjectRule::new(&["espa"], "espanol"),
        SubjectRule::new(&["ingl"], "ingles"),
    ]
}
