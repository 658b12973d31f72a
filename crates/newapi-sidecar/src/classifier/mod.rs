mod rules;
mod templates;

pub use rules::{default_rules, Pattern, SignatureRule};
pub use templates::{template, DiagnosisTemplate, Locale};

use newapi_types::{Diagnosis, ErrorCategory, DEFAULT_PORT};

/// Maps backend stderr to a [`Diagnosis`] by testing an ordered list of
/// signature rules. The first matching rule wins.
#[derive(Clone, Debug)]
pub struct ErrorClassifier {
    rules: Vec<SignatureRule>,
    locale: Locale,
    port: u16,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

impl ErrorClassifier {
    pub fn new(port: u16) -> Self {
        Self {
            rules: default_rules(),
            locale: Locale::default(),
            port,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Appends a rule at the lowest priority.
    pub fn push_rule(&mut self, rule: SignatureRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    pub fn category<S: AsRef<str>>(&self, entries: &[S]) -> Option<ErrorCategory> {
        let blob = entries
            .iter()
            .map(|e| e.as_ref())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(&blob))
            .map(|rule| rule.category)
    }

    pub fn classify<S: AsRef<str>>(&self, entries: &[S]) -> Option<Diagnosis> {
        self.category(entries)
            .map(|category| template(category, self.locale).render(category, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_is_independent_of_text_order() {
        let classifier = ErrorClassifier::new(3000);

        let a = ["open data/new-api.db: permission denied", "listen tcp :3000: bind: address already in use"];
        let b = ["listen tcp :3000: bind: address already in use", "open data/new-api.db: permission denied"];

        assert_eq!(classifier.category(&a), Some(ErrorCategory::PortInUse));
        assert_eq!(classifier.category(&b), Some(ErrorCategory::PortInUse));
    }

    #[test]
    fn test_no_match_returns_none() {
        let classifier = ErrorClassifier::default();
        let entries = ["[SYS] New API started", "[GIN] GET / 200"];
        assert_eq!(classifier.classify(&entries), None);

        let empty: [&str; 0] = [];
        assert_eq!(classifier.classify(&empty), None);
    }

    #[test]
    fn test_port_in_use_diagnosis_mentions_port() {
        let classifier = ErrorClassifier::new(3456);
        let diagnosis = classifier
            .classify(&["listen tcp :3456: bind: address already in use"])
            .unwrap();

        assert_eq!(diagnosis.category, ErrorCategory::PortInUse);
        assert!(diagnosis.remediation.contains("3456"));
    }

    #[test]
    fn test_match_may_span_entries() {
        let classifier = ErrorClassifier::default();
        let entries = ["panic: dial tcp 10.0.0.2:6379", "read: i/o timeout"];
        assert_eq!(classifier.category(&entries), Some(ErrorCategory::NetworkUnreachable));
    }

    #[test]
    fn test_custom_rule_appended_last() {
        let mut classifier = ErrorClassifier::default();
        classifier.push_rule(SignatureRule::new(
            ErrorCategory::MissingFile,
            Pattern::contains("template not found"),
        ));

        assert_eq!(
            classifier.category(&["html/template: template not found"]),
            Some(ErrorCategory::MissingFile)
        );
        assert_eq!(
            classifier.category(&["template not found", "database is locked"]),
            Some(ErrorCategory::DatabaseLocked)
        );
    }

    #[test]
    fn test_locale_selects_text() {
        let classifier = ErrorClassifier::default().with_locale(Locale::Zh);
        let diagnosis = classifier.classify(&["fatal error: runtime: out of memory"]).unwrap();
        assert_eq!(diagnosis.title, "内存不足");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let classifier = ErrorClassifier::default();
        let entries = ["database is locked (5) (SQLITE_BUSY)"];
        assert_eq!(classifier.classify(&entries), classifier.classify(&entries));
    }
}
