//! Content rule matching for non-archive files.
//!
//! Rules are named byte patterns compiled to regexes. The exclusion list
//! is kept as the raw text of the exclusions file; a rule is excluded
//! when its name occurs anywhere in that text. When several rules match
//! one file, the last non-excluded match decides the verdict.

use std::fs;
use std::path::Path;

use regex::bytes::Regex;

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Debug)]
pub struct ContentRule {
    pub name: String,
    pattern: Regex,
}

#[derive(Debug, Default)]
pub struct ContentRuleSet {
    rules: Vec<ContentRule>,
    excluded: String,
}

impl ContentRuleSet {
    /// Compiles named patterns into a rule set. Patterns that fail to
    /// compile are dropped with a warning.
    pub fn new(patterns: Vec<(String, String)>, excluded: String) -> Self {
        let mut rules = Vec::with_capacity(patterns.len());
        for (name, pattern) in patterns {
            match Regex::new(&pattern) {
                Ok(compiled) => rules.push(ContentRule {
                    name,
                    pattern: compiled,
                }),
                Err(e) => log::warn!("Dropping uncompilable content rule {}: {}", name, e),
            }
        }
        Self { rules, excluded }
    }

    /// Loads rules from a JSON list of name/pattern pairs and the
    /// exclusion text file. Missing files yield an empty rule set.
    pub fn load(rules_path: &Path, excluded_path: &Path) -> Self {
        let patterns = match fs::read_to_string(rules_path) {
            Ok(text) => match serde_json::from_str::<Vec<(String, String)>>(&text) {
                Ok(pairs) => pairs,
                Err(e) => {
                    log::warn!("Skipping unreadable rules {}: {}", rules_path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        let excluded = fs::read_to_string(excluded_path).unwrap_or_default();
        let set = Self::new(patterns, excluded);
        log::info!("Loaded {} content rules", set.len());
        set
    }

    /// Name of the last non-excluded rule matching `content`, if any.
    pub fn match_content(&self, content: &[u8]) -> Option<&str> {
        let mut hit = None;
        for rule in &self.rules {
            if rule.pattern.is_match(content) && !self.is_excluded(&rule.name) {
                hit = Some(rule.name.as_str());
            }
        }
        hit
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        !name.is_empty() && self.excluded.contains(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)], excluded: &str) -> ContentRuleSet {
        ContentRuleSet::new(
            pairs
                .iter()
                .map(|(n, p)| (n.to_string(), p.to_string()))
                .collect(),
            excluded.to_string(),
        )
    }

    #[test]
    fn test_simple_match() {
        let set = rules(&[("DropperStub", "drop_payload")], "");
        assert_eq!(set.match_content(b"xx drop_payload yy"), Some("DropperStub"));
        assert_eq!(set.match_content(b"benign bytes"), None);
    }

    #[test]
    fn test_last_match_wins() {
        let set = rules(
            &[("First", "shared_marker"), ("Second", "shared_marker")],
            "",
        );
        assert_eq!(set.match_content(b"shared_marker"), Some("Second"));
    }

    #[test]
    fn test_exclusion_is_substring_containment() {
        let set = rules(
            &[("DropperStub", "drop_payload"), ("Keylogger", "hook_keys")],
            "# local tooling\nDropperStub variants\n",
        );
        assert!(set.is_excluded("DropperStub"));
        assert!(!set.is_excluded("Keylogger"));
        assert_eq!(set.match_content(b"drop_payload"), None);
        assert_eq!(set.match_content(b"drop_payload hook_keys"), Some("Keylogger"));
    }

    #[test]
    fn test_excluded_rule_lets_earlier_match_stand() {
        let set = rules(
            &[("Keep", "marker_a"), ("Drop", "marker_b")],
            "Drop\n",
        );
        assert_eq!(set.match_content(b"marker_a marker_b"), Some("Keep"));
    }

    #[test]
    fn test_uncompilable_pattern_is_dropped() {
        let set = rules(&[("Broken", "([unclosed"), ("Fine", "abc")], "");
        assert_eq!(set.len(), 1);
        assert_eq!(set.match_content(b"abc"), Some("Fine"));
    }

    #[test]
    fn test_load_missing_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = ContentRuleSet::load(
            &dir.path().join("content_rules.json"),
            &dir.path().join("excluded_rules.txt"),
        );
        assert!(set.is_empty());
        assert_eq!(set.match_content(b"anything"), None);
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("content_rules.json"),
            br#"[["DropperStub", "drop_payload"]]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("excluded_rules.txt"), "nothing here\n").unwrap();

        let set = ContentRuleSet::load(
            &dir.path().join("content_rules.json"),
            &dir.path().join("excluded_rules.txt"),
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.match_content(b"xx drop_payload"), Some("DropperStub"));
    }
}
