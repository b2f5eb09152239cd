//! Strips bot command tokens out of message text.

use regex::Regex;

/// Command prefixes this bot reacts to.
pub const DEFAULT_PREFIXES: &[&str] = &["/check", "/complete", "/beende"];

pub struct Normalizer {
    pattern: Option<Regex>,
}

impl Normalizer {
    /// Build a normalizer removing every occurrence of any of `prefixes`,
    /// ignoring case. A `@botname` glued to a command is removed with it.
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = prefixes
            .iter()
            .map(|p| regex::escape(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();

        // An empty alternation would match everywhere.
        let pattern = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(
                r"(?i)(?:{})(?:@\w+)?",
                alternatives.join("|")
            ))?)
        };

        Ok(Self { pattern })
    }

    pub fn normalize(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, "").trim().to_string(),
            None => text.trim().to_string(),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES).expect("escaped command prefixes always form a valid regex")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_check() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("/check hello"), "hello");
    }

    #[test]
    fn test_strips_capitalized_command() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("/Check hello"), "hello");
        assert_eq!(n.normalize("/CHECK hello"), "hello");
    }

    #[test]
    fn test_strips_every_occurrence() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("/check a /check b"), "a  b");
        assert_eq!(n.normalize("/beende Es war einmal /complete"), "Es war einmal");
    }

    #[test]
    fn test_strips_bot_mention() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("/check@AluhutBot die Erde ist flach"), "die Erde ist flach");
    }

    #[test]
    fn test_leaves_other_text_alone() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("  Impfen ist gut /start "), "Impfen ist gut /start");
    }

    #[test]
    fn test_empty_after_stripping() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("/check"), "");
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_custom_prefixes_are_escaped() {
        let n = Normalizer::new(&["/c+"]).unwrap();
        assert_eq!(n.normalize("/c+ x"), "x");
        assert_eq!(n.normalize("/cc x"), "/cc x");
    }

    #[test]
    fn test_no_prefixes_is_identity() {
        let n = Normalizer::new::<&str>(&[]).unwrap();
        assert_eq!(n.normalize(" /check hi "), "/check hi");
    }
}
