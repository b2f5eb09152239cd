/// Phrases that short-circuit classification when no list is configured.
pub const DEFAULT_EXCLUSION_PHRASES: &[&str] =
    &["uni hamburg", "universität hamburg", "university of hamburg"];

/// Case-insensitive substring filter. Matching text is never classified.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    phrases: Vec<String>,
}

impl ExclusionFilter {
    /// Phrases are checked in the given order.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn check_exclusion(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.phrases.iter().any(|phrase| text.contains(phrase.as_str()))
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUSION_PHRASES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_any_case() {
        let filter = ExclusionFilter::default();
        assert!(filter.check_exclusion("uni hamburg ist schuld"));
        assert!(filter.check_exclusion("Die Uni Hamburg steckt dahinter"));
        assert!(filter.check_exclusion("UNI HAMBURG"));
        assert!(filter.check_exclusion("uNi HaMbUrG"));
    }

    #[test]
    fn test_matches_umlaut_phrase() {
        let filter = ExclusionFilter::default();
        assert!(filter.check_exclusion("Die UNIVERSITÄT HAMBURG weiß Bescheid"));
    }

    #[test]
    fn test_no_match() {
        let filter = ExclusionFilter::default();
        assert!(!filter.check_exclusion("Die Mondlandung war gefälscht"));
        assert!(!filter.check_exclusion("uni bremen"));
        assert!(!filter.check_exclusion(""));
    }

    #[test]
    fn test_custom_phrases_lowercased() {
        let filter = ExclusionFilter::new(["Reptiloiden", ""]);
        assert_eq!(filter.phrases(), ["reptiloiden"]);
        assert!(filter.check_exclusion("REPTILOIDEN regieren"));
        assert!(!filter.check_exclusion("uni hamburg"));
    }

    #[test]
    fn test_empty_filter_never_matches() {
        let filter = ExclusionFilter::new(Vec::<String>::new());
        assert!(!filter.check_exclusion("uni hamburg"));
    }
}
