//! Static bad-agent blocklist

/// Crawlers rejected when no blocklist is configured.
pub const DEFAULT_BLOCKLIST: &[&str] = &["AhrefsBot", "MJ12bot", "SemrushBot"];

/// Immutable set of `User-Agent` substrings. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct BlockRules {
    patterns: Vec<String>,
}

impl BlockRules {
    /// Build from configured patterns. Empty patterns are dropped, since they
    /// would match every agent.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// First pattern contained in `agent`, if any.
    pub fn matching(&self, agent: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| agent.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for BlockRules {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKLIST.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_substring_anywhere_in_agent() {
        let rules = BlockRules::default();
        assert_eq!(
            rules.matching("Mozilla/5.0 (compatible; AhrefsBot/7.0; +http://ahrefs.com/robot/)"),
            Some("AhrefsBot")
        );
        assert_eq!(rules.matching("Mozilla/5.0 (compatible; MJ12bot/v1.4.8)"), Some("MJ12bot"));
    }

    #[test]
    fn ordinary_browsers_pass() {
        let rules = BlockRules::default();
        assert!(rules.matching("Mozilla/5.0 (X11; Linux x86_64) Firefox/131.0").is_none());
        assert!(rules.matching("").is_none());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let rules = BlockRules::default();
        assert!(rules.matching("semrushbot").is_none());
    }

    #[test]
    fn empty_patterns_are_dropped() {
        let rules = BlockRules::new(["", "BadBot"]);
        assert_eq!(rules.len(), 1);
        assert!(rules.matching("GoodBot").is_none());
    }
}
