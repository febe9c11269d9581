use regex::Regex;

/// Invalidation target: either one exact key or a `*` wildcard pattern.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    Exact(String),
    Wildcard(Regex),
}

impl KeyPattern {
    pub const WILDCARD: char = '*';

    pub fn parse(pattern: &str) -> Self {
        if !pattern.contains(Self::WILDCARD) {
            return KeyPattern::Exact(pattern.to_string());
        }
        let body = pattern
            .split(Self::WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        // Escaped literals joined by `.*` always form a valid expression
        match Regex::new(&format!("^{}$", body)) {
            Ok(re) => KeyPattern::Wildcard(re),
            Err(_) => KeyPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Wildcard(re) => re.is_match(key),
        }
    }
}

/// Category portion of a key or pattern (text before the first `:`).
pub fn category_of(key: &str) -> Option<&str> {
    key.split_once(':')
        .map(|(category, _)| category)
        .filter(|category| !category.is_empty() && !category.contains(KeyPattern::WILDCARD))
}
