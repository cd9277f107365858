//! Ordered query parameters and the merge used to derive link queries

use std::fmt;

/// Query parameters of a request, in arrival order.
///
/// Keys and values are kept exactly as they appeared on the wire (still
/// percent-encoded), so serializing them again reproduces the request. A
/// repeated key keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (without the leading `?`)
    pub fn parse(raw: &str) -> Self {
        let mut params = Self::new();
        for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(key, value);
        }
        params
    }

    /// Set `key`, replacing the value in place when the key already exists
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Shallow merge: overrides win, existing keys keep their position and
    /// new keys are appended in the order given.
    pub fn merged<I, K, V>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.clone();
        for (key, value) in overrides {
            merged.insert(key, value);
        }
        merged
    }

    /// Serialize as `?k1=v1&k2=v2`, or the empty string when there are no
    /// parameters. Values are written verbatim.
    pub fn to_search(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.pairs.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            write!(f, "{separator}{key}={value}")?;
        }
        Ok(())
    }
}

/// Merge `overrides` onto `existing` and return the resulting search string
pub fn merged_search<'a, I>(existing: &QueryParams, overrides: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    existing.merged(overrides).to_search()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_serializes_to_nothing() {
        assert_eq!(QueryParams::parse("").to_search(), "");
        assert_eq!(merged_search(&QueryParams::new(), Vec::new()), "");
    }

    #[test]
    fn test_merge_without_overrides_is_identity() {
        let params = QueryParams::parse("prefix=docs/&maxKeys=2");
        assert_eq!(merged_search(&params, Vec::new()), "?prefix=docs/&maxKeys=2");
        assert_eq!(params.merged(Vec::<(String, String)>::new()), params);
    }

    #[test]
    fn test_override_wins_and_keeps_position() {
        let params = QueryParams::parse("marker=A&prefix=B");
        let search = merged_search(&params, [("marker", "X".to_string())]);
        assert_eq!(search, "?marker=X&prefix=B");
        assert!(!search.contains("marker=A"));
    }

    #[test]
    fn test_new_keys_are_appended() {
        let params = QueryParams::parse("prefix=docs/&maxKeys=2");
        let search = merged_search(&params, [("marker", "docs/b.txt".to_string())]);
        assert_eq!(search, "?prefix=docs/&maxKeys=2&marker=docs/b.txt");
    }

    #[test]
    fn test_overrides_into_empty_query() {
        let search = merged_search(&QueryParams::new(), [("prefix", "a/".to_string())]);
        assert_eq!(search, "?prefix=a/");
    }

    #[test]
    fn test_parse_keeps_raw_encoding_and_collapses_duplicates() {
        let params = QueryParams::parse("prefix=docs%2F&flag&&prefix=other%20dir");
        assert_eq!(params.to_search(), "?prefix=other%20dir&flag=");
    }
}
