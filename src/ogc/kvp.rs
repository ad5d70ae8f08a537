//! Key/value pair (KVP) request parameters.
//!
//! OGC keys are case-insensitive while values are not; the original spelling
//! and order of every pair is kept so the query can be forwarded as-is.

/// Parsed KVP parameters of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KvpParams {
    pairs: Vec<(String, String)>,
}

impl KvpParams {
    /// Parse an `application/x-www-form-urlencoded` string.
    pub fn parse(raw: &str) -> Self {
        let pairs = url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Appends all pairs of `other`.
    pub fn extend(&mut self, other: KvpParams) {
        self.pairs.extend(other.pairs);
    }

    /// First value for `key`, compared case-insensitively. Empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.trim().is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// First value among several alternative keys.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Comma separated list value, trimmed, without empty entries.
    ///
    /// WFS 2.0 allows parenthesised groups (`(a,b)(c)`); parentheses are dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(split_list).unwrap_or_default()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c == '(' || c == ')')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let params = KvpParams::parse("service=WMS&Request=GetMap&layers=a,b");
        assert_eq!(params.get("SERVICE"), Some("WMS"));
        assert_eq!(params.get("request"), Some("GetMap"));
        assert_eq!(params.list("LAYERS"), vec!["a", "b"]);
    }

    #[test]
    fn test_percent_decoding_and_empty_values() {
        let params = KvpParams::parse("?BBOX=1%2C2%2C3%2C4&STYLES=&TYPENAMES=(ns:a)(ns:b)");
        assert_eq!(params.get("bbox"), Some("1,2,3,4"));
        assert_eq!(params.get("styles"), None);
        assert_eq!(params.list("typenames"), vec!["ns:a", "ns:b"]);
    }
}
