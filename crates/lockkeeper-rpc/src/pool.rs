//! Endpoint pool - ordered, deduplicated RPC URLs for one chain

use std::collections::HashSet;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool {
    urls: Vec<String>,
}

impl EndpointPool {
    /// Build a pool, trimming whitespace and dropping empty and duplicate URLs.
    /// Order of first appearance is preserved.
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();

        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            if seen.insert(url.to_string()) {
                kept.push(url.to_string());
            }
        }

        if kept.is_empty() {
            return Err(Error::NoEndpoints);
        }

        Ok(Self { urls: kept })
    }

    /// Parse a comma-separated list (`LOCKKEEPER_RPC_URLS` format)
    pub fn from_csv(list: &str) -> Result<Self> {
        Self::new(list.split(','))
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Always false for a constructed pool
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_order() {
        let pool = EndpointPool::new([
            "https://b.example",
            "https://a.example",
            "https://b.example",
            "  https://c.example ",
        ])
        .unwrap();

        assert_eq!(
            pool.urls(),
            &["https://b.example", "https://a.example", "https://c.example"]
        );
    }

    #[test]
    fn test_empty_urls_dropped() {
        let pool = EndpointPool::new(["", "  ", "https://a.example"]).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_no_valid_urls_is_error() {
        assert!(matches!(EndpointPool::new(["", " "]), Err(Error::NoEndpoints)));
        assert!(matches!(
            EndpointPool::new(Vec::<String>::new()),
            Err(Error::NoEndpoints)
        ));
    }

    #[test]
    fn test_from_csv() {
        let pool = EndpointPool::from_csv("https://a.example, https://b.example,,").unwrap();
        assert_eq!(pool.urls(), &["https://a.example", "https://b.example"]);
    }
}
