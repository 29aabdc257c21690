//! Per-domain shared integration data
//!
//! Integrations hand objects from entry setup to their platforms through
//! this map. Values are stored type-erased and recovered by downcasting.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

type Slot = Arc<dyn Any + Send + Sync>;

/// `domain -> { key -> value }`
#[derive(Default)]
pub struct DomainData {
    domains: DashMap<String, DashMap<String, Slot>>,
}

impl DomainData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset a domain to an empty map
    pub fn init_domain(&self, domain: &str) {
        self.domains.insert(domain.to_string(), DashMap::new());
    }

    /// Check whether a domain has been initialized
    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Store a value, creating the domain when needed
    pub fn insert<T: Any + Send + Sync>(&self, domain: &str, key: &str, value: Arc<T>) {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value);
        debug!(domain, key, "Stored domain data");
    }

    /// Get a value by type
    ///
    /// Returns None when the key is missing or holds a different type.
    pub fn get<T: Any + Send + Sync>(&self, domain: &str, key: &str) -> Option<Arc<T>> {
        let slot = self.domains.get(domain)?.get(key)?.value().clone();
        slot.downcast::<T>().ok()
    }

    /// Check whether a key is present
    pub fn contains(&self, domain: &str, key: &str) -> bool {
        self.domains
            .get(domain)
            .map(|d| d.contains_key(key))
            .unwrap_or(false)
    }

    /// Remove a single key
    pub fn remove(&self, domain: &str, key: &str) -> bool {
        self.domains
            .get(domain)
            .map(|d| d.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Drop everything stored for a domain
    pub fn remove_domain(&self, domain: &str) -> bool {
        let removed = self.domains.remove(domain).is_some();
        if removed {
            debug!(domain, "Removed domain data");
        }
        removed
    }

    /// Number of keys stored for a domain
    pub fn domain_len(&self, domain: &str) -> usize {
        self.domains.get(domain).map(|d| d.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Client(&'static str);

    #[test]
    fn test_insert_and_get() {
        let data = DomainData::new();
        data.insert("lyric", "lyric_client", Arc::new(Client("a")));

        let client = data.get::<Client>("lyric", "lyric_client").unwrap();
        assert_eq!(*client, Client("a"));
        assert!(data.contains("lyric", "lyric_client"));
    }

    #[test]
    fn test_get_wrong_type() {
        let data = DomainData::new();
        data.insert("lyric", "lyric_client", Arc::new(42u32));

        assert!(data.get::<Client>("lyric", "lyric_client").is_none());
        assert!(data.get::<u32>("lyric", "missing").is_none());
        assert!(data.get::<u32>("hue", "lyric_client").is_none());
    }

    #[test]
    fn test_init_domain_resets() {
        let data = DomainData::new();
        data.insert("lyric", "lyric_client", Arc::new(Client("a")));

        data.init_domain("lyric");
        assert!(data.contains_domain("lyric"));
        assert_eq!(data.domain_len("lyric"), 0);
    }

    #[test]
    fn test_remove_domain() {
        let data = DomainData::new();
        data.insert("lyric", "lyric_client", Arc::new(Client("a")));

        assert!(data.remove_domain("lyric"));
        assert!(!data.contains_domain("lyric"));
        assert!(!data.remove_domain("lyric"));
    }

    #[test]
    fn test_remove_key() {
        let data = DomainData::new();
        data.insert("lyric", "a", Arc::new(1u8));
        data.insert("lyric", "b", Arc::new(2u8));

        assert!(data.remove("lyric", "a"));
        assert!(!data.remove("lyric", "a"));
        assert_eq!(data.domain_len("lyric"), 1);
    }
}
