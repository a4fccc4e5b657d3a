//! Learned set of domains whose pages repeatedly fail to yield usable text.
//!
//! The set only grows. Concurrent writers racing to add the same domain is
//! harmless.

use std::collections::BTreeSet;
use std::sync::RwLock;

/// Advisory lookup of hard-to-scrape domains.
pub trait DomainAdvisory: Send + Sync {
    fn is_hard_to_scrape(&self, domain: &str) -> bool;

    fn mark_hard_to_scrape(&self, domain: &str);

    /// All known domains, sorted.
    fn domains(&self) -> Vec<String>;
}

/// Process-local advisory with no persistence.
#[derive(Default)]
pub struct MemoryDomainAdvisory {
    domains: RwLock<BTreeSet<String>>,
}

impl MemoryDomainAdvisory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = domains
            .into_iter()
            .map(|d| normalize_domain(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            domains: RwLock::new(set),
        }
    }
}

impl DomainAdvisory for MemoryDomainAdvisory {
    fn is_hard_to_scrape(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        self.domains
            .read()
            .map(|set| set.contains(&domain))
            .unwrap_or(false)
    }

    fn mark_hard_to_scrape(&self, domain: &str) {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return;
        }
        if let Ok(mut set) = self.domains.write() {
            if set.insert(domain.clone()) {
                tracing::info!(domain = %domain, "marked domain as hard to scrape");
            }
        }
    }

    fn domains(&self) -> Vec<String> {
        self.domains
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Lower-case and strip a leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let d = domain.trim().to_lowercase();
    d.strip_prefix("www.").unwrap_or(&d).to_string()
}
