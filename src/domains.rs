//! File-backed hard-to-scrape domain list.
//!
//! The list is a JSON array of domain strings, loaded once on open and
//! rewritten whenever a new domain is added. A missing file is an empty
//! list; a corrupt file is logged and treated as empty rather than failing
//! the run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};

use webscout_core::domains::{normalize_domain, DomainAdvisory};

pub struct FileDomainAdvisory {
    path: PathBuf,
    domains: RwLock<BTreeSet<String>>,
}

impl FileDomainAdvisory {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let domains = match load(&path) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not load domain list; starting empty");
                BTreeSet::new()
            }
        };
        tracing::debug!(path = %path.display(), count = domains.len(), "loaded hard-to-scrape domains");
        Self {
            path,
            domains: RwLock::new(domains),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, domains: &BTreeSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let list: Vec<&String> = domains.iter().collect();
        let json = serde_json::to_string_pretty(&list)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

fn load(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let list: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid domain list {}", path.display()))?;
    Ok(list
        .iter()
        .map(|d| normalize_domain(d))
        .filter(|d| !d.is_empty())
        .collect())
}

impl DomainAdvisory for FileDomainAdvisory {
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
        let Ok(mut set) = self.domains.write() else {
            return;
        };
        if !set.insert(domain.clone()) {
            return;
        }
        tracing::info!(domain = %domain, "marked domain as hard to scrape");
        if let Err(e) = self.save(&set) {
            tracing::warn!(error = %e, "failed to persist domain list");
        }
    }

    fn domains(&self) -> Vec<String> {
        self.domains
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
