//! Candidate-rule lookup per document type
//!
//! The shared cache holds, per document type, the ordered list of enabled rule
//! names. Rules themselves are always loaded fresh from the document store so
//! that the round-robin cursor (`last_user`) is never read from a stale copy.

use crate::error::{RotaError, RotaResult};
use crate::rule::{ASSIGNMENT_RULE_DOCTYPE, AssignmentRule, fields};
use crate::store::{CacheStore, DocumentStore, Filters, OrderBy};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Typed keys for entries this crate writes to the shared cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Ordered names of the enabled rules governing a document type
    RuleMap { document_type: String },
}

impl CacheKey {
    pub fn rule_map(document_type: &str) -> Self {
        CacheKey::RuleMap { document_type: document_type.to_string() }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::RuleMap { document_type } => write!(f, "assignment_rule_map::{document_type}"),
        }
    }
}

/// Statistics for the rule cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl RuleCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Memoized lookup of active rules per document type
pub struct RuleCache {
    cache: Arc<dyn CacheStore>,
    documents: Arc<dyn DocumentStore>,

    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCache").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

impl RuleCache {
    pub fn new(cache: Arc<dyn CacheStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            cache,
            documents,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Enabled rules for a document type, highest priority first
    ///
    /// Never fails: a missing rule table yields an empty list silently, any
    /// other failure yields an empty list with a warning.
    pub fn get_rules_for(&self, document_type: &str) -> Vec<AssignmentRule> {
        let names = match self.rule_names(document_type) {
            Ok(names) => names,
            Err(RotaError::StoreUnavailable { .. }) => {
                debug!(document_type, "Rule table unavailable, no rules apply");
                return Vec::new();
            }
            Err(err) => {
                warn!(document_type, error = %err, "Failed to look up assignment rules");
                return Vec::new();
            }
        };

        names.iter().filter_map(|name| self.load_rule(document_type, name)).collect()
    }

    /// Ordered rule names, from the cache or the store
    pub fn rule_names(&self, document_type: &str) -> RotaResult<Vec<String>> {
        let key = CacheKey::rule_map(document_type).to_string();

        match self.cached_names(&key) {
            Ok(Some(names)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = %key, rules = names.len(), "Rule cache hit");
                return Ok(names);
            }
            Ok(None) => {}
            Err(err) => debug!(cache_key = %key, error = %err, "Rule cache entry unusable"),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(cache_key = %key, "Rule cache miss");

        let rows = self.documents.query(
            ASSIGNMENT_RULE_DOCTYPE,
            &Filters::new().eq(fields::DOCUMENT_TYPE, document_type).eq(fields::DISABLED, false),
            Some(&OrderBy::desc(fields::PRIORITY)),
            None,
        )?;
        let names: Vec<String> = rows.into_iter().map(|doc| doc.name).collect();

        // Concurrent misses may both write here; last write wins
        match serde_json::to_string(&names) {
            Ok(payload) => {
                if let Err(err) = self.cache.set(&key, payload) {
                    warn!(cache_key = %key, error = %err, "Failed to populate rule cache");
                }
            }
            Err(err) => warn!(cache_key = %key, error = %err, "Failed to encode rule cache entry"),
        }

        Ok(names)
    }

    fn cached_names(&self, key: &str) -> RotaResult<Option<Vec<String>>> {
        let Some(payload) = self.cache.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|err| RotaError::cache_miss(key, format!("undecodable entry: {err}")))
    }

    fn load_rule(&self, document_type: &str, name: &str) -> Option<AssignmentRule> {
        let loaded = self
            .documents
            .get_document(ASSIGNMENT_RULE_DOCTYPE, name)
            .and_then(|doc| AssignmentRule::from_document(&doc));

        match loaded {
            Ok(rule) if !rule.disabled && rule.document_type == document_type => Some(rule),
            Ok(_) => {
                debug!(rule = name, document_type, "Cached rule no longer applies, skipping");
                None
            }
            Err(RotaError::Configuration { message, .. }) => {
                warn!(rule = name, error = %message, "Skipping misconfigured assignment rule");
                None
            }
            Err(err) => {
                debug!(rule = name, error = %err, "Cached rule could not be loaded, skipping");
                None
            }
        }
    }

    /// Drop the cached entry for one document type
    pub fn invalidate(&self, document_type: &str) {
        let key = CacheKey::rule_map(document_type).to_string();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        match self.cache.delete(&key) {
            Ok(()) => debug!(cache_key = %key, "Rule cache invalidated"),
            Err(err) => warn!(cache_key = %key, error = %err, "Failed to invalidate rule cache"),
        }
    }

    /// Document types that have at least one enabled rule, sorted
    pub fn get_rule_document_types(&self) -> Vec<String> {
        let rows = match self.documents.query(
            ASSIGNMENT_RULE_DOCTYPE,
            &Filters::new().eq(fields::DISABLED, false),
            None,
            None,
        ) {
            Ok(rows) => rows,
            Err(RotaError::StoreUnavailable { .. }) => return Vec::new(),
            Err(err) => {
                warn!(error = %err, "Failed to list assignment rule document types");
                return Vec::new();
            }
        };

        rows.iter()
            .filter_map(|doc| doc.get_str(fields::DOCUMENT_TYPE))
            .filter(|doctype| !doctype.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn stats(&self) -> RuleCacheStats {
        RuleCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
