use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;

use crate::domain::{catalog_base, catalog_parent};

/// Session keys already dispatched, shared by every discovery worker of a run.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: Mutex<HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` and reports whether it was new. Test and insert happen under one lock.
    pub fn insert_if_new(&self, key: &str) -> bool {
        let mut keys = match self.keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        keys.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        match self.keys.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn series_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]{3}-").expect("series pattern is valid"))
}

/// Session a series collection belongs to, or `None` for collections without a series id.
///
/// The series id (three digits and `-`) may appear anywhere in the collection's base name.
pub fn session_key(name: &str) -> Option<&str> {
    if series_pattern().is_match(catalog_base(name)) {
        Some(catalog_parent(name))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    seen: Arc<SeenSet>,
}

impl Deduplicator {
    pub fn new(seen: Arc<SeenSet>) -> Self {
        Self { seen }
    }

    /// Whether `name` should be passed downstream.
    pub fn admit(&self, name: &str) -> bool {
        match session_key(name) {
            Some(key) => self.seen.insert_if_new(key),
            None => true,
        }
    }
}
