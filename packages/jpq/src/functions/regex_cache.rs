//! Regex compilation cache for the `tokenize` built-in
//!
//! `tokenize` receives its pattern as a runtime string argument, so the
//! compiled regex cannot be baked into the expression the way `=~` literals
//! are. Repeated calls with the same pattern hit this process-wide cache.

use std::collections::HashMap;
use std::sync::RwLock;

pub(crate) struct RegexCache {
    cache: RwLock<HashMap<String, regex::Regex>>,
}

impl RegexCache {
    pub(crate) fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get a compiled regex from the cache, compiling and inserting on miss.
    pub(crate) fn get_or_compile(&self, pattern: &str) -> Result<regex::Regex, regex::Error> {
        if let Ok(cache) = self.cache.read() {
            if let Some(compiled) = cache.get(pattern) {
                return Ok(compiled.clone());
            }
        }

        let compiled = regex::Regex::new(pattern)?;

        if let Ok(mut cache) = self.cache.write() {
            // Bounded so hostile pattern churn cannot grow it without limit
            if cache.len() < 32 {
                cache.insert(pattern.to_string(), compiled.clone());
            }
        }

        Ok(compiled)
    }
}

lazy_static::lazy_static! {
    pub(crate) static ref REGEX_CACHE: RegexCache = RegexCache::new();
}
