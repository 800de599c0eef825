//! AI payload validation against derived schemas.
//!
//! The validator is an injected capability so tests can substitute their
//! own. The default implementation wraps the `jsonschema` crate with a
//! compile-once cache keyed by schema content hash; the cache map tolerates
//! duplicate compilation (last writer wins) and is safe for concurrent
//! readers behind an `RwLock`.
//!
//! Hard keywords are enforced by the compiled schema. The soft `x-minWords`
//! / `x-maxWords` / `x-minSentences` / `x-maxSentences` keywords are checked
//! separately by [`check_soft_constraints`] and downgrade to warnings.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use jsonschema::{Draft, JSONSchema};
use rustc_hash::{FxHashMap, FxHasher};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::diag::{Warning, WarningCode};

/// Capability interface for validating an instance against a JSON Schema.
pub trait SchemaValidator: Send + Sync {
    /// Validates `instance` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns one human-readable message per violation.
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), Vec<String>>;
}

/// Default validator with a process-wide compile-once cache.
#[derive(Default)]
pub struct CachedValidator {
    cache: RwLock<FxHashMap<u64, Arc<JSONSchema>>>,
}

impl CachedValidator {
    /// Creates a validator with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled schemas currently cached.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn compiled(&self, schema: &Value) -> Result<Arc<JSONSchema>, String> {
        let key = content_hash(schema);
        if let Ok(cache) = self.cache.read() {
            if let Some(compiled) = cache.get(&key) {
                return Ok(Arc::clone(compiled));
            }
        }

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft202012)
            .compile(schema)
            .map(Arc::new)
            .map_err(|e| format!("schema compilation failed: {e}"))?;

        // Compile-on-miss races are tolerated: last writer wins, both
        // compilations are equivalent.
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, Arc::clone(&compiled));
        }
        Ok(compiled)
    }
}

impl SchemaValidator for CachedValidator {
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), Vec<String>> {
        let compiled = self.compiled(schema).map_err(|e| vec![e])?;
        let result = compiled.validate(instance);
        match result {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| {
                    let pointer = e.instance_path.to_string();
                    if pointer.is_empty() {
                        e.to_string()
                    } else {
                        format!("{pointer}: {e}")
                    }
                })
                .collect()),
        }
    }
}

fn content_hash(schema: &Value) -> u64 {
    let mut hasher = FxHasher::default();
    schema.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Checks the soft `x-*` keywords of a schema against an instance.
///
/// Violations come back as `soft_constraint` warnings; nothing here fails
/// validation. Word and sentence counts use Unicode segmentation.
#[must_use]
pub fn check_soft_constraints(schema: &Value, instance: &Value) -> Vec<Warning> {
    let mut warnings = Vec::new();
    walk_soft(schema, instance, "", &mut warnings);
    warnings
}

fn walk_soft(schema: &Value, instance: &Value, path: &str, warnings: &mut Vec<Warning>) {
    if let (Some(properties), Some(map)) = (
        schema.get("properties").and_then(Value::as_object),
        instance.as_object(),
    ) {
        for (key, child_schema) in properties {
            if let Some(child) = map.get(key) {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk_soft(child_schema, child, &child_path, warnings);
            }
        }
        return;
    }
    if let (Some(items), Some(elements)) = (schema.get("items"), instance.as_array()) {
        for (i, element) in elements.iter().enumerate() {
            walk_soft(items, element, &format!("{path}[{i}]"), warnings);
        }
        return;
    }
    if let Some(text) = instance.as_str() {
        check_text(schema, text, path, warnings);
    }
}

fn check_text(schema: &Value, text: &str, path: &str, warnings: &mut Vec<Warning>) {
    let words = text.unicode_words().count() as u64;
    let sentences = text
        .unicode_sentences()
        .filter(|s| !s.trim().is_empty())
        .count() as u64;

    let bounds = [
        ("x-minWords", words, true, "words"),
        ("x-maxWords", words, false, "words"),
        ("x-minSentences", sentences, true, "sentences"),
        ("x-maxSentences", sentences, false, "sentences"),
    ];
    for (keyword, actual, is_min, unit) in bounds {
        let Some(bound) = schema.get(keyword).and_then(Value::as_u64) else {
            continue;
        };
        let violated = if is_min { actual < bound } else { actual > bound };
        if violated {
            let relation = if is_min { "at least" } else { "at most" };
            warnings.push(
                Warning::warning(
                    WarningCode::SoftConstraint,
                    format!("expected {relation} {bound} {unit}, got {actual}"),
                )
                .with_path(path.to_string())
                .with_details(serde_json::json!({"keyword": keyword, "actual": actual})),
            );
        }
    }
}
