//! Template rendering with a compile cache.
//!
//! Template sources are compiled once and reused across calls; the cache is
//! keyed by the raw source text and safe for concurrent use. Construct one
//! engine at startup and share it by reference wherever rendering is needed.

use dashmap::DashMap;
use handlebars::Handlebars;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{MailError, Result};

/// Registered name of the single template inside each compiled handle.
const TEMPLATE_NAME: &str = "message";

/// Handlebars-based template engine with a concurrent compile cache.
#[derive(Default)]
pub struct TemplateEngine {
    cache: DashMap<String, Arc<Handlebars<'static>>>,
}

impl TemplateEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a template source against a model.
    ///
    /// The compiled form is cached by source text. Under a concurrent first
    /// compilation of the same source exactly one compiled handle wins and is
    /// stored; every successful call renders some single stored handle. A
    /// source that fails to parse caches nothing, and a template referencing
    /// a model member that does not exist fails the render.
    pub fn render(&self, source: &str, model: &Value) -> Result<String> {
        let compiled = self.compiled(source)?;
        compiled
            .render(TEMPLATE_NAME, model)
            .map_err(|e| MailError::Template(e.to_string()))
    }

    /// Render with model members additionally exposed under their lower-cased
    /// names, so templates may reference either casing.
    pub fn render_case_insensitive(&self, source: &str, model: &Value) -> Result<String> {
        let model = match model {
            Value::Object(map) => {
                let mut widened = map.clone();
                for (key, value) in map {
                    let lower = key.to_lowercase();
                    if !widened.contains_key(&lower) {
                        widened.insert(lower, value.clone());
                    }
                }
                Value::Object(widened)
            }
            other => other.clone(),
        };

        self.render(source, &model)
    }

    /// Number of compiled templates currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Look up or compile the handle for a source text.
    fn compiled(&self, source: &str) -> Result<Arc<Handlebars<'static>>> {
        if let Some(existing) = self.cache.get(source) {
            return Ok(existing.clone());
        }

        let entry = self
            .cache
            .entry(source.to_owned())
            .or_try_insert_with(|| compile(source).map(Arc::new))?;
        Ok(entry.clone())
    }
}

/// Compile a source into its own single-template registry.
fn compile(source: &str) -> Result<Handlebars<'static>> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string(TEMPLATE_NAME, source)
        .map_err(|e| MailError::Template(e.to_string()))?;

    debug!(bytes = source.len(), "compiled template");
    Ok(handlebars)
}
