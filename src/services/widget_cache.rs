//! Generated artifacts cached by widget URL.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::store::{KeyValueStore, get_json, set_json};
use crate::domain::GenerationResult;
use crate::error::Result;

const KEY_PREFIX: &str = "widget:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedWidget {
    pub code: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub timestamp: i64,
}

/// Latest artifact per widget URL
#[derive(Clone)]
pub struct WidgetCache {
    store: Arc<dyn KeyValueStore>,
}

impl WidgetCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(widget_url: &str) -> String {
        format!("{}{}", KEY_PREFIX, widget_url)
    }

    pub fn get(&self, widget_url: &str) -> Result<Option<CachedWidget>> {
        get_json(self.store.as_ref(), &Self::key(widget_url))
    }

    /// Results without a widget URL are not cached
    pub fn put(&self, result: &GenerationResult) -> Result<()> {
        if result.widget_url.is_empty() {
            return Ok(());
        }
        let entry = CachedWidget {
            code: result.code.clone(),
            params: result.params.clone(),
            timestamp: result.timestamp,
        };
        set_json(self.store.as_ref(), &Self::key(&result.widget_url), &entry)
    }

    pub fn remove(&self, widget_url: &str) -> Result<()> {
        self.store.delete(&Self::key(widget_url))
    }

    pub fn urls(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}
