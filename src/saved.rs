//! Saved analytic configurations.
//!
//! The engine only owns the serialized shape; storage lifecycle (Supabase
//! table, local JSON fallback, whatever the deployment uses) belongs to the
//! collaborator implementing [`QueryStore`].

use serde::{Deserialize, Serialize};

use crate::query::QueryRequest;

/// A named, persisted query configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedQuery {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Which report family the query runs against (aoi, fi, moat).
    #[serde(default)]
    pub report_type: String,
    pub params: QueryRequest,
}

impl SavedQuery {
    pub fn new(name: impl Into<String>, report_type: impl Into<String>, params: QueryRequest) -> Self {
        SavedQuery {
            id: None,
            name: name.into(),
            description: String::new(),
            report_type: report_type.into(),
            params,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// External persistence collaborator. Implementations live outside the
/// engine; tests use an in-memory store.
pub trait QueryStore {
    type Error;

    fn list(&self, report_type: &str) -> Result<Vec<SavedQuery>, Self::Error>;
    fn create(&mut self, query: SavedQuery) -> Result<SavedQuery, Self::Error>;
    fn update(&mut self, id: &str, query: SavedQuery) -> Result<SavedQuery, Self::Error>;
}
