use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::QueryError;
use crate::Result;

/// Field policy used by the query and aggregation processors
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Filter fields usable without a premium plan
    pub free_query_fields: HashSet<String>,
    /// Aggregation fields usable without a premium plan
    pub free_aggregation_fields: HashSet<String>,
    /// Fields that numeric aggregations may target when rules are applied
    pub numeric_aggregation_fields: HashSet<String>,
    pub max_aggregations: usize,
    pub max_distinct_aggregations: usize,
}

fn to_set(fields: &[&str]) -> HashSet<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            free_query_fields: to_set(&[
                "hidden",
                "fixed",
                "type",
                "reference",
                "organization",
                "project",
                "stack",
            ]),
            free_aggregation_fields: to_set(&["value"]),
            numeric_aggregation_fields: to_set(&["value", "count", "date"]),
            max_aggregations: 10,
            max_distinct_aggregations: 1,
        }
    }
}

impl QueryConfig {
    /// Load a configuration from a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: QueryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject settings that would make every aggregation request fail
    pub fn validate(&self) -> Result<()> {
        if self.max_aggregations == 0 {
            return Err(QueryError::Config(
                "max_aggregations must be greater than zero".to_string(),
            ));
        }
        if self.max_distinct_aggregations > self.max_aggregations {
            return Err(QueryError::Config(format!(
                "max_distinct_aggregations ({}) exceeds max_aggregations ({})",
                self.max_distinct_aggregations, self.max_aggregations
            )));
        }
        Ok(())
    }

    /// Add a free filter field
    pub fn with_free_query_field(mut self, field: impl Into<String>) -> Self {
        self.free_query_fields.insert(field.into().to_lowercase());
        self
    }

    /// Add a free aggregation field
    pub fn with_free_aggregation_field(mut self, field: impl Into<String>) -> Self {
        self.free_aggregation_fields
            .insert(field.into().to_lowercase());
        self
    }

    /// Add a field numeric aggregations may target
    pub fn with_numeric_aggregation_field(mut self, field: impl Into<String>) -> Self {
        self.numeric_aggregation_fields
            .insert(field.into().to_lowercase());
        self
    }

    /// Set the maximum number of aggregations per request
    pub fn with_max_aggregations(mut self, max: usize) -> Self {
        self.max_aggregations = max;
        self
    }

    pub fn is_free_query_field(&self, field: &str) -> bool {
        self.free_query_fields.contains(&field.to_lowercase())
    }

    pub fn is_free_aggregation_field(&self, field: &str) -> bool {
        self.free_aggregation_fields.contains(field)
    }

    /// Numeric-safe fields are the configured ones plus numerically indexed data fields
    pub fn is_numeric_aggregation_field(&self, field: &str) -> bool {
        self.numeric_aggregation_fields.contains(field)
            || (field.starts_with("idx.") && field.ends_with("-n"))
    }
}
