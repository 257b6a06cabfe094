//! Field aggregation mini-language
//!
//! Parses `type:field` pairs separated by commas, e.g. `avg:value,distinct:data.user`,
//! into a set of [`FieldAggregation`] requests. `data.*` fields are rewritten to
//! their numeric index field and `ref.*` fields to their reference index field.
//!
//! Failures never panic or return `Err`; they come back as a result with
//! `is_valid == false` and a human readable `message`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::debug;

use crate::config::QueryConfig;
use crate::error::QueryError;

/// Kind of aggregation requested for a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAggregationType {
    Average,
    Distinct,
    Sum,
    Min,
    Max,
    Last,
    Term,
}

impl FieldAggregationType {
    /// Token used in the aggregation string
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldAggregationType::Average => "avg",
            FieldAggregationType::Distinct => "distinct",
            FieldAggregationType::Sum => "sum",
            FieldAggregationType::Min => "min",
            FieldAggregationType::Max => "max",
            FieldAggregationType::Last => "last",
            FieldAggregationType::Term => "term",
        }
    }
}

impl FromStr for FieldAggregationType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(FieldAggregationType::Average),
            "distinct" => Ok(FieldAggregationType::Distinct),
            "sum" => Ok(FieldAggregationType::Sum),
            "min" => Ok(FieldAggregationType::Min),
            "max" => Ok(FieldAggregationType::Max),
            "last" => Ok(FieldAggregationType::Last),
            "term" => Ok(FieldAggregationType::Term),
            other => Err(QueryError::InvalidAggregation(format!(
                "Invalid type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for FieldAggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single aggregation request
///
/// Equality and hashing only consider `(aggregation_type, field)`; term patterns
/// do not make two requests distinct.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldAggregation {
    #[serde(rename = "type")]
    pub aggregation_type: FieldAggregationType,
    pub field: String,
    /// Only used by term aggregations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_pattern: Option<String>,
    /// Only used by term aggregations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_pattern: Option<String>,
}

impl FieldAggregation {
    pub fn new(aggregation_type: FieldAggregationType, field: impl Into<String>) -> Self {
        Self {
            aggregation_type,
            field: field.into(),
            include_pattern: None,
            exclude_pattern: None,
        }
    }

    /// Create a term aggregation
    pub fn term(field: impl Into<String>) -> Self {
        Self::new(FieldAggregationType::Term, field)
    }

    /// Only bucket terms matching this pattern
    pub fn with_include(mut self, pattern: impl Into<String>) -> Self {
        self.include_pattern = Some(pattern.into());
        self
    }

    /// Skip terms matching this pattern
    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_pattern = Some(pattern.into());
        self
    }
}

impl PartialEq for FieldAggregation {
    fn eq(&self, other: &Self) -> bool {
        self.aggregation_type == other.aggregation_type && self.field == other.field
    }
}

impl Eq for FieldAggregation {}

impl Hash for FieldAggregation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.aggregation_type.hash(state);
        self.field.hash(state);
    }
}

/// Outcome of parsing an aggregation string
#[derive(Clone, Debug, Default, Serialize)]
pub struct FieldAggregationsResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub uses_premium_features: bool,
    pub aggregations: HashSet<FieldAggregation>,
}

impl FieldAggregationsResult {
    fn failed(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        debug!(%message, "rejected aggregation request");
        self.is_valid = false;
        self.message = Some(message);
        self
    }
}

/// Parser and validator for aggregation strings
#[derive(Clone, Debug, Default)]
pub struct FieldAggregationProcessor {
    config: QueryConfig,
}

impl FieldAggregationProcessor {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    /// Parse `aggregations`; when `apply_rules` is set also enforce the request limits
    pub fn process(&self, aggregations: &str, apply_rules: bool) -> FieldAggregationsResult {
        let mut result = FieldAggregationsResult::default();
        if aggregations.trim().is_empty() {
            result.is_valid = true;
            return result;
        }

        let tokens: Vec<&str> = aggregations.split(',').filter(|t| !t.is_empty()).collect();

        for token in &tokens {
            let parts: Vec<&str> = token.split(':').collect();
            if parts.len() != 2 {
                return result.failed(format!("Invalid aggregation: {}", token));
            }

            let kind = parts[0].trim().to_lowercase();
            let field = parts[1].trim().to_lowercase();
            if kind.is_empty() || field.is_empty() {
                return result.failed(format!("Invalid type: {} or field: {}", kind, field));
            }

            let field = index_field_name(&field);
            let aggregation_type = match kind.parse::<FieldAggregationType>() {
                Ok(aggregation_type) => aggregation_type,
                Err(_) => {
                    return result.failed(format!(
                        "Invalid type: {} for aggregation: {}",
                        kind, token
                    ))
                }
            };

            result
                .aggregations
                .insert(FieldAggregation::new(aggregation_type, field));
        }

        if result
            .aggregations
            .iter()
            .any(|a| !self.config.is_free_aggregation_field(&a.field))
        {
            result.uses_premium_features = true;
        }

        if apply_rules {
            if result.aggregations.len() > self.config.max_aggregations {
                return result.failed("Aggregation count exceeded");
            }

            if result.aggregations.len() != tokens.len() {
                return result.failed("Duplicate aggregation detected");
            }

            let distinct = result
                .aggregations
                .iter()
                .filter(|a| a.aggregation_type == FieldAggregationType::Distinct)
                .count();
            if distinct > self.config.max_distinct_aggregations {
                return result.failed("Distinct aggregation count exceeded");
            }

            let mut invalid: Vec<&str> = result
                .aggregations
                .iter()
                .filter(|a| !self.config.is_numeric_aggregation_field(&a.field))
                .map(|a| a.field.as_str())
                .collect();
            if !invalid.is_empty() {
                invalid.sort_unstable();
                let message = format!("Aggregation field is not allowed: {}", invalid.join(", "));
                return result.failed(message);
            }
        }

        result.is_valid = true;
        result
    }
}

/// Map `data.*` to its numeric index field and `ref.*` to its reference index field
fn index_field_name(field: &str) -> String {
    if let Some(rest) = field.strip_prefix("data.") {
        format!("idx.{}-n", rest)
    } else if let Some(rest) = field.strip_prefix("ref.") {
        format!("idx.{}-r", rest)
    } else {
        field.to_string()
    }
}
