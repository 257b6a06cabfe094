pub mod config;
pub mod error;
pub mod query;

pub use config::QueryConfig;
pub use error::{QueryError, Result};
pub use query::{
    EventStackFilter, EventStackFilterQueryResult, FieldAggregationProcessor,
    FieldAggregationsResult, QueryMode, QueryProcessResult, QueryProcessor,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
