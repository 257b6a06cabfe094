use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use event_query::{
    EventStackFilter, FieldAggregationProcessor, QueryConfig, QueryMode, QueryProcessor,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "event-query")]
#[command(about = "Validate, expand and scope event filter queries", long_about = None)]
struct Args {
    /// JSON file overriding the default field policy
    #[arg(long, global = true, env = "EVENT_QUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand extended data fields and report premium usage
    Process { query: String },

    /// Report premium usage without rewriting the query
    Validate { query: String },

    /// Parse an aggregation string such as `avg:value,distinct:data.user`
    Aggregations {
        aggregations: String,

        /// Skip the count, duplicate and field rules
        #[arg(long)]
        no_rules: bool,
    },

    /// Rewrite a query for the stack or event index
    Filter {
        query: String,

        /// Target shape (stacks, inverted-stacks, events)
        #[arg(long, default_value = "stacks")]
        mode: QueryMode,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => QueryConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => QueryConfig::default(),
    };
    info!(version = event_query::VERSION, "event-query starting");

    match args.command {
        Command::Process { query } => {
            let result = QueryProcessor::new(config).process(&query);
            print_result(args.json, &result, || {
                format!(
                    "valid: {}\npremium: {}\nquery: {}{}",
                    result.is_valid,
                    result.uses_premium_features,
                    result.expanded_query.as_deref().unwrap_or_default(),
                    message_line(result.message.as_deref())
                )
            })?;
        }
        Command::Validate { query } => {
            let result = QueryProcessor::new(config).validate(&query);
            print_result(args.json, &result, || {
                format!(
                    "valid: {}\npremium: {}{}",
                    result.is_valid,
                    result.uses_premium_features,
                    message_line(result.message.as_deref())
                )
            })?;
        }
        Command::Aggregations {
            aggregations,
            no_rules,
        } => {
            let result = FieldAggregationProcessor::new(config).process(&aggregations, !no_rules);
            print_result(args.json, &result, || {
                let mut fields: Vec<String> = result
                    .aggregations
                    .iter()
                    .map(|a| format!("{}:{}", a.aggregation_type, a.field))
                    .collect();
                fields.sort();
                format!(
                    "valid: {}\npremium: {}\naggregations: {}{}",
                    result.is_valid,
                    result.uses_premium_features,
                    fields.join(","),
                    message_line(result.message.as_deref())
                )
            })?;
        }
        Command::Filter { query, mode } => {
            let result = EventStackFilter::new().run(&query, mode);
            print_result(args.json, &result, || {
                format!(
                    "valid: {}\nquery: {}\ninvert successful: {}\nstack specific: {}\nstatus open: {}{}",
                    result.is_valid,
                    result.query,
                    result.is_invert_successful,
                    result.has_stack_specific_criteria,
                    result.has_status_open,
                    message_line(result.message.as_deref())
                )
            })?;
        }
    }

    Ok(())
}

fn message_line(message: Option<&str>) -> String {
    message
        .map(|m| format!("\nmessage: {}", m))
        .unwrap_or_default()
}

fn print_result<T: Serialize>(json: bool, result: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
