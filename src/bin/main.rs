//! Weaver CLI - run report invocations against the configured platform
//!
//! Usage:
//!   weaver run --prompt "open tickets for Acme" --table Customers [--table "Customer Support Tickets"]
//!   weaver validate
//!   weaver tables
//!
//! Examples:
//!   weaver run --prompt "recent tickets" --table "Customer Support Tickets" --entity Acme --limit 25
//!   weaver run --prompt "tickets per customer" --table Customers --table "Customer Support Tickets" --date-value 2 --date-unit w

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use weaver::agent::{Agent, InvocationParams};
use weaver::config::Settings;

#[derive(Parser)]
#[command(name = "weaver")]
#[command(about = "Weaver - agent-driven reports over a tabular data platform")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "weaver.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one invocation and print the response envelope
    Run {
        /// The originating natural-language prompt
        #[arg(short, long)]
        prompt: String,

        /// Table name(s); two names select the parent+child mode
        #[arg(short, long = "table", required = true)]
        tables: Vec<String>,

        /// Entity name(s) to match against search fields
        #[arg(short, long = "entity")]
        entities: Vec<String>,

        /// Record ceiling for the primary query
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Relative date window size
        #[arg(long)]
        date_value: Option<u32>,

        /// Relative date window unit (d, w, m, y)
        #[arg(long)]
        date_unit: Option<String>,

        /// Field label to sort by (exact match)
        #[arg(long)]
        sort_field: Option<String>,

        /// Sort direction (ASC or DESC)
        #[arg(long)]
        sort_order: Option<String>,
    },

    /// Check the configuration without talking to the platform
    Validate,

    /// List the configured tables and their allow-listed fields
    Tables,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = match Settings::from_file(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run {
            prompt,
            tables,
            entities,
            limit,
            date_value,
            date_unit,
            sort_field,
            sort_order,
        } => {
            let agent = match Agent::from_settings(settings) {
                Ok(agent) => agent,
                Err(err) => {
                    eprintln!("Failed to assemble services: {err}");
                    return ExitCode::FAILURE;
                }
            };
            let params = InvocationParams {
                prompt,
                table_names: tables,
                entity_names: entities,
                limit,
                date_filter_value: date_value,
                date_filter_unit: date_unit,
                sort_field,
                sort_order,
            };
            let response = agent.invoke(params);
            match serde_json::to_string_pretty(&response) {
                Ok(body) => println!("{body}"),
                Err(err) => {
                    eprintln!("Failed to render response: {err}");
                    return ExitCode::FAILURE;
                }
            }
            if response.ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Validate => {
            println!(
                "Configuration OK: {} table(s), realm {}",
                settings.tables.len(),
                settings.platform.realm
            );
            ExitCode::SUCCESS
        }

        Commands::Tables => {
            for table in &settings.tables {
                println!("{} ({})", table.name, table.id);
                for field in &table.fields {
                    match field.role {
                        Some(role) => println!("  {} [{role:?}]", field.label),
                        None => println!("  {}", field.label),
                    }
                }
            }
            ExitCode::SUCCESS
        }
    }
}
