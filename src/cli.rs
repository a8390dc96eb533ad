//! CLI module for Sensemaker
//!
//! Provides subcommands for serving, one-off queries, job submission and
//! pool inspection.

use anyhow::Result;
use clap::{Parser, Subcommand};
use sensemaker_core::{format_error_for_cli, Job, JobQueue, PipelineRequest};
use sensemaker_llm::MessageRole;
use serde_json::Value;

use crate::server::{self, services, Services};

/// Sensemaker - multi-agent question answering
#[derive(Parser)]
#[command(name = "sensemaker")]
#[command(about = "Multi-agent question answering with a durable job queue", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Answer one query through the pipeline
    Ask {
        /// Query text
        query: String,
        /// Conversation the exchange is stored under
        #[arg(short, long, default_value = "cli")]
        conversation: String,
        /// Matter whose attachments join the context
        #[arg(short, long)]
        matter: Option<String>,
    },
    /// Append a job to the durable queue
    Enqueue {
        /// Registered method name
        method: String,
        /// Params; each is parsed as JSON and falls back to a plain string
        params: Vec<String>,
        /// Retries after failure
        #[arg(short, long)]
        attempts: Option<u32>,
    },
    /// List pool members and the models they serve
    Models,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => server::run().await,
        Commands::Ask {
            query,
            conversation,
            matter,
        } => ask(query, conversation, matter).await,
        Commands::Enqueue {
            method,
            params,
            attempts,
        } => enqueue(method, params, attempts).await,
        Commands::Models => models().await,
    }
}

async fn ask(query: String, conversation: String, matter: Option<String>) -> Result<()> {
    let services = Services::from_config(server::load_config()?).await?;

    services
        .store
        .append_message(&conversation, MessageRole::User, &query)
        .await
        .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;

    let mut request = PipelineRequest::new(&conversation, &query);
    request.matter_id = matter;

    match services.pipeline.handle_request(request).await {
        Ok(response) => {
            println!("{}", response.content);
            println!();
            println!("answered by: {}", response.agents.join(", "));
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(format_error_for_cli(&e))),
    }
}

async fn enqueue(method: String, params: Vec<String>, attempts: Option<u32>) -> Result<()> {
    let config = server::load_config()?;
    let store = services::open_list_store(&config)?;
    let default_attempts = config.queue.attempts;
    let queue = JobQueue::new(config.queue, store);

    let job = Job::new(method, params.iter().map(|p| parse_param(p)).collect())
        .with_attempts(attempts.unwrap_or(default_attempts));
    let job = queue
        .add_job(job)
        .await
        .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;

    println!("queued {} ({})", job.id, job.method);
    Ok(())
}

async fn models() -> Result<()> {
    let config = server::load_config()?;
    let pool = services::build_pool(&config).await?;

    println!("default model: {}", pool.default_model());
    for member in pool.members() {
        println!(
            "{:<20} {:<14} {}",
            member.id,
            format!("{:?}", member.status).to_lowercase(),
            member.models.join(", ")
        );
    }
    Ok(())
}

/// Parse a CLI param as JSON, keeping it as a string when it is not valid JSON
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), json!(42));
        assert_eq!(parse_param("{\"a\":1}"), json!({ "a": 1 }));
        assert_eq!(parse_param("\"quoted\""), json!("quoted"));
        assert_eq!(parse_param("plain text"), json!("plain text"));
    }

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::parse_from(["sensemaker"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["sensemaker", "enqueue", "IngestDocument", "text", "-a", "2"]);
        match cli.command {
            Some(Commands::Enqueue {
                method,
                params,
                attempts,
            }) => {
                assert_eq!(method, "IngestDocument");
                assert_eq!(params, vec!["text".to_string()]);
                assert_eq!(attempts, Some(2));
            }
            _ => panic!("expected enqueue"),
        }
    }
}
