//! mcp-chat-client - ask questions answered by a model that can call the
//! tools of a local MCP server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use mcp_chat_client::agent_core::{Orchestrator, QuestionOutcome};
use mcp_chat_client::config::{find_config_path, load_config};
use mcp_chat_client::inference::InferenceClient;
use mcp_chat_client::mcp_client::{bootstrap, spawn_server};
use mcp_chat_client::shell::{unless_interrupted, Shell, ThreadedLines};
use mcp_chat_client::{init_tracing, LogTarget};

/// Chat with a model that can use an MCP server's tools
#[derive(Parser)]
#[command(name = "mcp-chat-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to $MCP_CHAT_CLIENT_CONFIG, then
    /// mcp-chat-client.yaml in this or a parent directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,

    /// Ask one question, print the answer and exit
    #[arg(short, long, value_name = "QUESTION")]
    ask: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = if cli.log_stderr {
        LogTarget::Stderr
    } else {
        LogTarget::File
    };
    init_tracing(target).context("failed to set up logging")?;

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_path(&std::env::current_dir()?)?,
    };
    let config = load_config(&config_path)?;

    let server = spawn_server(&config.server)?;
    let client_info = config.client_info();
    let handshake = unless_interrupted(
        bootstrap(&server.client, &client_info),
        tokio::signal::ctrl_c(),
    )
    .await;
    let catalog = match handshake {
        Some(Ok(catalog)) => catalog,
        Some(Err(e)) => {
            server.shutdown().await;
            return Err(e).context("could not start a session with the tool host");
        }
        None => {
            tracing::info!("interrupted during startup");
            server.shutdown().await;
            return Ok(());
        }
    };

    let completion = InferenceClient::from_config(config.model.clone())?;
    tracing::info!(
        model = completion.model_name(),
        endpoint = %completion.endpoint(),
        "completion client ready"
    );
    let mut agent = Orchestrator::new(
        completion,
        server.client.clone(),
        &catalog,
        config.agent.clone(),
    );

    let session = async {
        match cli.ask {
            Some(question) => {
                let report = agent.ask(&question).await?;
                match report.outcome {
                    QuestionOutcome::Answer(text) | QuestionOutcome::ForcedAnswer(text) => {
                        println!("{text}");
                    }
                    QuestionOutcome::Unresolved(_) => {
                        eprintln!("The model kept requesting tools and gave no final answer.");
                    }
                }
                Ok::<_, anyhow::Error>(())
            }
            None => {
                let mut shell = Shell::new(
                    catalog,
                    server.client.clone(),
                    agent,
                    ThreadedLines::stdin(),
                    tokio::io::stdout(),
                );
                shell.run().await
            }
        }
    };

    let result = match unless_interrupted(session, tokio::signal::ctrl_c()).await {
        Some(result) => result,
        None => {
            tracing::info!("interrupted");
            println!();
            Ok(())
        }
    };

    server.shutdown().await;
    result
}
