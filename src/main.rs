use anyhow::Context;
use clap::{Parser, Subcommand};
use company_research::config::{Config, ResearchConfig};
use company_research::utils::init_tracing;
use company_research::{run, ConversationHistory, ResearchDeps, RunOutcome};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Research settings file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip the critic and deliver the first valid draft
    #[arg(long, global = true)]
    no_critique: bool,

    /// Print structured results as JSON instead of markdown
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a single research request
    Ask {
        /// The research request
        message: String,
    },
    /// Interactive session; the knowledge base and history carry across turns
    Chat,
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    } else {
        println!("{}", outcome.result.to_markdown());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = &args.config {
        config.research = ResearchConfig::from_file(path)?;
    }
    if args.no_critique {
        config.research.critique_enabled = false;
    }

    let _guard = init_tracing(&config.logging)?;
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        critique = config.research.critique_enabled,
        "Configuration loaded"
    );

    let mut deps = ResearchDeps::from_config(&config)?;

    match args.command {
        Command::Ask { message } => {
            let outcome = run(&message, &mut deps, ConversationHistory::new())
                .await
                .context("research turn failed")?;
            print_outcome(&outcome, args.json)?;
        }
        Command::Chat => {
            let mut history = ConversationHistory::new();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                std::io::stdout().flush()?;
                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let message = line.trim();
                if message.is_empty() {
                    continue;
                }
                if matches!(message, "exit" | "quit") {
                    break;
                }

                // a failed turn is not recorded in history
                match run(message, &mut deps, history.clone()).await {
                    Ok(outcome) => {
                        print_outcome(&outcome, args.json)?;
                        history = outcome.new_history;
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
    }

    Ok(())
}
