//! Analyst Agency REPL
//!
//! Interactive front end: load a dataset, ask questions, inspect the last
//! plan. Configuration comes from the environment (see `AnalystConfig`).

use anyhow::Result;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use analyst_agency::orchestrator::{SessionStore, Supervisor, TurnResponse};
use analyst_agency::tools::CodeRunner;
use analyst_agency::utils::telemetry::init_tracing;
use analyst_agency::AnalystConfig;

const SESSION_ID: &str = "repl";

const HELP: &str = "\
  load <path>    Load a CSV/Excel/JSON/Parquet file as `df`
  model <name>   Switch the model for this session
  plan           Show the last plan
  history        Show the conversation so far
  clear          Forget the dataset and history
  help           Show this list
  quit           Exit";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    let config = AnalystConfig::from_env()?;

    // Keep the guard alive so the log file is flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    println!("\n{}", "═".repeat(60));
    println!("📊 Analyst Agency v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("Router | Planner | Agents | Integrator | Sessions");
    println!("{}\n", "═".repeat(60));

    let provider = config.build_provider();
    let runner = Arc::new(config.build_runner());
    let sessions = Arc::new(SessionStore::new(config.model.clone()));
    let supervisor = Supervisor::new(provider, sessions.clone())
        .with_runner(runner.clone() as Arc<dyn CodeRunner>)
        .with_history_window(config.history_window);

    info!("Using {:?} provider with model {}", config.provider, config.model);
    println!("🧠 Model: {}", config.model);
    println!("\n💡 Commands:\n{}\n", HELP);

    loop {
        print!("📝 You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let query = input.trim();
        if query.is_empty() {
            continue;
        }

        let (command, argument) = match query.split_once(char::is_whitespace) {
            Some((head, rest)) => (head.to_lowercase(), rest.trim()),
            None => (query.to_lowercase(), ""),
        };

        match command.as_str() {
            "quit" | "exit" | "q" => {
                println!("\n👋 Goodbye!\n");
                break;
            }
            "help" => {
                println!("\n{}\n", HELP);
                continue;
            }
            "load" if !argument.is_empty() => {
                match runner.profile_dataset(Path::new(argument)).await {
                    Ok(dataset) => {
                        println!("\n📂 Loaded '{}'\n{}\n", dataset.name, dataset.profile.trim());
                        sessions.load_dataset(SESSION_ID, dataset).await;
                    }
                    Err(e) => println!("❌ Could not load dataset: {}\n", e),
                }
                continue;
            }
            "model" if !argument.is_empty() => {
                sessions.set_model(SESSION_ID, argument).await;
                println!("\n🧠 Model set to {}\n", argument);
                continue;
            }
            "plan" if argument.is_empty() => {
                match sessions.snapshot(SESSION_ID).await.and_then(|ctx| ctx.last_plan) {
                    Some(plan) => println!("\n📋 {}\n", plan.summary()),
                    None => println!("\nNo plan yet.\n"),
                }
                continue;
            }
            "history" if argument.is_empty() => {
                let transcript = sessions
                    .snapshot(SESSION_ID)
                    .await
                    .map(|ctx| ctx.history.transcript())
                    .unwrap_or_default();
                println!("\n📜 Conversation History:\n{}\n", transcript);
                continue;
            }
            "clear" if argument.is_empty() => {
                sessions.remove(SESSION_ID).await;
                println!("\n🗑️  Dataset and history cleared.\n");
                continue;
            }
            _ => {}
        }

        println!("\n⚙️  Processing...\n");
        let response = supervisor.run_turn(query, SESSION_ID).await;
        print_response(&response);
    }

    Ok(())
}

fn print_response(response: &TurnResponse) {
    if let Some(summary) = &response.plan_summary {
        println!("📋 {}\n", summary);
    }

    let status = if response.is_success() { "✅" } else { "⚠️" };
    println!("{} Response ({}):", status, response.mode);
    println!("{}", "─".repeat(50));
    println!("{}", response.final_response);
    println!("{}\n", "─".repeat(50));
}
