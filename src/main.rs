use clap::{Parser, Subcommand};
use std::time::Duration;

use esma_registers::config::Config;
use esma_registers::datasets::{self, Dataset};
use esma_registers::logging;
use esma_registers::pipeline;

#[derive(Parser)]
#[command(name = "esma_registers")]
#[command(about = "ESMA MiCA interim register watcher: normalize, diff, publish")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the named registers sequentially (default: all)
    Run {
        /// Comma-separated dataset names. Available: casps, non_compliant
        #[arg(long)]
        datasets: Option<String>,
    },
    /// List the supported datasets
    List,
}

fn select_datasets(names: Option<&str>) -> anyhow::Result<Vec<Box<dyn Dataset>>> {
    match names {
        None => Ok(datasets::all_datasets()),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                datasets::create_dataset(name).ok_or_else(|| {
                    anyhow::anyhow!(
                        "unknown dataset '{}' (supported: {})",
                        name,
                        datasets::supported_names().join(", ")
                    )
                })
            })
            .collect(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::List => {
            for name in datasets::supported_names() {
                println!("{name}");
            }
        }
        Commands::Run { datasets: names } => {
            let selected = select_datasets(names.as_deref())?;
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.download_timeout_secs))
                .build()?;

            let refreshing: Vec<&str> = selected.iter().map(|d| d.name()).collect();
            println!("🔄 Refreshing registers: {}", refreshing.join(", "));
            let outcomes = pipeline::run_all(&selected, &config, &client).await;

            let mut results = serde_json::Map::new();
            let mut failures = 0usize;
            for (name, outcome) in &outcomes {
                match outcome {
                    Ok(result) => {
                        println!(
                            "📊 {}: {} rows ({} new, {} updated, {} removed) → {}",
                            result.dataset,
                            result.rows,
                            result.diff.new.len(),
                            result.diff.updated.len(),
                            result.diff.removed.len(),
                            config.out_dir.display()
                        );
                        results.insert(name.clone(), serde_json::to_value(result)?);
                    }
                    Err(e) => {
                        failures += 1;
                        println!("⚠️  {name} failed: {e}");
                        results.insert(
                            name.clone(),
                            serde_json::json!({ "error": e.to_string() }),
                        );
                    }
                }
            }

            println!("{}", serde_json::to_string_pretty(&serde_json::Value::Object(results))?);
            if failures == outcomes.len() {
                anyhow::bail!("all dataset runs failed");
            }
        }
    }
    Ok(())
}
