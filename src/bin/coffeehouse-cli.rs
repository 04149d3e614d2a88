use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "coffeehouse-cli")]
#[command(about = "Inspect a running Cosmic Coffeehouse API server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3001")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Prometheus exposition
    Metrics {
        /// Only print series whose metric name starts with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Metrics { prefix } => {
            let res = client.get(format!("{}/metrics", cli.url)).send().await?;
            if !res.status().is_success() {
                eprintln!("Error: server returned status {}", res.status());
                return Ok(());
            }
            let text = res.text().await?;
            for line in filter_exposition(&text, prefix.as_deref()) {
                println!("{}", line);
            }
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

/// Keep sample and comment lines of metrics matching `prefix`.
fn filter_exposition<'a>(text: &'a str, prefix: Option<&'a str>) -> impl Iterator<Item = &'a str> {
    text.lines().filter(move |line| {
        let Some(prefix) = prefix else { return true };
        let name = line
            .strip_prefix("# HELP ")
            .or_else(|| line.strip_prefix("# TYPE "))
            .unwrap_or(line);
        name.starts_with(prefix)
    })
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
