use clap::Parser;
use common::Config;
use pressroom::ingestion::{self, FetchOptions};
use std::path::PathBuf;

/// Fetch every configured source once and print what it returns.
#[derive(Parser, Debug)]
#[command(name = "check_sources")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Entries printed per source
    #[arg(long, default_value_t = 3)]
    entries: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let default_path = PathBuf::from("config.default.toml");
    let config = Config::load_with_defaults(
        default_path.exists().then_some(default_path.as_path()),
        args.config.as_deref(),
    )
    .await?;

    let opts = FetchOptions {
        timeout_secs: config.fetch_timeout_seconds(),
        max_retries: config.max_retries(),
        user_agent: config.user_agent(),
        ..FetchOptions::default()
    };

    for source in config.sources() {
        println!("\n{}", "=".repeat(60));
        println!("Source: {} ({})", source.name, source.url);
        println!("{}", "=".repeat(60));

        match ingestion::fetch_and_parse_feed(&source.url, &opts).await {
            Ok(feed) => {
                println!("✓ Success!");
                println!("  Title: {:?}", feed.title.as_ref().map(|t| &t.content));
                println!("  Entries: {}", feed.entries.len());

                for (i, entry) in feed.entries.iter().take(args.entries).enumerate() {
                    println!("    {}. {}", i + 1, ingestion::entry_title(entry));
                    println!(
                        "       URL: {}",
                        ingestion::entry_link(entry).unwrap_or_else(|| "none".to_string())
                    );
                    println!("       Body: {} chars", ingestion::entry_body(entry).len());
                }
            }
            Err(e) => {
                println!("✗ Failed: {:#}", e);
            }
        }
    }
    Ok(())
}
