use anyhow::Result;
use clap::Parser;
use ocean_insights::config::AppConfig;
use ocean_insights::engine::InsightEngine;
use ocean_insights::render;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ocean-insights")]
#[command(about = "Answer free-text questions about ocean float measurements")]
struct Args {
    /// The question in natural language
    query: String,

    /// Path to the bundled fallback dataset
    #[arg(long)]
    demo_data: Option<PathBuf>,

    /// Path to the query log database
    #[arg(long)]
    log_db: Option<PathBuf>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Skip the live data tier
    #[arg(long)]
    offline: bool,

    /// Write the summary and visualizations to this HTML file
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if let Some(path) = args.demo_data {
        config.demo_data_path = path;
    }
    if let Some(path) = args.log_db {
        config.log_db_path = path;
    }
    if let Some(key) = args.api_key {
        config.openai_api_key = Some(key);
    }
    if args.offline {
        config.live_fetch_enabled = false;
    }

    info!("Query: {}", args.query);

    let engine = InsightEngine::from_config(&config)?;
    let answer = engine.answer(&args.query).await?;

    println!("\n=== Ocean Insights ===");
    println!(
        "Region: {} | Type: {:?} | Rows: {}",
        answer.params.region, answer.params.query_type, answer.rows
    );
    println!("{}", answer.response.summary);

    if let Some(out) = args.out {
        let page = render::standalone_page(
            &args.query,
            &answer.response.summary,
            &answer.response.plot_html,
            &answer.response.map_html,
        );
        std::fs::write(&out, page)?;
        println!("Wrote visualizations to {}", out.display());
    }

    Ok(())
}
