use anyhow::Context;
use clap::Parser;
use retriever_client::cli::{Cli, Commands};
use retriever_client::{Retriever, RetrieverError, StderrIndicator};
use domain::VideoRecord;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "retriever_client=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("tubegrab error: {err:#}");
        if let Some(RetrieverError::Server {
            details: Some(details),
            ..
        }) = err.downcast_ref::<RetrieverError>()
        {
            eprintln!("  {details}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut retriever = Retriever::new(&cli.server)
        .with_context(|| format!("bad --server value '{}'", cli.server))?
        .with_indicator(StderrIndicator);

    match cli.command {
        Commands::Search { query } => {
            let record = retriever.search(&query.join(" ")).await?;
            print_record(record);
        }
        Commands::Get { query, kind, out } => {
            let record = retriever.search(&query.join(" ")).await?;
            print_record(record);
            let saved = retriever.download(kind.into(), &out).await?;
            println!("saved {} ({} bytes)", saved.path.display(), saved.bytes);
        }
        Commands::Download { url, kind, out } => {
            let saved = retriever.download_url(&url, kind.into(), &out).await?;
            println!("saved {} ({} bytes)", saved.path.display(), saved.bytes);
        }
    }
    Ok(())
}

fn print_record(record: &VideoRecord) {
    println!("{}", record.title);
    println!("  channel:  {}", record.channel_name);
    println!("  duration: {}", record.duration_label);
    println!("  views:    {}", record.view_count_label);
    println!("  url:      {}", record.canonical_url);
}
