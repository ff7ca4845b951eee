use std::env;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use docrag_cli::{init_tracing, parse_ingest_args, App};
use docrag_core::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_ingest_args(&args).map_err(|e| {
        eprintln!("Usage: docrag-ingest <path> --user <id>");
        e
    })?;
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let app = App::build(config.settings()?, Path::new(".")).await?;

    let files = app.ingestor.list_files(&args.path);
    println!("Ingesting {} files from {} for {}", files.len(), args.path.display(), args.user);
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{msg} [{bar:40}] {pos}/{len}")?);
    pb.set_message("Documents");

    let report = app
        .ingestor
        .ingest_path(&args.path, &args.user, |outcome| {
            if let Some(error) = &outcome.error {
                pb.println(format!("  failed {}: {}", outcome.document, error));
            }
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    println!("Indexed {} chunks from {} documents ({} failed)", report.total_chunks(), report.succeeded(), report.failed());
    if report.failed() > 0 && report.succeeded() == 0 {
        std::process::exit(1);
    }
    Ok(())
}
