use std::env;
use std::path::Path;

use docrag_cli::{init_tracing, parse_query_args, App};
use docrag_core::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_query_args(&args, settings.retrieval.default_k).map_err(|e| {
        eprintln!("Usage: docrag-query \"<question>\" --user <id> [--k N] [--threshold T] [--no-rerank] [--hybrid] [--answer]");
        e
    })?;
    let app = App::build(settings, Path::new(".")).await?;

    let context = app.retriever.get_context(&args.question, &args.user, &args.config).await?;
    println!("Found {} results for: \"{}\"", context.total_chunks, args.question);
    for (i, c) in context.citations.iter().enumerate() {
        let page = c.page_number.map(|p| format!(" p.{p}")).unwrap_or_default();
        println!("\n  {}. score={:.4}  {}{}  chunk={}  doc={}", i + 1, c.relevance_score, c.filename, page, c.chunk_index, c.document_id);
        println!("     {}", c.snippet);
    }
    println!("\n--- context ---\n{}", context.formatted_context);

    if args.answer {
        let answer = app.answerer()?.answer(&args.question, &args.user, &args.config, &[]).await?;
        println!("\n--- answer ---\n{}", answer.answer);
    }
    Ok(())
}
