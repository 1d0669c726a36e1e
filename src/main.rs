use traffic_rag::api;
use traffic_rag::config::AppConfig;
use traffic_rag::extractor;
use traffic_rag::fetcher;
use traffic_rag::rag::{QueryResponse, RagPipeline, DEFAULT_TOP_K};
use traffic_rag::renderer;
use traffic_rag::uploader;

use clap::{Parser, Subcommand};
use colored::Colorize;
use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Traffic-incident RAG demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM provider: openai, anthropic or ollama
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Override the provider's default model
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch incidents and render them as PDFs plus a metadata sidecar
    Fetch {
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Extract PDFs from a directory and index them into the vector store
    Ingest {
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Upload a directory of PDFs to a running indexing server
    Upload {
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long, default_value = "http://localhost:5001")]
        endpoint: String,
    },

    /// Ask a question; without TEXT an interactive prompt opens
    Query {
        text: Option<String>,

        #[arg(long)]
        top_k: Option<u64>,
    },

    /// Run the upload-and-query HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> CliResult {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;

    if let Some(provider) = &cli.provider {
        config.llm_provider = provider.clone();
    }
    // Providers read their model from the environment; a --model flag simply
    // pre-seeds that variable.
    if let Some(model) = &cli.model {
        std::env::set_var(
            format!("{}_MODEL", config.llm_provider.to_uppercase()),
            model,
        );
    }

    match cli.command {
        Command::Fetch { limit, output } => run_fetch(&config, limit, output).await,
        Command::Ingest { dir } => run_ingest(&config, dir).await,
        Command::Upload { dir, endpoint } => run_upload(&config, dir, &endpoint).await,
        Command::Query { text, top_k } => run_query(&config, text, top_k).await,
        Command::Serve { port } => run_serve(&config, port).await,
    }
}

async fn run_fetch(config: &AppConfig, limit: Option<usize>, output: Option<PathBuf>) -> CliResult {
    let limit = limit.unwrap_or(config.api_limit);
    let out_dir = output.unwrap_or_else(|| config.pdf_dir.clone());

    let client = reqwest::Client::new();
    let raw = fetcher::fetch_incidents(&client, &config.api_url, limit).await?;
    let records = fetcher::preprocess(raw);

    let pdf_files = renderer::render_incident_pdfs(&records, &out_dir)?;
    let metadata = renderer::write_metadata_json(&records, &config.api_url, &out_dir)?;

    println!(
        "{}",
        format!(
            "Rendered {} PDF files into {}",
            pdf_files.len(),
            out_dir.display()
        )
        .bright_green()
    );
    println!("Metadata written to {}", metadata.display());
    println!("The PDFs are now ready for ingestion into the RAG system");
    Ok(())
}

async fn run_ingest(config: &AppConfig, dir: Option<PathBuf>) -> CliResult {
    let dir = dir.unwrap_or_else(|| config.pdf_dir.clone());
    let pipeline = RagPipeline::new(config).await?;

    let documents = extractor::collect_documents(&dir)?;
    if documents.is_empty() {
        println!("{}", "No documents were processed successfully".yellow());
        return Ok(());
    }

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    for (id, text) in &documents {
        pb.set_message(id.clone());
        pipeline
            .add_documents(std::slice::from_ref(text), Some(vec![id.clone()]))
            .await?;
        pb.inc(1);
    }
    pb.finish_with_message("Ingestion complete");

    let query = "What are the recent traffic incidents in Austin?";
    println!("\n{}", "Test Query Results:".bold());
    let response = pipeline.query(query, DEFAULT_TOP_K).await?;
    print_query_response(&response);
    Ok(())
}

async fn run_upload(config: &AppConfig, dir: Option<PathBuf>, endpoint: &str) -> CliResult {
    let dir = dir.unwrap_or_else(|| config.pdf_dir.clone());
    let client = reqwest::Client::new();

    let (uploaded, failed) = uploader::upload_directory(&client, endpoint, &dir).await?;
    println!(
        "{}",
        format!("Upload complete! {} uploaded, {} failed", uploaded, failed).bright_green()
    );
    Ok(())
}

async fn run_query(config: &AppConfig, text: Option<String>, top_k: Option<u64>) -> CliResult {
    let pipeline = RagPipeline::new(config).await?;
    let top_k = top_k.unwrap_or(DEFAULT_TOP_K);

    if let Some(text) = text {
        let response = pipeline.query(&text, top_k).await?;
        print_query_response(&response);
        return Ok(());
    }

    if !pipeline.has_llm() {
        println!(
            "{}",
            "No LLM provider configured; showing retrieved documents only".yellow()
        );
    }
    println!("Ask about traffic incidents (CTRL-D to exit)");

    let mut rl = Editor::<(), DefaultHistory>::new()?;
    loop {
        match rl.readline("❓ ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                match pipeline.query(input, top_k).await {
                    Ok(response) => print_query_response(&response),
                    Err(e) => println!("{}", format!("Query failed: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_serve(config: &AppConfig, port: Option<u16>) -> CliResult {
    let port = port.unwrap_or(config.server_port);
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    let pipeline = Arc::new(RagPipeline::new(config).await?);
    let app = api::create_api(pipeline, config.upload_dir.clone());

    info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    println!("Server successfully bound to {}", addr);
    println!("Ready to accept connections!");

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}

fn print_query_response(response: &QueryResponse) {
    if response.documents.is_empty() {
        println!("{}", "No relevant documents found".yellow());
    }

    for (i, doc) in response.documents.iter().enumerate() {
        println!("\n{}", format!("Result {}:", i + 1).bold());
        println!("Document: {}", doc.id.bright_yellow());
        println!("Score: {:.4}", doc.score);
        let preview: String = doc.text.chars().take(300).collect();
        println!("Text: {}...", preview);
    }

    if let Some(answer) = &response.llm_response {
        println!("\n{}", "LLM Response:".bold());
        println!("{}", answer.bright_green());
    }
}
