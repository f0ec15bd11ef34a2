use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use pdfrag::{
    api, config, logging,
    pipeline::{
        AnswerStream, CollectionHandle, Conversation, IngestOptions, PartialAnswer, RagService,
    },
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "pdfrag",
    version,
    about = "Ask questions about a PDF using local models"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a document into a fresh collection and print its handle.
    Ingest {
        file: PathBuf,
        /// Replace this collection instead of creating a new one.
        #[arg(long)]
        collection: Option<String>,
    },
    /// Ask a single question against an existing collection.
    Ask {
        #[arg(long)]
        collection: String,
        /// Wait for the whole answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,
        question: String,
    },
    /// Interactive session: `/load <file>`, `/clear`, `/exit`.
    Chat { file: Option<PathBuf> },
    /// List collections in the vector store.
    Collections,
    /// Serve the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();
    let service = RagService::from_config(config).context("failed to initialize services")?;

    match cli.command {
        Command::Ingest { file, collection } => {
            let handle = service
                .ingest_with(&file, IngestOptions { collection })
                .await
                .with_context(|| format!("failed to ingest {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&handle)?);
        }
        Command::Ask {
            collection,
            no_stream,
            question,
        } => {
            let handle = service
                .open_collection(&collection)
                .await
                .with_context(|| format!("failed to open collection {collection}"))?;
            if no_stream {
                let answer = service.answer(&handle, &question, &[]).await?;
                println!("{answer}");
            } else {
                let stream = service.answer_stream(&handle, &question, &[]);
                print_stream(stream).await?.into_result()?;
            }
        }
        Command::Chat { file } => chat(&service, file.as_deref()).await?,
        Command::Collections => {
            for name in service.list_collections().await? {
                println!("{name}");
            }
        }
        Command::Serve => serve(service).await?,
    }
    Ok(())
}

async fn serve(service: RagService) -> Result<()> {
    let config = config::get_config();
    let app = api::create_router(Arc::new(service), api::ApiSettings::from_config(config));

    let (listener, port) = bind_listener().await.context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn chat(service: &RagService, file: Option<&Path>) -> Result<()> {
    let mut handle = match file {
        Some(path) => Some(load_document(service, path).await?),
        None => None,
    };
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/clear" => {
                conversation.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }
        if let Some(path) = input.strip_prefix("/load ") {
            match load_document(service, Path::new(path.trim())).await {
                Ok(loaded) => {
                    handle = Some(loaded);
                    conversation.clear();
                }
                Err(err) => eprintln!("error: {err:#}"),
            }
            continue;
        }

        let Some(current) = handle.as_ref() else {
            println!("Please process a document first.");
            continue;
        };
        let stream = service.answer_stream(current, input, conversation.turns());
        let partial = print_stream(stream).await?;
        match partial.error {
            Some(error) => eprintln!("error: {error}"),
            None => {
                conversation.push_user(input);
                conversation.push_assistant(partial.text);
            }
        }
    }
    Ok(())
}

async fn load_document(service: &RagService, path: &Path) -> Result<CollectionHandle> {
    if path.as_os_str().is_empty() {
        bail!("no document path given");
    }
    let handle = service
        .ingest(path)
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))?;
    println!(
        "Processed {} into {} ({} chunks).",
        path.display(),
        handle.name(),
        handle.chunk_count()
    );
    Ok(handle)
}

/// Write fragments to stdout as they arrive.
async fn print_stream(mut stream: AnswerStream) -> Result<PartialAnswer> {
    let mut stdout = tokio::io::stdout();
    let mut text = String::new();
    let mut error = None;
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(fragment) => {
                stdout.write_all(fragment.as_bytes()).await?;
                stdout.flush().await?;
                text.push_str(&fragment);
            }
            Err(err) => {
                error = Some(err);
                break;
            }
        }
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(PartialAnswer { text, error })
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
