//! Medoc Review CLI - drives the document and entity review flows against the
//! remote document service.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use medoc_review::export::ExportFile;
use medoc_review::handoff::SessionStore;
use medoc_review::review::{EntitySource, Outcome};
use medoc_review::{
    DocumentReview, DocumentService, EntityCollection, EntityPayload, EntityReview, HttpDocumentService,
    ServiceConfig, Upload,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_HANDOFF_FILE: &str = ".medoc-session.json";

#[derive(Parser)]
#[command(name = "medoc-review")]
#[command(about = "Review OCR text and extracted entities of medical documents")]
#[command(version)]
struct Cli {
    /// Document service base URL (overrides MEDOC_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// JSON config file with base_url / timeout_secs / handoff_path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File holding the document handed between commands
    #[arg(long, global = true)]
    handoff: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a scanned document and show its text
    Process {
        file: PathBuf,
        /// Also request AI enhancement of the text
        #[arg(long)]
        enhance: bool,
        /// Write the text export into this directory
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Enhance the handed-off document's text
    Enhance,
    /// Replace the handed-off document's text with a file's contents and save it
    SaveText { file: PathBuf },
    /// Extract (or fetch reviewed) entities and show them
    Entities {
        /// Fetch the entities the service holds for review instead of extracting
        #[arg(long)]
        review: bool,
        /// Print the raw service response instead of the structured view
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Save an edited entity JSON file and show the service's result
    SaveEntities { file: PathBuf },
    /// Adopt the document the service last processed into the handoff slot
    FetchReview,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medoc_review=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let service = HttpDocumentService::new(&config)?;
    info!("Using document service at {}", service.base_url());

    let handoff_path = config
        .handoff_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HANDOFF_FILE));
    let mut store = SessionStore::file_backed(handoff_path);

    let result = match cli.command {
        Commands::Process {
            file,
            enhance,
            export_dir,
        } => process(&service, &mut store, &file, enhance, export_dir.as_deref()).await,
        Commands::Enhance => enhance(&service, &mut store).await,
        Commands::SaveText { file } => save_text(&service, &mut store, &file).await,
        Commands::Entities {
            review,
            raw,
            export_dir,
        } => entities(&service, &store, review, raw, export_dir.as_deref()).await,
        Commands::SaveEntities { file } => save_entities(&service, &store, &file).await,
        Commands::FetchReview => fetch_review(&service, &mut store).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load_from_file(path)?,
        None => ServiceConfig::from_env()?,
    };
    if let Some(url) = &cli.backend_url {
        config = config.with_base_url(url);
    }
    if let Some(path) = &cli.handoff {
        config = config.with_handoff_path(path);
    }
    Ok(config)
}

fn ensure_applied(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Applied => Ok(()),
        Outcome::Failed(message) => bail!(message),
        Outcome::Stale => bail!("response was superseded"),
    }
}

fn restored_review(store: &SessionStore) -> Result<DocumentReview> {
    let document = store
        .load_document()
        .context("Run `process` or `fetch-review` first")?;
    let mut review = DocumentReview::new();
    review.restore(document)?;
    Ok(review)
}

fn write_export(export: Option<ExportFile>, dir: Option<&Path>) -> Result<()> {
    if let (Some(export), Some(dir)) = (export, dir) {
        let path = export
            .write_into(dir)
            .with_context(|| format!("Failed to write export into {:?}", dir))?;
        println!("Exported to {}", path.display());
    }
    Ok(())
}

// ============================================================================
// Document view
// ============================================================================

async fn process(
    service: &HttpDocumentService,
    store: &mut SessionStore,
    file: &Path,
    enhance: bool,
    export_dir: Option<&Path>,
) -> Result<()> {
    let upload = Upload::from_path(file).with_context(|| format!("Failed to read {:?}", file))?;

    let mut review = DocumentReview::new();
    ensure_applied(review.submit(service, upload).await?)?;

    if enhance {
        ensure_applied(review.request_enhancement(service).await?)?;
    }

    if let Some(document) = review.document() {
        store.store_document(document)?;
        if let Some(doc_type) = &document.document_type {
            println!("Document type: {}\n", doc_type);
        }
    }
    println!("{}", review.display_text().unwrap_or_default());

    write_export(review.export_text(), export_dir)
}

async fn enhance(service: &HttpDocumentService, store: &mut SessionStore) -> Result<()> {
    let mut review = restored_review(store)?;
    ensure_applied(review.request_enhancement(service).await?)?;

    if let Some(document) = review.document() {
        store.store_document(document)?;
    }
    println!("{}", review.display_text().unwrap_or_default());
    Ok(())
}

async fn save_text(
    service: &HttpDocumentService,
    store: &mut SessionStore,
    file: &Path,
) -> Result<()> {
    let edited =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;

    let mut review = restored_review(store)?;
    review.begin_edit()?;
    review.set_draft(edited)?;
    ensure_applied(review.commit_edit(service).await?)?;

    if let Some(document) = review.document() {
        store.store_document(document)?;
    }
    println!("{}", review.display_text().unwrap_or_default());
    Ok(())
}

async fn fetch_review(service: &HttpDocumentService, store: &mut SessionStore) -> Result<()> {
    let document = service.review_enhanced_text().await?;
    let mut review = DocumentReview::new();
    review.restore(document)?;

    if let Some(document) = review.document() {
        store.store_document(document)?;
    }
    println!("{}", review.display_text().unwrap_or_default());
    Ok(())
}

// ============================================================================
// Entity view
// ============================================================================

async fn entities(
    service: &HttpDocumentService,
    store: &SessionStore,
    from_review: bool,
    raw: bool,
    export_dir: Option<&Path>,
) -> Result<()> {
    let mut review = if from_review {
        EntityReview::new(EntitySource::Review)
    } else {
        EntityReview::from_handoff(store)
    };

    if review.error().is_none() {
        review.load(service).await?;
    }

    if raw && !review.showing_raw() {
        review.toggle_raw();
    }

    if let Some(message) = review.error() {
        eprintln!("Error: {}", message);
    }
    match (review.showing_raw(), review.raw_response(), review.committed()) {
        (true, Some(raw), _) => println!("{}", raw),
        (_, _, Some(collection)) => print_entities(collection),
        _ => println!("No entities found in the document."),
    }

    write_export(review.export(), export_dir)?;

    if review.error().is_some() {
        bail!("entity review failed");
    }
    Ok(())
}

async fn save_entities(
    service: &HttpDocumentService,
    store: &SessionStore,
    file: &Path,
) -> Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let document_type = store.load_document().ok().and_then(|d| d.document_type);

    let mut review = EntityReview::from_payload(EntityPayload::RawString(content), document_type);
    if let Some(message) = review.error() {
        bail!("{:?} is not a valid entity file: {}", file, message);
    }
    review.begin_edit()?;
    ensure_applied(review.commit_edit(service).await?)?;

    if let Some(collection) = review.committed() {
        print_entities(collection);
    }
    Ok(())
}

fn print_entities(collection: &EntityCollection) {
    if collection.is_empty() {
        println!("No entities found in the document.");
        return;
    }
    for (category, group) in collection {
        println!("{}", category.replace('_', " "));
        for entity in group.iter() {
            println!("  - {}", entity.value);
            if let Some(coords) = &entity.coordinates {
                println!("    Position: {}-{}", coords.start_index, coords.end_index);
                println!("    Context: \"{}\"", coords.text_snippet);
            }
        }
    }
}
