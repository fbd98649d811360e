//! OntoRAG CLI
//!
//! Unified command-line interface for the ontology-governance pipeline:
//! - Ingesting documents into DTOs and chunk stores
//! - Running the per-chunk LLM proposal pass and aggregation
//! - Merging document proposals into the Schema Card (deterministic)
//! - Registering and importing baseline ontologies from a catalog
//! - Emitting OWL/RDFS Turtle and materializing instances with provenance

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ontorag_baseline::Catalog;
use ontorag_dto::{load_document, ChunkStore, DocumentFormat};
use ontorag_llm::{
    ChatClient, MockChatClient, OpenRouterClient, OpenRouterConfig, INSTANCE_PROMPT_TEMPLATE,
    SCHEMA_PROMPT_TEMPLATE,
};
use ontorag_schema::{
    materialize_instances, merge_proposal, schema_card_to_turtle, DocumentProposal,
    InstanceProposal, SchemaCard, DEFAULT_NAMESPACE,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod pipeline;

#[derive(Parser)]
#[command(name = "ontorag")]
#[command(
    author,
    version,
    about = "OntoRAG: LLM-proposed, deterministically governed RDF knowledge graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a document into chunk DTOs and persist them under `out-dir`.
    Ingest {
        /// Input document (plain text or markdown)
        input: PathBuf,
        /// Output directory (gets `documents/` and `chunks/` subdirectories)
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Force a format instead of guessing from the extension: text, markdown
        #[arg(long)]
        format: Option<String>,
    },

    /// Run the per-chunk LLM proposal pass and write one aggregated
    /// document proposal.
    Propose {
        /// Chunk store written by `ingest` (`chunks/{document_id}.jsonl`)
        #[arg(long)]
        chunks: PathBuf,
        /// Current Schema Card (missing file = empty card)
        #[arg(long)]
        card: PathBuf,
        /// Output proposal JSON
        #[arg(short, long)]
        out: PathBuf,
        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Merge a document proposal into the Schema Card.
    Merge {
        /// Prior Schema Card (missing file = empty card)
        #[arg(long)]
        card: PathBuf,
        /// Document proposal JSON
        #[arg(long)]
        proposal: PathBuf,
        /// Output Schema Card (defaults to overwriting `--card`)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Manage and import baseline ontologies (FOAF, PROV-O, ...).
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },

    /// Render the Schema Card as OWL/RDFS Turtle.
    EmitTtl {
        #[arg(long)]
        card: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Materialize instance proposals into Turtle with PROV mention nodes.
    Materialize {
        #[arg(long)]
        card: PathBuf,
        /// Instance proposals: JSON array of instance objects
        #[arg(long)]
        instances: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Full two-pass run: ingest, propose, merge, emit ontology and
    /// instance Turtle.
    Pipeline {
        /// Input document
        input: PathBuf,
        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Schema Card to fold into (missing file = empty card); updated in place
        #[arg(long)]
        card: PathBuf,
        /// Force a format instead of guessing from the extension
        #[arg(long)]
        format: Option<String>,
        #[command(flatten)]
        llm: LlmArgs,
    },
}

#[derive(clap::Args)]
struct LlmArgs {
    /// Worker threads for per-chunk calls
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Minimum delay between successive LLM calls, in seconds
    #[arg(long, default_value_t = 10)]
    delay_secs: u64,
    /// Per-call timeout, in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
    /// Serve canned replies from a JSON array of strings instead of
    /// calling the endpoint (offline runs and tests)
    #[arg(long)]
    mock: Option<PathBuf>,
}

#[derive(Subcommand)]
enum BaselineCommands {
    /// Copy a TTL file into the catalog and record it in the manifest.
    Register {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "")]
        label: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Repeatable tag
        #[arg(long)]
        tag: Vec<String>,
        /// Override the auto-detected namespace
        #[arg(long)]
        namespace: Option<String>,
    },
    /// List registered baselines.
    List {
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Merge a registered baseline into the Schema Card with its catalog
    /// id as origin.
    Import {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        card: PathBuf,
        /// Output Schema Card (defaults to overwriting `--card`)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            input,
            out_dir,
            format,
        } => cmd_ingest(&input, &out_dir, format.as_deref()),
        Commands::Propose {
            chunks,
            card,
            out,
            llm,
        } => cmd_propose(&chunks, &card, &out, &llm),
        Commands::Merge {
            card,
            proposal,
            out,
        } => cmd_merge(&card, &proposal, out.as_deref()),
        Commands::Baseline { command } => match command {
            BaselineCommands::Register {
                catalog,
                id,
                file,
                label,
                description,
                tag,
                namespace,
            } => cmd_baseline_register(&catalog, &id, &file, &label, &description, tag, namespace),
            BaselineCommands::List { catalog } => cmd_baseline_list(&catalog),
            BaselineCommands::Import {
                catalog,
                id,
                card,
                out,
            } => cmd_baseline_import(&catalog, &id, &card, out.as_deref()),
        },
        Commands::EmitTtl { card, out } => cmd_emit_ttl(&card, &out),
        Commands::Materialize {
            card,
            instances,
            out,
        } => cmd_materialize(&card, &instances, &out),
        Commands::Pipeline {
            input,
            out_dir,
            card,
            format,
            llm,
        } => cmd_pipeline(&input, &out_dir, &card, format.as_deref(), &llm),
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn resolve_format(input: &Path, forced: Option<&str>) -> Result<DocumentFormat> {
    match forced {
        Some("text") => Ok(DocumentFormat::Text),
        Some("markdown") | Some("md") => Ok(DocumentFormat::Markdown),
        Some(other) => Err(anyhow!("unsupported format '{other}' (expected text|markdown)")),
        None => {
            let ext = input
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_lowercase();
            Ok(match ext.as_str() {
                "md" | "markdown" => DocumentFormat::Markdown,
                _ => DocumentFormat::Text,
            })
        }
    }
}

fn load_card_or_empty(path: &Path) -> Result<SchemaCard> {
    if path.exists() {
        SchemaCard::load(path)
    } else {
        Ok(SchemaCard::empty(DEFAULT_NAMESPACE))
    }
}

fn build_client(llm: &LlmArgs) -> Result<Box<dyn ChatClient>> {
    if let Some(mock_path) = &llm.mock {
        let text = std::fs::read_to_string(mock_path)
            .with_context(|| format!("failed to read mock replies {}", mock_path.display()))?;
        let replies: Vec<String> = serde_json::from_str(&text)
            .with_context(|| format!("mock replies {} must be a JSON array of strings", mock_path.display()))?;
        return Ok(Box::new(MockChatClient::new(replies)));
    }
    let config = OpenRouterConfig::from_env()?
        .with_timeout(Duration::from_secs(llm.timeout_secs))
        .with_min_call_delay(Duration::from_secs(llm.delay_secs));
    Ok(Box::new(OpenRouterClient::new(config)?))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_ingest(input: &Path, out_dir: &Path, forced_format: Option<&str>) -> Result<()> {
    let format = resolve_format(input, forced_format)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let loaded = load_document(&input.to_string_lossy(), &text, format);

    let doc_path = out_dir
        .join("documents")
        .join(format!("{}.json", loaded.document.document_id));
    let doc_json = serde_json::to_string_pretty(&serde_json::to_value(&loaded.document)?)?;
    write_text(&doc_path, &format!("{doc_json}\n"))?;

    let store = ChunkStore::open(
        out_dir
            .join("chunks")
            .join(format!("{}.jsonl", loaded.document.document_id)),
    );
    store.append_many(&loaded.chunks)?;

    println!(
        "{} ingested {} chunks from {} (document {})",
        "✓".green(),
        loaded.chunks.len(),
        input.display(),
        loaded.document.document_id
    );
    Ok(())
}

fn cmd_propose(chunks_path: &Path, card_path: &Path, out: &Path, llm: &LlmArgs) -> Result<()> {
    let card = load_card_or_empty(card_path)?;
    let chunks = ChunkStore::open(chunks_path).read_all()?;
    if chunks.is_empty() {
        return Err(anyhow!("no chunks found in {}", chunks_path.display()));
    }
    let client = build_client(llm)?;

    let document = pipeline::propose_document(
        client.as_ref(),
        SCHEMA_PROMPT_TEMPLATE,
        &card,
        &chunks,
        llm.workers,
    );
    write_text(out, &format!("{}\n", document.to_json()?))?;

    println!(
        "{} proposed {} classes, {} datatype properties, {} object properties from {} chunks ({} warnings)",
        "✓".green(),
        document.proposed_additions.classes.len(),
        document.proposed_additions.datatype_properties.len(),
        document.proposed_additions.object_properties.len(),
        document.chunk_count,
        document.warnings.len()
    );
    Ok(())
}

fn cmd_merge(card_path: &Path, proposal_path: &Path, out: Option<&Path>) -> Result<()> {
    let prior = load_card_or_empty(card_path)?;
    let text = std::fs::read_to_string(proposal_path)
        .with_context(|| format!("failed to read {}", proposal_path.display()))?;
    let proposal = DocumentProposal::from_json(&text)
        .with_context(|| format!("failed to parse {}", proposal_path.display()))?;

    let card = merge_proposal(&prior, &proposal);
    let out = out.unwrap_or(card_path);
    card.save(out)?;

    print_card_summary(&card, out);
    Ok(())
}

fn cmd_baseline_register(
    catalog_dir: &Path,
    id: &str,
    file: &Path,
    label: &str,
    description: &str,
    tags: Vec<String>,
    namespace: Option<String>,
) -> Result<()> {
    let mut catalog = Catalog::open(catalog_dir)?;
    let entry = catalog.register(id, file, label, description, tags, namespace)?;
    println!(
        "{} registered baseline '{id}' (namespace {})",
        "✓".green(),
        if entry.namespace.is_empty() {
            "unknown"
        } else {
            &entry.namespace
        }
    );
    Ok(())
}

fn cmd_baseline_list(catalog_dir: &Path) -> Result<()> {
    let catalog = Catalog::open(catalog_dir)?;
    if catalog.entries().is_empty() {
        println!("catalog {} is empty", catalog_dir.display());
        return Ok(());
    }
    for (id, entry) in catalog.entries() {
        println!(
            "{}  {}  {}",
            id.bold(),
            entry.namespace,
            if entry.label.is_empty() {
                &entry.path
            } else {
                &entry.label
            }
        );
    }
    Ok(())
}

fn cmd_baseline_import(
    catalog_dir: &Path,
    id: &str,
    card_path: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let catalog = Catalog::open(catalog_dir)?;
    let import = catalog.import(id)?;
    let prior = load_card_or_empty(card_path)?;
    let card = merge_proposal(&prior, &import.proposal);
    let out = out.unwrap_or(card_path);
    card.save(out)?;

    print_card_summary(&card, out);
    Ok(())
}

fn cmd_emit_ttl(card_path: &Path, out: &Path) -> Result<()> {
    let card = SchemaCard::load(card_path)?;
    write_text(out, &schema_card_to_turtle(&card))?;
    println!(
        "{} emitted ontology for {} classes to {}",
        "✓".green(),
        card.classes.len(),
        out.display()
    );
    Ok(())
}

fn cmd_materialize(card_path: &Path, instances_path: &Path, out: &Path) -> Result<()> {
    let card = SchemaCard::load(card_path)?;
    let text = std::fs::read_to_string(instances_path)
        .with_context(|| format!("failed to read {}", instances_path.display()))?;
    let instances: Vec<InstanceProposal> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", instances_path.display()))?;

    let graph = materialize_instances(&card, &instances);
    write_text(out, &graph.turtle)?;

    println!(
        "{} materialized {} instances ({} skipped, {} warnings) to {}",
        "✓".green(),
        graph.instances_emitted,
        graph.instances_skipped,
        graph.warnings.len(),
        out.display()
    );
    for warning in &graph.warnings {
        println!("  {} {warning}", "warning:".yellow());
    }
    Ok(())
}

fn cmd_pipeline(
    input: &Path,
    out_dir: &Path,
    card_path: &Path,
    forced_format: Option<&str>,
    llm: &LlmArgs,
) -> Result<()> {
    let format = resolve_format(input, forced_format)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let loaded = load_document(&input.to_string_lossy(), &text, format);
    let doc_id = loaded.document.document_id.clone();

    let doc_json = serde_json::to_string_pretty(&serde_json::to_value(&loaded.document)?)?;
    write_text(
        &out_dir.join("documents").join(format!("{doc_id}.json")),
        &format!("{doc_json}\n"),
    )?;
    let store = ChunkStore::open(out_dir.join("chunks").join(format!("{doc_id}.jsonl")));
    store.append_many(&loaded.chunks)?;
    tracing::info!(document_id = %doc_id, chunks = loaded.chunks.len(), "document ingested");

    let client = build_client(llm)?;
    let prior = load_card_or_empty(card_path)?;

    // First pass: schema proposals.
    let document = pipeline::propose_document(
        client.as_ref(),
        SCHEMA_PROMPT_TEMPLATE,
        &prior,
        &loaded.chunks,
        llm.workers,
    );
    write_text(
        &out_dir.join(format!("{doc_id}.proposal.json")),
        &format!("{}\n", document.to_json()?),
    )?;

    let card = merge_proposal(&prior, &document);
    card.save(card_path)?;
    write_text(&out_dir.join("ontology.ttl"), &schema_card_to_turtle(&card))?;
    tracing::info!(version = %card.version, classes = card.classes.len(), "schema card merged");

    // Second pass: instances against the merged card.
    let (instances, instance_warnings) = pipeline::extract_instances(
        client.as_ref(),
        INSTANCE_PROMPT_TEMPLATE,
        &card,
        &loaded.chunks,
        llm.workers,
    );
    let instances_json = serde_json::to_string_pretty(&serde_json::to_value(&instances)?)?;
    write_text(
        &out_dir.join(format!("{doc_id}.instances.json")),
        &format!("{instances_json}\n"),
    )?;

    let graph = materialize_instances(&card, &instances);
    write_text(&out_dir.join("instances.ttl"), &graph.turtle)?;

    print_card_summary(&card, card_path);
    println!(
        "{} materialized {} instances ({} skipped)",
        "✓".green(),
        graph.instances_emitted,
        graph.instances_skipped
    );
    for warning in instance_warnings.iter().chain(graph.warnings.iter()) {
        println!("  {} {warning}", "warning:".yellow());
    }
    Ok(())
}

fn print_card_summary(card: &SchemaCard, path: &Path) {
    println!(
        "{} schema card {}: {} classes, {} datatype properties, {} object properties, {} events, {} warnings (version {})",
        "✓".green(),
        path.display(),
        card.classes.len(),
        card.datatype_properties.len(),
        card.object_properties.len(),
        card.events.len(),
        card.warnings.len(),
        card.version
    );
}
