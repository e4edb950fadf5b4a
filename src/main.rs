use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ragdex_chunker::{discover_documents, load_document, Document};
use ragdex_core::{
    HealthReport, OutputFormat, RagdexConfig, RagdexError, RankedChunk, SearchRequest,
};
use ragdex_retrieval::{build_index, create_embedder, BuildParams, RetrievalEngine, SharedIndex};
use ragdex_store::{find_substring, load_index, ArtifactPaths, LookupMatch};

const CONFIG_FILE: &str = ".ragdex.toml";
const SEARCH_PREVIEW_CHARS: usize = 400;
const FIND_PREVIEW_CHARS: usize = 600;

#[derive(Parser)]
#[command(
    name = "ragdex",
    version,
    about = "Local semantic search index for retrieval-augmented generation",
    long_about = "ragdex chunks your documents, embeds them, and answers questions with\n\
                   ranked passages. Exact names and rare terms are matched lexically, everything\n\
                   else by vector similarity, and results are spread across source documents.\n\n\
                   Examples:\n  \
                     ragdex build ./docs                 Index a directory of .md/.txt files\n  \
                     ragdex search 'who is Glazunov'     Ranked passages for a question\n  \
                     ragdex find 'Glazunov'              Check a phrase survived indexing\n  \
                     ragdex health                       Is the index loaded?\n  \
                     ragdex mcp                          Serve the index to agents over MCP"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .ragdex.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable listing (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and persist documents into an index
    #[command(long_about = "Chunk, embed and persist documents into an index.\n\n\
        Walks PATH (a file or a directory, respecting .gitignore) for .md, .markdown\n\
        and .txt files, splits them into overlapping chunks, embeds every chunk with\n\
        the configured provider and writes index.json + index.vec to the index directory.\n\
        Convert PDFs to text before indexing.\n\n\
        Examples:\n  ragdex build ./docs\n  ragdex build thesis.txt --out ./output")]
    Build {
        /// File or directory to index
        path: PathBuf,

        /// Index directory (default: [index] dir from config, or ./output)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Search the index
    #[command(long_about = "Search the index for passages relevant to QUERY.\n\n\
        Examples:\n  ragdex search 'water budget models'\n  ragdex search 'Glazunov Anatoly' --top-k 3 --min-score 0.5\n  ragdex search 'river hydrology' --rerank --format json")]
    Search {
        /// Natural-language question or keywords
        query: String,

        /// Number of passages to return (default: [retrieval] default_top_k)
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop passages scoring below this
        #[arg(long)]
        min_score: Option<f32>,

        /// Rescore candidates with the configured reranker
        #[arg(long)]
        rerank: bool,
    },
    /// Case-insensitive substring lookup over indexed chunks
    #[command(long_about = "Case-insensitive substring lookup over indexed chunks.\n\n\
        A diagnostic: use it to check that a name or phrase survived extraction\n\
        and chunking. Matches are listed in index order with no scoring.\n\n\
        Example:\n  ragdex find 'Glazunov'")]
    Find {
        /// Text to look for
        substring: String,

        /// Maximum matches to print (default: 20)
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Report whether the index can be loaded
    #[command(long_about = "Report whether the index can be loaded.\n\n\
        Exits with a non-zero status when the index is missing or broken.")]
    Health,
    /// Start the MCP server for agent integration
    #[command(
        long_about = "Start the MCP (Model Context Protocol) server for agent integration.\n\n\
        Exposes search_documents, find_in_index and index_health over stdio.\n\
        Logs go to stderr so they never interleave with the protocol."
    )]
    Mcp,
    /// Create a default .ragdex.toml configuration file
    #[command(long_about = "Create a default .ragdex.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .ragdex.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mragdex\x1b[0m v{version}: local semantic search for your documents\n");

        println!("Quick start:");
        println!("  \x1b[36mragdex init\x1b[0m              Create a .ragdex.toml config file");
        println!("  \x1b[36mragdex build ./docs\x1b[0m      Index a directory of documents");
        println!("  \x1b[36mragdex search 'query'\x1b[0m    Ask the index a question\n");

        println!("All commands:");
        println!("  \x1b[32mbuild\x1b[0m     Chunk, embed and persist documents");
        println!("  \x1b[32msearch\x1b[0m    Hybrid lexical + semantic search");
        println!("  \x1b[32mfind\x1b[0m      Substring lookup over indexed chunks");
        println!("  \x1b[32mhealth\x1b[0m    Check the index can be loaded");
        println!("  \x1b[32mmcp\x1b[0m       Start MCP server for agents");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("ragdex v{version}: local semantic search for your documents\n");

        println!("Quick start:");
        println!("  ragdex init              Create a .ragdex.toml config file");
        println!("  ragdex build ./docs      Index a directory of documents");
        println!("  ragdex search 'query'    Ask the index a question\n");

        println!("All commands:");
        println!("  build     Chunk, embed and persist documents");
        println!("  search    Hybrid lexical + semantic search");
        println!("  find      Substring lookup over indexed chunks");
        println!("  health    Check the index can be loaded");
        println!("  mcp       Start MCP server for agents");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'ragdex <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: explicit file, then `.ragdex.toml`, then defaults,
/// with environment overrides on top.
///
/// Without any file, `build` uses the smaller build-time chunking preset.
fn load_config(path: Option<&Path>) -> Result<RagdexConfig> {
    let config = match path {
        Some(path) => RagdexConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("loading config from {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                RagdexConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err("loading .ragdex.toml")?
            } else {
                let mut config = RagdexConfig::default();
                config.chunking = ragdex_core::ChunkingConfig::build_preset();
                config
            }
        }
    };
    let config = config.with_env_overrides();
    config.validate().into_diagnostic()?;
    Ok(config)
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out: String = flat.chars().take(max).collect();
    if flat.chars().count() > max {
        out.push_str("...");
    }
    out
}

fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let paths = discover_documents(path).into_diagnostic()?;
    let mut docs = Vec::with_capacity(paths.len());
    for path in &paths {
        match load_document(path) {
            Ok(doc) => docs.push(doc),
            Err(RagdexError::InvalidInput(reason)) => {
                tracing::warn!(path = %path.display(), %reason, "skipping document");
            }
            Err(e) => {
                return Err(e)
                    .into_diagnostic()
                    .wrap_err(format!("reading {}", path.display()))
            }
        }
    }
    Ok(docs)
}

fn progress_bar(enabled: bool) -> Option<indicatif::ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = indicatif::ProgressBar::new(0);
    let style = indicatif::ProgressStyle::with_template(
        "{spinner:.cyan} embedding [{bar:30.cyan/blue}] {pos}/{len} chunks ({elapsed})",
    )
    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildOutput {
    documents: usize,
    chunks: usize,
    dim: usize,
    index_dir: String,
}

async fn run_build(
    config: &RagdexConfig,
    path: &Path,
    out: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let docs = load_documents(path)?;
    if docs.is_empty() {
        miette::bail!(miette::miette!(
            help = "ragdex indexes .md, .markdown and .txt files; convert PDFs to text first",
            "no indexable documents found under {}",
            path.display()
        ));
    }

    let index_dir = out.unwrap_or_else(|| config.index.dir.clone());
    std::fs::create_dir_all(&index_dir)
        .into_diagnostic()
        .wrap_err(format!("creating {}", index_dir.display()))?;
    let artifacts = ArtifactPaths::in_dir(&index_dir);

    let embedder = create_embedder(&config.embedding).into_diagnostic()?;
    let params = BuildParams {
        chunking: config.chunking,
        batch_size: config.embedding.batch_size,
    };
    eprintln!(
        "Indexing {} document(s) with {} ...",
        docs.len(),
        embedder.model()
    );

    let bar = progress_bar(std::io::stderr().is_terminal());
    let report = build_index(&docs, embedder.as_ref(), &params, &artifacts, |done, total| {
        if let Some(pb) = &bar {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        }
    })
    .await;
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
    let report = report.into_diagnostic()?;

    let output = BuildOutput {
        documents: report.documents,
        chunks: report.chunks,
        dim: report.dim,
        index_dir: index_dir.display().to_string(),
    };
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("## Index built\n");
            println!("| Documents | Chunks | Dimensions | Directory |");
            println!("|---|---|---|---|");
            println!(
                "| {} | {} | {} | `{}` |",
                output.documents, output.chunks, output.dim, output.index_dir
            );
        }
        OutputFormat::Text => {
            println!(
                "Indexed {} chunks from {} document(s) ({}-dim) into {}",
                output.chunks, output.documents, output.dim, output.index_dir
            );
        }
    }
    Ok(())
}

fn print_results(results: &[RankedChunk], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            if results.is_empty() {
                println!("_No results._");
            }
            for (rank, r) in results.iter().enumerate() {
                println!("### {}. {} ({:.4})\n", rank + 1, r.source, r.score);
                if !r.section.is_empty() {
                    println!("*{}*\n", r.section);
                }
                println!("> {}\n", preview(&r.text, SEARCH_PREVIEW_CHARS));
            }
        }
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No results.");
            }
            for (rank, r) in results.iter().enumerate() {
                let section = if r.section.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", r.section)
                };
                println!("{:>2}. {:.4}  {}{}", rank + 1, r.score, r.doc_id, section);
                println!("    {}\n", preview(&r.text, SEARCH_PREVIEW_CHARS));
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindOutput<'a> {
    total_chunks: usize,
    total_matches: usize,
    matches: Vec<FindEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindEntry<'a> {
    position: usize,
    doc_id: &'a str,
    chunk_index: usize,
    text: &'a str,
}

fn print_find(total: usize, found: &[LookupMatch<'_>], limit: usize, format: OutputFormat) -> Result<()> {
    let shown = &found[..found.len().min(limit)];
    match format {
        OutputFormat::Json => {
            let output = FindOutput {
                total_chunks: total,
                total_matches: found.len(),
                matches: shown
                    .iter()
                    .map(|m| FindEntry {
                        position: m.position,
                        doc_id: &m.chunk.doc_id,
                        chunk_index: m.chunk.chunk_index,
                        text: &m.chunk.text,
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
            return Ok(());
        }
        OutputFormat::Markdown => {
            println!("**Chunks in index:** {total}  ");
            println!("**Matches:** {}\n", found.len());
            for m in shown {
                println!("- `#{}` {} (chunk {})", m.position, m.chunk.doc_id, m.chunk.chunk_index);
                println!("  > {}", preview(&m.chunk.text, FIND_PREVIEW_CHARS));
            }
        }
        OutputFormat::Text => {
            println!("Chunks in index: {total}");
            println!("Matches: {}\n", found.len());
            for m in shown {
                println!("[{}] {} (chunk {})", m.position, m.chunk.doc_id, m.chunk.chunk_index);
                println!("    {}\n", preview(&m.chunk.text, FIND_PREVIEW_CHARS));
            }
        }
    }

    if found.len() > shown.len() {
        println!("... {} more (raise --limit to see them)", found.len() - shown.len());
    }
    if found.is_empty() {
        println!("Nothing matched. Possible causes:");
        println!("  - the text was lost or garbled when the source was converted to .txt");
        println!("  - the phrase spans a line break or hyphenation in the source");
        println!("  - the index predates the document; rerun `ragdex build`");
    }
    Ok(())
}

fn print_health(report: &HealthReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).into_diagnostic()?);
        }
        OutputFormat::Markdown | OutputFormat::Text => {
            println!("status: {}", report.status);
            println!("chunks loaded: {}", report.chunks_loaded);
            if let Some(error) = &report.error {
                println!("error: {error}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    let command = match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!(".ragdex.toml already exists. Remove it first to regenerate.");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .ragdex.toml");
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "ragdex", &mut std::io::stdout());
            return Ok(());
        }
        Some(command) => command,
    };

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(format = %cli.format, index = %config.index.dir.display(), "configuration loaded");

    match command {
        Command::Build { path, out } => run_build(&config, &path, out, cli.format).await?,
        Command::Search {
            query,
            top_k,
            min_score,
            rerank,
        } => {
            let engine = RetrievalEngine::from_config(&config).into_diagnostic()?;
            let request = SearchRequest::new(query)
                .with_top_k(top_k.unwrap_or(config.retrieval.default_top_k))
                .with_min_score(min_score.unwrap_or(config.retrieval.min_score))
                .with_reranker(rerank || config.retrieval.use_reranker);
            let results = engine.search(&request).await.into_diagnostic()?;
            print_results(&results, cli.format)?;
        }
        Command::Find { substring, limit } => {
            let artifacts = ArtifactPaths::in_dir(&config.index.dir);
            let index = tokio::task::spawn_blocking(move || load_index(&artifacts))
                .await
                .into_diagnostic()?
                .into_diagnostic()?;
            let found = find_substring(&index.chunks, &substring);
            print_find(index.num_chunks(), &found, limit, cli.format)?;
        }
        Command::Health => {
            let report = SharedIndex::from_artifacts(ArtifactPaths::in_dir(&config.index.dir))
                .health()
                .await;
            print_health(&report, cli.format)?;
            if !report.is_ready() {
                std::process::exit(1);
            }
        }
        Command::Mcp => ragdex_mcp::server::run_server(&config)
            .await
            .into_diagnostic()?,
        Command::Init | Command::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# ragdex configuration
# Every section is optional; omitted values use the defaults shown.

[chunking]
# Upper bound on chunk length in characters
# max_chars = 600
# Trailing characters repeated at the start of the next chunk
# overlap_chars = 80
# Chunks shorter than this are dropped unless they are a document's only chunk
# min_chunk_chars = 100

[retrieval]
# default_top_k = 5
# max_top_k = 20
# Drop results scoring below this (0 = no filtering). Env: RAG_MIN_SCORE
# min_score = 0.0
# Rerank by default when a reranker is configured. Env: RAG_USE_RERANKER
# use_reranker = false
# Score given to chunks that contain the query's significant words verbatim
# lexical_score = 0.80
# Query tokens at least this long count as specific
# specific_token_len = 7
# min_token_len = 2
# min_lexical_matches = 2
# Chunk text sent to the reranker is cut to this many characters
# rerank_max_chars = 512
# "logistic" for cross-encoders emitting logits, "identity" otherwise
# calibration = "logistic"

[embedding]
# "openai" (any OpenAI-compatible /v1/embeddings server) or "ollama"
# provider = "openai"
# model = "paraphrase-multilingual-mpnet-base-v2"
# base_url = "http://localhost:8080/v1"
# api_key = ""          # or RAGDEX_EMBEDDING_API_KEY
# dimensions = 768
# batch_size = 32

[reranker]
# Leave base_url unset to disable reranking
# base_url = "http://localhost:8081"
# model = "BAAI/bge-reranker-v2-m3"
# api_key = ""

[runtime]
# max_concurrent_inference = 4
# inference_timeout_secs = 30

[index]
# dir = "output"
"#;
