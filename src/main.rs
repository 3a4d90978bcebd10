//! syllabus CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use syllabus::{
    commands::{
        cmd_chunk_add, cmd_chunk_get, cmd_compare, cmd_ingest, cmd_init, cmd_link, cmd_path,
        cmd_reconcile, cmd_search, cmd_status, print_chunk, print_chunk_add_stats,
        print_compare_results, print_ingest_stats, print_learning_path, print_link_stats,
        print_reconcile_stats, print_search_results, print_status, IngestRequest,
    },
    config::Config,
    embed::{create_embedder, create_guard},
    error::Result,
    expand::create_expander,
    graph::GraphStore,
    index::VectorIndex,
    model::ContentType,
    progress::ProgressLogWriter,
    search::SearchOptions,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "syllabus")]
#[command(version, about = "Knowledge-graph retrieval over educational documents", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize syllabus configuration and graph database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Ingest a document into the knowledge graph
    Ingest {
        /// Path to a text or markdown file
        path: PathBuf,

        /// Document title (defaults to file stem)
        #[arg(short, long)]
        title: Option<String>,

        /// Subject area, e.g. "computer science"
        #[arg(short, long)]
        subject: String,

        /// Author names
        #[arg(short, long)]
        author: Vec<String>,

        /// Document language
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Search the knowledge graph
    Search {
        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score (0-1)
        #[arg(short, long)]
        min_score: Option<f32>,

        /// Skip query expansion and embed the raw query
        #[arg(long)]
        no_expand: bool,

        /// Keep low-quality chunks in the ranking (penalized)
        #[arg(long)]
        include_low_quality: bool,

        /// Compare expanded vs. raw retrieval side by side
        #[arg(long, conflicts_with = "no_expand")]
        compare: bool,

        /// Restrict to a subject area
        #[arg(long)]
        subject: Option<String>,

        /// Restrict to one document
        #[arg(long)]
        document: Option<String>,

        /// Restrict to a content type (definition, example, ...)
        #[arg(long, value_parser = parse_content_type)]
        content_type: Option<ContentType>,

        /// Lower bound on chunk difficulty (0-1)
        #[arg(long)]
        difficulty_min: Option<f64>,

        /// Upper bound on chunk difficulty (0-1)
        #[arg(long)]
        difficulty_max: Option<f64>,
    },

    /// Plan a prerequisite-ordered learning path
    Path {
        /// Target concept names
        #[arg(required = true)]
        targets: Vec<String>,

        /// Concepts the learner already knows
        #[arg(short, long)]
        known: Vec<String>,

        /// Restrict concept lookup to a subject area
        #[arg(long)]
        subject: Option<String>,

        /// Time budget in hours; truncates the path
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Declare that one concept requires another
    Link {
        /// The dependent concept
        from: String,

        /// Its prerequisite
        to: String,

        /// Restrict concept lookup to a subject area
        #[arg(long)]
        subject: Option<String>,

        /// Edge strength (0-1)
        #[arg(long, default_value = "1.0")]
        strength: f64,
    },

    /// Inspect or add chunks directly
    Chunk {
        #[command(subcommand)]
        action: ChunkAction,
    },

    /// Retry embedding for chunks persisted without a vector
    Reconcile,

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ChunkAction {
    /// Add a hand-written chunk under an existing section
    Add {
        /// Section id to attach the chunk to
        section_id: String,

        /// Chunk text (reads stdin when omitted)
        #[arg(long)]
        text: Option<String>,

        /// Content type of the chunk
        #[arg(long, default_value = "narrative", value_parser = parse_content_type)]
        content_type: ContentType,
    },

    /// Show one chunk by id
    Get {
        /// Chunk id
        chunk_id: String,
    },
}

fn parse_content_type(s: &str) -> std::result::Result<ContentType, String> {
    s.parse().map_err(|e: syllabus::Error| e.to_string())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(ProgressLogWriter::default()))
        .with(filter)
        .init();

    // Init and completions need no existing config
    match cli.command {
        Commands::Init { force } => return handle_init(cli.config, force).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "syllabus", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;

    let store = GraphStore::connect(&config).await?;
    let index = VectorIndex::connect(&config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let guard = create_guard(&config.embedding);

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest {
            path,
            title,
            subject,
            author,
            language,
        } => {
            let title = title.unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Untitled".to_string())
            });
            let request = IngestRequest {
                title,
                subject,
                authors: author,
                language,
            };
            let stats =
                cmd_ingest(&config, &store, &index, embedder.as_ref(), &guard, &path, request)
                    .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_ingest_stats(&stats);
            }
        }

        Commands::Search {
            query,
            limit,
            min_score,
            no_expand,
            include_low_quality,
            compare,
            subject,
            document,
            content_type,
            difficulty_min,
            difficulty_max,
        } => {
            let expander = create_expander(&config.expansion)?;
            let mut options = SearchOptions::from_config(&config);
            options.expand = !no_expand;
            options.include_low_quality = include_low_quality;
            options.subject = subject;
            options.document_id = document;
            options.content_type = content_type.map(|t| t.to_string());
            options.difficulty_min = difficulty_min;
            options.difficulty_max = difficulty_max;
            if let Some(limit) = limit {
                options.limit = limit.min(config.search.max_limit);
            }
            if let Some(min_score) = min_score {
                options.min_score = min_score;
            }

            if compare {
                let outcome = cmd_compare(
                    &config,
                    &index,
                    embedder.as_ref(),
                    &guard,
                    Some(expander.as_ref()),
                    &query,
                    options,
                )
                .await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_compare_results(&outcome);
                }
            } else {
                let outcome = cmd_search(
                    &config,
                    &index,
                    embedder.as_ref(),
                    &guard,
                    Some(expander.as_ref()),
                    &query,
                    options,
                )
                .await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_search_results(&store, &outcome).await?;
                }
            }
        }

        Commands::Path {
            targets,
            known,
            subject,
            budget,
        } => {
            let path =
                cmd_path(&config, &store, &targets, &known, subject.as_deref(), budget).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&path)?);
            } else {
                print_learning_path(&path);
            }
        }

        Commands::Link {
            from,
            to,
            subject,
            strength,
        } => {
            let stats = cmd_link(&store, &from, &to, subject.as_deref(), strength).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_link_stats(&stats);
            }
        }

        Commands::Chunk { action } => match action {
            ChunkAction::Add {
                section_id,
                text,
                content_type,
            } => {
                let text = match text {
                    Some(t) => t,
                    None => {
                        use std::io::Read;
                        let mut buf = String::new();
                        std::io::stdin().read_to_string(&mut buf)?;
                        buf
                    }
                };
                let stats = cmd_chunk_add(
                    &store,
                    &index,
                    embedder.as_ref(),
                    &guard,
                    &config,
                    &section_id,
                    &text,
                    content_type,
                )
                .await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    print_chunk_add_stats(&stats);
                }
            }
            ChunkAction::Get { chunk_id } => {
                let chunk = cmd_chunk_get(&store, &chunk_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&chunk)?);
                } else {
                    print_chunk(&chunk);
                }
            }
        },

        Commands::Reconcile => {
            let stats = cmd_reconcile(&config, &store, &index, embedder.as_ref(), &guard).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_reconcile_stats(&stats);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &store, &index, &guard).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

async fn handle_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let base_dir = config_path
        .as_deref()
        .and_then(|p| {
            if p.extension().is_some_and(|e| e == "toml") {
                p.parent().map(PathBuf::from)
            } else {
                Some(p.to_path_buf())
            }
        })
        .unwrap_or_else(Config::default_base_dir);

    let config = cmd_init(Some(base_dir), force).await?;

    println!("✓ syllabus initialized");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Graph database: {}", config.paths.db_file.display());
    println!("\nNext steps:");
    println!("  1. Start Qdrant: docker run -p 6334:6334 qdrant/qdrant");
    println!("  2. Point SYLLABUS_EMBEDDING_URL at your embedding service");
    println!("  3. Ingest a document: syllabus ingest book.md --subject \"computer science\"");

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'syllabus init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
