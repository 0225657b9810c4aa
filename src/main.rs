mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docflow_core::config::AppConfig;
use docflow_core::traits::EmbeddingProvider;
use docflow_core::types::{Language, WorkflowOutput, SUMMARY_SENTINEL};

use docflow_agent::{
    ChatDeps, ChatRequest, ChatWorkflow, SummaryDeps, SummaryRequest, SummaryWorkflow,
    TutorialDeps, TutorialRequest, TutorialWorkflow,
};
use docflow_memory::{
    EmbeddingGrouper, GroupingParams, HttpEmbeddingProvider, SqliteCache, SqliteVectorStore,
};
use docflow_tools::{create_web_search, HttpDocumentLoader};

#[derive(Parser)]
#[command(name = "docflow", version, about = "Document summaries, Q&A and tutorials over LLM workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "docflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a document or answer a question about it
    Ask {
        /// Stable document identifier (cache and index key)
        #[arg(long)]
        file_id: String,
        /// Document URL or local path
        #[arg(long)]
        url: String,
        /// Question, or SUMMARY_ALL for a whole-document summary
        #[arg(long, default_value = SUMMARY_SENTINEL)]
        query: String,
        /// Output language (ko, en, ja, zh, ...)
        #[arg(long, default_value = "ko")]
        lang: String,
    },
    /// Draft an illustrated tutorial from a document
    Tutorial {
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "ko")]
        lang: String,
    },
    /// Summarize or answer over a chat history
    Chat {
        /// File with one chat message per line
        #[arg(long)]
        messages: PathBuf,
        /// Question, or SUMMARY_ALL to summarize the conversation
        #[arg(long, default_value = SUMMARY_SENTINEL)]
        query: String,
        #[arg(long, default_value = "ko")]
        lang: String,
    },
    /// Inspect or maintain the summary cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run diagnostic checks
    Doctor,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove summaries older than the configured TTL
    Purge,
    /// Show cache counts
    Stats,
    /// Remove the cached summary of one document
    Delete {
        file_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "docflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {
            println!("docflow doctor");
            println!("==============");
            doctor::run_doctor(&config);
        }
        Commands::Cache { action } => {
            let cache = SqliteCache::open(&config.database_path(), config.cache.ttl_days)?;
            match action {
                CacheAction::Purge => {
                    let removed = cache.purge_expired()?;
                    println!("Removed {} expired summaries.", removed);
                }
                CacheAction::Stats => {
                    println!("{}", serde_json::to_string_pretty(&cache.stats()?)?);
                }
                CacheAction::Delete { file_id } => {
                    if cache.delete_summary(&file_id)? {
                        println!("Deleted cached summary for '{}'.", file_id);
                    } else {
                        println!("No cached summary for '{}'.", file_id);
                    }
                }
            }
        }
        Commands::Ask {
            file_id,
            url,
            query,
            lang,
        } => {
            let workflow = summary_workflow(&config)?;
            let output = workflow
                .run(SummaryRequest {
                    file_id,
                    url,
                    query,
                    lang: parse_lang(&lang),
                })
                .await?;
            print_output(&output)?;
        }
        Commands::Tutorial { file_id, url, lang } => {
            let workflow = tutorial_workflow(&config)?;
            let output = workflow
                .run(TutorialRequest {
                    file_id,
                    url,
                    lang: parse_lang(&lang),
                })
                .await?;
            print_output(&output)?;
        }
        Commands::Chat {
            messages,
            query,
            lang,
        } => {
            let messages = read_messages(&messages)?;
            let deps = ChatDeps {
                llm: docflow_llm::create_executor(&config.model)?,
                max_refines: config.engine.max_refines,
            };
            let workflow = ChatWorkflow::new(deps, &config.engine)?;
            let output = workflow
                .run(ChatRequest {
                    messages,
                    query,
                    lang: parse_lang(&lang),
                })
                .await?;
            print_output(&output)?;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    let home_config = dirs_home().map(|h| h.join(".docflow").join("config.toml"));
    if let Some(path) = home_config.filter(|p| p.exists()) {
        info!(path = %path.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&path)?);
    }

    eprintln!("Warning: No config file found. Set OPENAI_API_KEY or create docflow.toml");
    create_env_config()
}

/// Minimal config from the environment: OpenAI when a key is set, local
/// Ollama otherwise.
fn create_env_config() -> anyhow::Result<AppConfig> {
    let mut toml = if std::env::var("OPENAI_API_KEY").is_ok() {
        String::from(
            "[model]\nprovider = \"openai\"\nmodel_id = \"gpt-4o-mini\"\napi_key = \"${OPENAI_API_KEY}\"\n",
        )
    } else {
        String::from("[model]\nprovider = \"ollama\"\nmodel_id = \"llama3.2\"\n")
    };
    if std::env::var("TAVILY_API_KEY").is_ok() {
        toml.push_str("\n[web_search]\nprovider = \"tavily\"\napi_key = \"${TAVILY_API_KEY}\"\n");
    }
    Ok(AppConfig::from_toml(&toml)?)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn parse_lang(lang: &str) -> Language {
    lang.parse().unwrap_or(Language::Korean)
}

/// Embedding model, falling back to the chat model's key when the
/// `[embedding]` section does not set one.
fn embedder(config: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    let mut embedding = config.embedding.clone().unwrap_or_default();
    if embedding.api_key.is_none() {
        embedding.api_key = config.model.api_key.clone();
    }
    Arc::new(HttpEmbeddingProvider::from_config(&embedding))
}

fn summary_workflow(config: &AppConfig) -> anyhow::Result<SummaryWorkflow> {
    let db_path = config.database_path();
    let web = create_web_search(config.web_search.as_ref())?;
    if web.is_none() {
        warn!("Web search disabled; questions are answered from the document only");
    }

    let deps = SummaryDeps {
        loader: Arc::new(HttpDocumentLoader::new(&config.loader)?),
        store: Arc::new(SqliteVectorStore::open(&db_path, embedder(config))?),
        web,
        llm: docflow_llm::create_executor(&config.model)?,
        cache: Arc::new(SqliteCache::open(&db_path, config.cache.ttl_days)?),
        max_refines: config.engine.max_refines,
    };
    Ok(SummaryWorkflow::new(deps, &config.engine)?)
}

fn tutorial_workflow(config: &AppConfig) -> anyhow::Result<TutorialWorkflow> {
    let deps = TutorialDeps {
        loader: Arc::new(HttpDocumentLoader::new(&config.loader)?),
        grouper: Arc::new(EmbeddingGrouper::new(
            embedder(config),
            GroupingParams::from(&config.tutorial),
        )),
        llm: docflow_llm::create_executor(&config.model)?,
        cache: Arc::new(SqliteCache::open(
            &config.database_path(),
            config.cache.ttl_days,
        )?),
        max_section_chars: config.tutorial.max_section_chars,
    };
    Ok(TutorialWorkflow::new(deps, &config.engine)?)
}

fn read_messages(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read messages from {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn print_output(output: &WorkflowOutput) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    if let Some(err) = output.error() {
        anyhow::bail!("workflow failed: {}", err);
    }
    Ok(())
}
