use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use docrag::core::config::ConfigService;
use docrag::core::logging;
use docrag::llm::LlmService;
use docrag::rag::{AnswerService, RetrievalOutcome};
use docrag::{AppPaths, RagError};

#[derive(Parser, Debug)]
#[command(
    name = "docrag",
    about = "Answer questions grounded in a single text document"
)]
struct Cli {
    /// Document to answer from
    #[arg(long)]
    file: PathBuf,

    /// Question to ask about the document
    #[arg(long)]
    query: Option<String>,

    /// Path to config.yml (defaults to <data dir>/config.yml)
    #[arg(long, env = "DOCRAG_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Rebuild the stored index before answering
    #[arg(long, default_value_t = false)]
    rebuild: bool,

    /// Print the retrieved context instead of calling the chat model
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(err) = &result {
        if let Some(rag) = err.downcast_ref::<RagError>() {
            tracing::error!(code = rag.error_code(), "{:#}", err);
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    if cli.query.is_none() && !cli.rebuild {
        bail!("nothing to do: pass --query, --rebuild, or both");
    }

    let config_service = ConfigService::new(AppPaths::new()).with_path(cli.config.clone());
    let config = config_service
        .load_config()
        .with_context(|| format!("Failed to load {}", config_service.config_path().display()))?;
    let paths = config_service.paths().clone().with_storage(&config.storage);
    logging::init(&paths);

    tracing::debug!("Effective config: {:?}", config.redacted());

    let llm = LlmService::from_config(&config);
    if !llm.health_check().await {
        tracing::warn!(
            "{} provider at {} did not answer the health check",
            llm.provider_name(),
            config.provider.base_url
        );
    }

    let service = AnswerService::new(config, &paths, llm)?;

    if cli.rebuild {
        let index = service
            .rebuild_index(&cli.file)
            .await
            .with_context(|| format!("Failed to index {}", cli.file.display()))?;
        eprintln!("Indexed {} passages from {}", index.len(), cli.file.display());
    }

    let Some(query) = cli.query else {
        return Ok(());
    };

    if cli.dry_run {
        match service.retrieve(&cli.file, &query).await? {
            RetrievalOutcome::Answerable { context, hits } => {
                for hit in &hits {
                    eprintln!("passage {} distance {:.3}", hit.position, hit.distance);
                }
                println!("{}", context);
            }
            RetrievalOutcome::Unrelated { message, .. } => println!("{}", message),
        }
        return Ok(());
    }

    let answer = service.answer(&cli.file, &query).await?;
    println!("{}", answer.text());
    Ok(())
}
