mod pipeline;

use anyhow::{bail, Context};
use clap::Parser;
use issuekb_core::config::DEFAULT_CONFIG_PATH;
use issuekb_core::Config;
use issuekb_semantic::{
    ClusterLabel, ClusterReport, FastEmbedEncoder, SearchResult, SemanticSearchEngine, TextEncoder,
};
use pipeline::{Pipeline, PipelineOutput};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "issuekb")]
#[command(version, about = "Semantic search over a repository's GitHub issues", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// GitHub token, overrides the one in the settings file
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Crawl the repository and overwrite the raw issue dump
    Crawl,
    /// Crawl, clean, embed and cluster, reusing artifacts already on disk
    Build {
        /// Recompute every stage
        #[arg(long)]
        force: bool,
    },
    /// Find the issues closest to a question
    Search {
        /// Free-text question
        query: String,

        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,

        /// Only search one cluster (a cluster id or "noise")
        #[arg(long, value_parser = parse_cluster)]
        cluster: Option<ClusterLabel>,

        /// Show score, cluster, state, author and a preview
        #[arg(short, long)]
        details: bool,
    },
    /// Show the cluster distribution, or the issues of one cluster
    Clusters {
        #[arg(long, value_parser = parse_cluster)]
        cluster: Option<ClusterLabel>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_cluster(value: &str) -> Result<ClusterLabel, String> {
    value.parse().map_err(|e: issuekb_semantic::SemanticError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so results on stdout stay pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issuekb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?
        .with_access_token(cli.token);

    match cli.command {
        Some(Commands::Crawl) => {
            let issues = pipeline::crawl(&config).await?;
            println!(
                "Fetched {} issues into {}",
                issues.len(),
                config.paths.raw_data.display()
            );
        }
        Some(Commands::Build { force }) => {
            let encoder = load_encoder(&config)?;
            let output = Pipeline::new(&config, force).run(encoder.as_ref()).await?;
            println!("Indexed {} issues", output.corpus.len());
            print_distribution(&output.report);
        }
        Some(Commands::Search {
            query,
            top_k,
            cluster,
            details,
        }) => {
            let engine = build_engine(&config).await?;
            let results = engine.search(&query, top_k, cluster)?;
            print_results(&results, details);
        }
        Some(Commands::Clusters { cluster, limit }) => {
            let encoder = load_encoder(&config)?;
            let PipelineOutput { corpus, report } =
                Pipeline::new(&config, false).run(encoder.as_ref()).await?;

            match cluster {
                Some(label) => {
                    let engine = SemanticSearchEngine::new(corpus);
                    let members = engine.search_by_cluster(label, limit);
                    if members.is_empty() {
                        println!("No issues in cluster {}", label);
                    }
                    for record in members {
                        println!("#{}: {}", record.number, record.title);
                    }
                }
                None => print_distribution(&report),
            }
        }
        None => interactive(&config).await?,
    }

    Ok(())
}

/// Load the configured model; the model's own dimension wins over the settings file
fn load_encoder(config: &Config) -> anyhow::Result<Arc<dyn TextEncoder>> {
    let encoder = FastEmbedEncoder::new(&config.model.name)?;
    if encoder.dimension() != config.model.embedding_dim {
        tracing::warn!(
            "Configured embedding_dim {} does not match {} ({}), using the model's",
            config.model.embedding_dim,
            config.model.name,
            encoder.dimension()
        );
    }
    Ok(Arc::new(encoder))
}

async fn build_engine(config: &Config) -> anyhow::Result<SemanticSearchEngine> {
    let encoder = load_encoder(config)?;
    let output = Pipeline::new(config, false).run(encoder.as_ref()).await?;
    Ok(SemanticSearchEngine::with_encoder(output.corpus, encoder)?)
}

async fn interactive(config: &Config) -> anyhow::Result<()> {
    print!("Enter your question: ");
    std::io::stdout().flush()?;

    let mut query = String::new();
    std::io::stdin().lock().read_line(&mut query)?;
    let query = query.trim();
    if query.is_empty() {
        bail!("No question given");
    }

    let engine = build_engine(config).await?;
    let results = engine.search(query, 5, None)?;
    println!("\nTop {} similar issues:", results.len());
    print_results(&results, false);
    Ok(())
}

fn print_results(results: &[SearchResult], details: bool) {
    if results.is_empty() {
        println!("No similar issues found");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. #{}: {}", i + 1, result.issue_number, result.title);
        if details {
            let cluster = result
                .cluster
                .map(|label| label.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   score {:.3} | cluster {} | {} | by {} | opened {}",
                result.similarity,
                cluster,
                result.state,
                result.author,
                result.created_at.format("%Y-%m-%d")
            );
            if !result.body_preview.is_empty() {
                println!("   {}", result.body_preview.replace('\n', " "));
            }
        }
    }
}

fn print_distribution(report: &ClusterReport) {
    println!(
        "{} clusters via {} ({} noise)",
        report.n_clusters(),
        report.method,
        report.noise_count()
    );
    if let Some(score) = report.silhouette {
        println!("Silhouette score: {:.3}", score);
    }
    for (label, count) in report.sizes() {
        println!("  {:>6}: {}", label.to_string(), count);
    }
}
