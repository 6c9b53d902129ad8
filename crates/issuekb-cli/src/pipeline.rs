// The driver: crawl -> process -> embed -> cluster, one stage after another.
// Each stage reuses its artifact from disk when present (unless forced) and
// hands an immutable value to the next one.
use anyhow::{Context, Result};
use issuekb_core::crawler::{load_raw_issues, CrawlOptions, Crawler};
use issuekb_core::processor::{load_records, preprocess_issues, save_records};
use issuekb_core::{Config, GitHubIssue, GitHubIssueSource, IssueRecord};
use issuekb_semantic::{
    cluster, load_embeddings, save_embeddings, ClusterParams, ClusterReport, Corpus,
    EmbeddingMatrix, TextEncoder,
};
use tracing::{info, warn};

pub struct Pipeline<'a> {
    config: &'a Config,
    /// Recompute every artifact even if it exists on disk
    force: bool,
}

/// Everything the search side needs
pub struct PipelineOutput {
    pub corpus: Corpus,
    pub report: ClusterReport,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, force: bool) -> Self {
        Self { config, force }
    }

    pub async fn run(&self, encoder: &dyn TextEncoder) -> Result<PipelineOutput> {
        let raw_issues = self.raw_issues().await?;
        let records = self.records(&raw_issues)?;
        info!("Processed {} issues", records.len());

        let embeddings = self.embeddings(&records, encoder)?;
        let report = self.cluster(&embeddings)?;

        let model_name = embeddings
            .model_name()
            .context("Embeddings do not record the model that produced them")?
            .to_string();
        let corpus =
            Corpus::new(model_name, records, embeddings)?.with_labels(report.labels.clone())?;

        info!("Pipeline completed successfully");
        Ok(PipelineOutput { corpus, report })
    }

    /// Stage 1: crawl, or reuse the raw dump
    pub async fn raw_issues(&self) -> Result<Vec<GitHubIssue>> {
        let path = &self.config.paths.raw_data;
        if path.exists() && !self.force {
            info!("Raw data already exists, skipping crawling");
            return load_raw_issues(path)
                .with_context(|| format!("Failed to read raw issues from {}", path.display()));
        }
        crawl(self.config).await
    }

    /// Stage 2: clean, or reuse the processed table
    pub fn records(&self, raw_issues: &[GitHubIssue]) -> Result<Vec<IssueRecord>> {
        let path = &self.config.paths.processed_data;
        if path.exists() && !self.force {
            return load_records(path)
                .with_context(|| format!("Failed to read processed data from {}", path.display()));
        }

        let records = preprocess_issues(raw_issues);
        save_records(&records, path)?;
        Ok(records)
    }

    /// Stage 3: embed, or reuse the matrix when it came from this encoder and
    /// still lines up with the table
    pub fn embeddings(
        &self,
        records: &[IssueRecord],
        encoder: &dyn TextEncoder,
    ) -> Result<EmbeddingMatrix> {
        let path = &self.config.paths.embeddings;
        if path.exists() && !self.force {
            let cached = load_embeddings(path)
                .with_context(|| format!("Failed to read embeddings from {}", path.display()))?;

            let same_model = cached.model_name() == Some(encoder.model_name());
            if same_model
                && cached.len() == records.len()
                && (cached.is_empty() || cached.dimension() == encoder.dimension())
            {
                return Ok(cached);
            }
            warn!(
                "Cached embeddings ({} x {} from {}) do not match {} issues embedded by {}, \
                 re-encoding",
                cached.len(),
                cached.dimension(),
                cached.model_name().unwrap_or("unknown model"),
                records.len(),
                encoder.model_name()
            );
        }

        let texts: Vec<String> = records.iter().map(|r| r.cleaned_content.clone()).collect();
        info!("Encoding {} texts", texts.len());
        let embeddings = encoder.encode(&texts)?.with_model(encoder.model_name());
        save_embeddings(&embeddings, path)?;
        Ok(embeddings)
    }

    /// Stage 4: cluster. Cheap enough to redo on every run.
    pub fn cluster(&self, embeddings: &EmbeddingMatrix) -> Result<ClusterReport> {
        let params = ClusterParams::from(&self.config.cluster);
        Ok(cluster(embeddings, self.config.cluster.method, &params)?)
    }
}

/// Crawl the configured repository and overwrite the raw dump
pub async fn crawl(config: &Config) -> Result<Vec<GitHubIssue>> {
    info!("Starting to fetch issues from {}", config.github.repo);
    let source = GitHubIssueSource::from_config(config)?;
    let crawler = Crawler::new(source, CrawlOptions::from(&config.crawler));
    Ok(crawler.run(&config.paths.raw_data).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::Path;
    use tempfile::TempDir;

    /// Two-word vocabulary encoder that counts how often it was called
    struct CountingEncoder {
        name: &'static str,
        calls: Cell<usize>,
    }

    impl CountingEncoder {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Cell::new(0),
            }
        }
    }

    impl TextEncoder for CountingEncoder {
        fn model_name(&self) -> &str {
            self.name
        }

        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, texts: &[String]) -> issuekb_semantic::Result<EmbeddingMatrix> {
            self.calls.set(self.calls.get() + 1);
            let rows = texts
                .iter()
                .map(|t| {
                    vec![
                        t.matches("sync").count() as f32,
                        t.matches("docker").count() as f32,
                    ]
                })
                .collect();
            EmbeddingMatrix::with_dimension(2, rows)
        }
    }

    fn config_in(dir: &Path) -> Config {
        let toml = format!(
            r#"
[github]
repo = "haiwen/seafile"

[model]
name = "counting"
embedding_dim = 2

[cluster]
method = "partition"
n_clusters = 2

[paths]
raw_data = "{raw}"
processed_data = "{processed}"
embeddings = "{embeddings}"
"#,
            raw = dir.join("raw/issues.json").display(),
            processed = dir.join("processed/issues.msgpack").display(),
            embeddings = dir.join("embeddings/embeddings.msgpack").display(),
        );
        Config::from_toml(&toml).unwrap()
    }

    fn seed_raw_issues(config: &Config) {
        let issue = |number: u32, title: &str| {
            format!(
                r#"{{"id": {number}, "number": {number}, "title": "{title}", "body": null,
                    "state": "open", "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z", "user": null,
                    "comments": 0, "labels": []}}"#
            )
        };
        let raw = format!(
            "[{}, {}, {}]",
            issue(1, "sync broken"),
            issue(2, "docker broken"),
            issue(3, "sync slow sync")
        );
        let path = &config.paths.raw_data;
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, raw).unwrap();
    }

    #[tokio::test]
    async fn test_pipeline_builds_and_reuses_artifacts() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        seed_raw_issues(&config);

        let encoder = CountingEncoder::new("counting");
        let output = Pipeline::new(&config, false).run(&encoder).await.unwrap();

        assert_eq!(output.corpus.len(), 3);
        assert_eq!(output.corpus.model_name(), "counting");
        assert_eq!(output.report.n_clusters(), 2);
        assert!(config.paths.processed_data.exists());
        assert!(config.paths.embeddings.exists());
        assert_eq!(encoder.calls.get(), 1);

        // second run loads the matrix instead of encoding again
        let again = Pipeline::new(&config, false).run(&encoder).await.unwrap();
        assert_eq!(encoder.calls.get(), 1);
        assert_eq!(again.corpus.embeddings(), output.corpus.embeddings());
        assert_eq!(again.report.labels, output.report.labels);
    }

    #[tokio::test]
    async fn test_stale_embeddings_are_recomputed() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        seed_raw_issues(&config);

        let stale = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        save_embeddings(&stale, &config.paths.embeddings).unwrap();

        let encoder = CountingEncoder::new("counting");
        let output = Pipeline::new(&config, false).run(&encoder).await.unwrap();

        assert_eq!(encoder.calls.get(), 1);
        assert_eq!(output.corpus.embeddings().len(), 3);
        assert_eq!(load_embeddings(&config.paths.embeddings).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_embeddings_from_another_model_are_recomputed() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        seed_raw_issues(&config);

        let first = CountingEncoder::new("model-a");
        Pipeline::new(&config, false).run(&first).await.unwrap();
        assert_eq!(
            load_embeddings(&config.paths.embeddings).unwrap().model_name(),
            Some("model-a")
        );

        // same dimension, different model: the cached matrix must not be reused
        let second = CountingEncoder::new("model-b");
        let output = Pipeline::new(&config, false).run(&second).await.unwrap();

        assert_eq!(second.calls.get(), 1);
        assert_eq!(output.corpus.model_name(), "model-b");
        assert_eq!(
            load_embeddings(&config.paths.embeddings).unwrap().model_name(),
            Some("model-b")
        );
    }

    #[tokio::test]
    async fn test_untagged_embeddings_are_recomputed() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        seed_raw_issues(&config);

        let untagged = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]; 3]).unwrap();
        save_embeddings(&untagged, &config.paths.embeddings).unwrap();

        let encoder = CountingEncoder::new("counting");
        let output = Pipeline::new(&config, false).run(&encoder).await.unwrap();

        assert_eq!(encoder.calls.get(), 1);
        assert_eq!(output.corpus.model_name(), "counting");
    }
}
