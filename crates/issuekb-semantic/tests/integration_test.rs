use issuekb_core::config::ClusterMethod;
use issuekb_core::processor::{load_records, preprocess_issues, save_records};
use issuekb_core::GitHubIssue;
use issuekb_semantic::{
    cluster, load_embeddings, save_embeddings, ClusterLabel, ClusterParams, Corpus,
    EmbeddingMatrix, FastEmbedEncoder, SemanticError, SemanticSearchEngine, TextEncoder,
};
use std::sync::Arc;
use tempfile::TempDir;

const VOCABULARY: [&str; 7] = [
    "sync",
    "docker",
    "mysql",
    "conflict",
    "upload",
    "container",
    "setup",
];

/// Counts vocabulary words; deterministic and offline
struct KeywordEncoder;

impl TextEncoder for KeywordEncoder {
    fn model_name(&self) -> &str {
        "keyword-counts"
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }

    fn encode(&self, texts: &[String]) -> issuekb_semantic::Result<EmbeddingMatrix> {
        let rows = texts
            .iter()
            .map(|text| {
                VOCABULARY
                    .iter()
                    .map(|word| text.split_whitespace().filter(|w| w == word).count() as f32)
                    .collect()
            })
            .collect();
        EmbeddingMatrix::with_dimension(self.dimension(), rows)
    }
}

fn raw_issue(number: u64, title: &str, body: &str) -> GitHubIssue {
    serde_json::from_value(serde_json::json!({
        "id": number * 100,
        "number": number,
        "title": title,
        "body": body,
        "state": "open",
        "created_at": "2024-05-01T08:00:00Z",
        "updated_at": "2024-05-02T08:00:00Z",
        "user": { "login": format!("user{}", number) },
        "comments": 1,
        "labels": []
    }))
    .unwrap()
}

fn raw_issues() -> Vec<GitHubIssue> {
    vec![
        raw_issue(1, "Sync stops after upgrade", "Client sync never finishes"),
        raw_issue(2, "Docker compose fails", "The docker container exits"),
        raw_issue(3, "MySQL connection refused", "mysql setup error"),
        raw_issue(4, "Sync conflict files", "Sync creates conflict copies"),
        raw_issue(5, "???", "https://example.com/screenshot.png"),
    ]
}

fn build_corpus() -> Corpus {
    let records = preprocess_issues(&raw_issues());
    let texts: Vec<String> = records.iter().map(|r| r.cleaned_content.clone()).collect();
    let embeddings = KeywordEncoder.encode(&texts).unwrap();
    Corpus::new(KeywordEncoder.model_name(), records, embeddings).unwrap()
}

#[test]
fn test_pipeline_end_to_end() {
    let corpus = build_corpus();
    assert_eq!(corpus.len(), 4, "the link-only issue should be dropped");
    assert_eq!(corpus.embeddings().len(), corpus.records().len());

    let params = ClusterParams {
        n_clusters: 2,
        ..Default::default()
    };
    let report = cluster(corpus.embeddings(), ClusterMethod::Partition, &params).unwrap();
    assert_eq!(report.labels.len(), corpus.len());

    // rows are issues 1, 2, 3, 4
    let labels = report.labels.clone();
    assert_eq!(labels[0], labels[3], "both sync issues belong together");
    assert_eq!(labels[1], labels[2]);
    assert_ne!(labels[0], labels[1]);

    let corpus = corpus.with_labels(report.labels).unwrap();
    let engine = SemanticSearchEngine::with_encoder(corpus, Arc::new(KeywordEncoder)).unwrap();

    let results = engine.search("Sync problems?", 5, None).unwrap();
    let numbers: Vec<u64> = results.iter().map(|r| r.issue_number).collect();
    assert_eq!(numbers, vec![1, 4]);
    assert!((results[0].similarity - 1.0).abs() < 1e-6);
    assert_eq!(results[0].author, "user1");
    assert_eq!(results[0].cluster, Some(labels[0]));

    // nothing about sync in the docker/mysql cluster
    let filtered = engine.search("sync", 5, Some(labels[1])).unwrap();
    assert!(filtered.is_empty());

    let members = engine.search_by_cluster(labels[1], 10);
    assert_eq!(members.iter().map(|r| r.number).collect::<Vec<_>>(), vec![2, 3]);
}

#[test]
fn test_artifacts_reload_into_same_results() {
    let temp_dir = TempDir::new().unwrap();
    let records_path = temp_dir.path().join("processed").join("issues.msgpack");
    let embeddings_path = temp_dir.path().join("embeddings").join("embeddings.msgpack");

    let corpus = build_corpus();
    save_records(corpus.records(), &records_path).unwrap();
    save_embeddings(corpus.embeddings(), &embeddings_path).unwrap();

    let reloaded = Corpus::new(
        KeywordEncoder.model_name(),
        load_records(&records_path).unwrap(),
        load_embeddings(&embeddings_path).unwrap(),
    )
    .unwrap();
    assert_eq!(reloaded.embeddings(), corpus.embeddings());

    let before = SemanticSearchEngine::with_encoder(corpus, Arc::new(KeywordEncoder))
        .unwrap()
        .search("docker container", 3, None)
        .unwrap();
    let after = SemanticSearchEngine::with_encoder(reloaded, Arc::new(KeywordEncoder))
        .unwrap()
        .search("docker container", 3, None)
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(after[0].issue_number, 2);
}

#[test]
fn test_corpus_rejects_mismatched_rows() {
    let records = preprocess_issues(&raw_issues());
    let embeddings = EmbeddingMatrix::from_rows(vec![vec![1.0; VOCABULARY.len()]]).unwrap();

    let err = Corpus::new("keyword-counts", records, embeddings).unwrap_err();
    assert!(matches!(
        err,
        SemanticError::ShapeMismatch {
            expected: 4,
            actual: 1,
            ..
        }
    ));

    let err = build_corpus()
        .with_labels(vec![ClusterLabel::Cluster(0)])
        .unwrap_err();
    assert!(matches!(err, SemanticError::ShapeMismatch { .. }));
}

#[test]
fn test_density_clustering_on_corpus() {
    let corpus = build_corpus();
    let params = ClusterParams {
        eps: 0.5,
        min_samples: 2,
        ..Default::default()
    };
    let report = cluster(corpus.embeddings(), ClusterMethod::Density, &params).unwrap();

    // every issue is at least distance 2 from every other one
    assert!(report.labels.iter().all(ClusterLabel::is_noise));
    assert_eq!(report.n_clusters(), 0);
}

#[test]
fn test_empty_input_encodes_to_empty_matrix() {
    let matrix = KeywordEncoder.encode(&[]).unwrap();
    assert!(matrix.is_empty());
    assert_eq!(matrix.dimension(), VOCABULARY.len());
}

// Needs network access to download the model on first run
#[test]
#[ignore]
fn test_fastembed_encoder() {
    let encoder = FastEmbedEncoder::new("sentence-transformers/all-MiniLM-L6-v2").unwrap();
    assert_eq!(encoder.dimension(), 384);

    let texts = vec![
        "file sync stops after upgrade".to_string(),
        "docker container keeps restarting".to_string(),
    ];
    let first = encoder.encode(&texts).unwrap();
    let second = encoder.encode(&texts).unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first.dimension(), 384);
    assert_eq!(first, second);
    assert!(first.rows()[0].iter().any(|&x| x != 0.0));
    assert!(encoder.encode(&[]).unwrap().is_empty());
}

#[test]
fn test_unknown_model_fails_to_load() {
    let err = FastEmbedEncoder::new("nobody/no-such-model").err().unwrap();
    assert!(matches!(err, SemanticError::ModelLoadError(_)));
}
