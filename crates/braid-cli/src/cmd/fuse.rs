//! `braid fuse`: fuse recorded retrieval runs.
//!
//! Each RUN file is a JSON object replaying one retriever:
//!
//! ```json
//! { "name": "bm25", "key": "id", "results": { "rust": [{"id": 3}, {"id": 7}] } }
//! ```
//!
//! The runs become operands of a single union, intersection or vote node.
//! `--map` appends a document-map stage that swaps each fused hit for the
//! full record with the same key.

use crate::output::{OutputMode, pretty_section, render_mode};
use anyhow::{Context, Result};
use braid_core::config::EffectiveConfig;
use braid_core::{
    Document, Operand, Recorded, RecordedRun, Search, SearchOptions, VoteScoring,
};
use braid_fusion::{DocumentMap, Fusion, Node, Strategy, sequence};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fusion strategy selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Union,
    Intersection,
    Vote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScoringArg {
    Softmax,
    Rank,
}

impl From<ScoringArg> for VoteScoring {
    fn from(arg: ScoringArg) -> Self {
        match arg {
            ScoringArg::Softmax => Self::Softmax,
            ScoringArg::Rank => Self::Rank,
        }
    }
}

#[derive(Args, Debug)]
pub struct FuseArgs {
    /// Recorded run files, in operand order.
    #[arg(required = true, value_name = "RUN")]
    pub runs: Vec<PathBuf>,

    /// How to combine the runs.
    #[arg(short, long, value_enum, default_value = "union")]
    pub strategy: StrategyArg,

    /// Query to answer. Repeat for a batch.
    #[arg(short, long = "query", value_name = "QUERY", required = true)]
    pub queries: Vec<String>,

    /// Keep at most this many results per query. Defaults to `[fusion] k`.
    #[arg(short)]
    pub k: Option<usize>,

    /// JSON array of full documents used to enrich fused results.
    #[arg(long, value_name = "DOCS")]
    pub map: Option<PathBuf>,

    /// Vote scoring. Defaults to `[fusion] vote_scoring`.
    #[arg(long, value_enum)]
    pub vote_scoring: Option<ScoringArg>,
}

/// Results for one query.
#[derive(Debug, Serialize)]
pub struct QueryResults {
    pub query: String,
    pub count: usize,
    /// Fused documents, best first, with the fused score in `similarity`.
    pub results: Vec<Document>,
}

/// JSON envelope for fuse output.
#[derive(Debug, Serialize)]
pub struct FuseOutput {
    pub strategy: &'static str,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    pub queries: Vec<QueryResults>,
}

/// Execute `braid fuse`.
///
/// # Errors
///
/// Unreadable or malformed run/map files, invalid compositions, and any
/// contract violation raised while fusing.
pub fn run_fuse(args: &FuseArgs, config: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let report = fuse(args, config)?;
    info!(
        strategy = report.strategy,
        queries = report.queries.len(),
        "fuse complete"
    );
    render_mode(output, &report, render_text, render_pretty)
}

/// Build the fusion graph for `args` and answer every query.
///
/// # Errors
///
/// See [`run_fuse`].
pub fn fuse(args: &FuseArgs, config: &EffectiveConfig) -> Result<FuseOutput> {
    let fusion = &config.project.fusion;
    let strategy = match args.strategy {
        StrategyArg::Union => Strategy::Union,
        StrategyArg::Intersection => Strategy::Intersection,
        StrategyArg::Vote => Strategy::Vote {
            scoring: args
                .vote_scoring
                .map_or(fusion.vote_scoring, VoteScoring::from),
        },
    };

    let operands = args
        .runs
        .iter()
        .map(|path| load_run(path))
        .collect::<Result<Vec<Node>>>()?;
    let node = Fusion::new(strategy, operands)?;
    let key = node.key().unwrap_or_default().to_string();

    let node = match &args.map {
        Some(path) => {
            let documents = load_documents(path)?;
            let map = DocumentMap::from_documents(key.as_str(), &documents)
                .with_context(|| format!("Invalid document map {}", path.display()))?;
            sequence(node, map)?
        }
        None => Node::from(node),
    };

    let k = args.k.or(fusion.k);
    let mut options = SearchOptions::new().batch_size(fusion.batch_size);
    if let Some(k) = k {
        options = options.k(k);
    }

    let results = node.search(args.queries.clone(), options)?.into_results();
    let queries = args
        .queries
        .iter()
        .zip(results)
        .map(|(query, results)| QueryResults {
            query: query.clone(),
            count: results.len(),
            results,
        })
        .collect();

    Ok(FuseOutput {
        strategy: strategy.family(),
        key,
        k,
        queries,
    })
}

fn load_run(path: &Path) -> Result<Node> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let run: RecordedRun = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse run {}", path.display()))?;

    let fallback = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("run");
    let recorded = Recorded::from_run(run, fallback)
        .with_context(|| format!("Invalid run {}", path.display()))?;
    debug!(path = %path.display(), name = recorded.name(), "loaded run");
    Ok(recorded.into())
}

fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse document map {}", path.display()))
}

fn score(document: &Document) -> String {
    document
        .similarity()
        .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"))
}

fn key_of(document: &Document, key: &str) -> String {
    document
        .key(key)
        .map(|k| k.to_string())
        .unwrap_or_default()
}

fn render_text(report: &FuseOutput, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "query\trank\t{}\tscore", report.key)?;
    for entry in &report.queries {
        for (rank, document) in entry.results.iter().enumerate() {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                entry.query,
                rank + 1,
                key_of(document, &report.key),
                score(document)
            )?;
        }
    }
    Ok(())
}

fn render_pretty(report: &FuseOutput, w: &mut dyn Write) -> io::Result<()> {
    for (i, entry) in report.queries.iter().enumerate() {
        if i > 0 {
            writeln!(w)?;
        }
        pretty_section(
            w,
            &format!(
                "{} \"{}\" ({} results)",
                report.strategy, entry.query, entry.count
            ),
        )?;
        if entry.results.is_empty() {
            writeln!(w, "  (no results)")?;
            continue;
        }
        for (rank, document) in entry.results.iter().enumerate() {
            let title = document
                .get("title")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("");
            writeln!(
                w,
                "{:>4}. {:<16} {:>8}  {title}",
                rank + 1,
                key_of(document, &report.key),
                score(document)
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::config::{ProjectConfig, UserConfig};
    use serde_json::json;
    use std::fs;

    fn config() -> EffectiveConfig {
        EffectiveConfig {
            project: ProjectConfig::default(),
            user: UserConfig::default(),
            resolved_output: "text".into(),
        }
    }

    fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, value.to_string()).expect("write");
        path
    }

    fn args(runs: Vec<PathBuf>, strategy: StrategyArg) -> FuseArgs {
        FuseArgs {
            runs,
            strategy,
            queries: vec!["x".into()],
            k: None,
            map: None,
            vote_scoring: None,
        }
    }

    fn ids(entry: &QueryResults) -> Vec<String> {
        entry.results.iter().map(|d| key_of(d, "id")).collect()
    }

    #[test]
    fn fuses_runs_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = write_json(
            dir.path(),
            "a.json",
            &json!({"key": "id", "results": {"x": [{"id": 0}, {"id": 1}]}}),
        );
        let b = write_json(
            dir.path(),
            "b.json",
            &json!({"key": "id", "results": {"x": [{"id": 1}]}}),
        );

        let report = fuse(&args(vec![a, b], StrategyArg::Union), &config()).expect("fuse");
        assert_eq!(report.strategy, "union");
        assert_eq!(report.key, "id");
        assert_eq!(ids(&report.queries[0]), ["1", "0"]);
    }

    #[test]
    fn config_k_applies_when_flag_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = write_json(
            dir.path(),
            "a.json",
            &json!({"key": "id", "results": {"x": [{"id": 0}, {"id": 1}, {"id": 2}]}}),
        );
        let mut cfg = config();
        cfg.project.fusion.k = Some(2);

        let report = fuse(&args(vec![a.clone()], StrategyArg::Vote), &cfg).expect("fuse");
        assert_eq!(report.queries[0].count, 2);

        let mut explicit = args(vec![a], StrategyArg::Vote);
        explicit.k = Some(1);
        let report = fuse(&explicit, &cfg).expect("fuse");
        assert_eq!(report.queries[0].count, 1);
    }

    #[test]
    fn map_enriches_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = write_json(
            dir.path(),
            "a.json",
            &json!({"key": "id", "results": {"x": [{"id": "d1"}]}}),
        );
        let docs = write_json(
            dir.path(),
            "docs.json",
            &json!([{"id": "d1", "title": "Fusion basics"}]),
        );
        let mut fuse_args = args(vec![a], StrategyArg::Intersection);
        fuse_args.map = Some(docs);

        let report = fuse(&fuse_args, &config()).expect("fuse");
        let first = &report.queries[0].results[0];
        assert_eq!(first.get("title"), Some(&json!("Fusion basics")));
        assert!(first.similarity().is_some());
    }

    #[test]
    fn run_without_keys_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = write_json(
            dir.path(),
            "a.json",
            &json!({"key": "id", "results": {"x": [{"title": "no id"}]}}),
        );
        let err = fuse(&args(vec![a], StrategyArg::Union), &config()).expect_err("missing key");
        assert!(err.downcast_ref::<braid_core::FusionError>().is_some());
    }

    #[test]
    fn text_rendering_is_tab_separated() {
        let report = FuseOutput {
            strategy: "union",
            key: "id".into(),
            k: None,
            queries: vec![QueryResults {
                query: "x".into(),
                count: 1,
                results: vec![Document::new().with("id", 7).with_similarity(0.5)],
            }],
        };
        let mut buf = Vec::new();
        render_text(&report, &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "query\trank\tid\tscore\nx\t1\t7\t0.5000\n");
    }
}
