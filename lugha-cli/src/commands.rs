//! CLI subcommand handlers.

use anyhow::Context;
use std::io::Read;
use std::path::Path;

use crate::Commands;
use crate::ConfigAction;
use crate::EvalArgs;
use lugha_core::config::{LughaConfig, load_config};
use lugha_core::{
    EvaluationReport, Evaluator, EvaluatorConfig, MetricKind, ProviderRegistry, Validator,
    load_samples,
};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Eval(args) => handle_eval(args, workspace).await,
        Commands::Report { file } => handle_report(&file),
        Commands::Validate { text, file, json } => handle_validate(text, file.as_deref(), json, workspace),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_eval_overrides(config: &mut LughaConfig, args: &EvalArgs) {
    if let Some(concurrency) = args.concurrency {
        config.evaluation.concurrency = concurrency;
    }
    if let Some(threshold) = args.threshold {
        config.evaluation.latency_threshold_secs = threshold;
    }
    if let Some(k) = args.k {
        config.evaluation.ndcg_k = k;
    }
    if args.offline {
        config.embedding.provider = "local".into();
        config.generation.provider = "none".into();
        config
            .evaluation
            .metrics
            .retain(|m| *m != MetricKind::Faithfulness);
    }
}

async fn handle_eval(args: EvalArgs, workspace: &Path) -> anyhow::Result<()> {
    let mut config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    apply_eval_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid options: {}", e))?;

    let samples = load_samples(&args.input)
        .with_context(|| format!("Failed to load batch {}", args.input.display()))?;
    if samples.is_empty() {
        anyhow::bail!("No samples in {}", args.input.display());
    }

    let registry = ProviderRegistry::new();
    let embedder = registry
        .embedder(&config.language, &config.embedding, &config.retry)
        .context("Failed to build embedding provider")?;
    let generator = registry
        .generator(&config.language, &config.generation, &config.retry)
        .context("Failed to build generation provider")?;

    let evaluator = Evaluator::new(embedder, generator, EvaluatorConfig::from(&config));
    let mut report = evaluator.evaluate_batch(&samples).await;
    tracing::info!(run_id = %report.run_id, samples = report.total_samples, "Evaluation finished");

    print!("{}", report.render_summary());

    if let Some(output) = &args.output {
        if args.summary_only {
            report = report.without_samples();
        }
        report
            .write_json(output)
            .with_context(|| format!("Failed to write report to {}", output.display()))?;
        println!("\nReport written to: {}", output.display());
    }
    Ok(())
}

fn handle_report(file: &Path) -> anyhow::Result<()> {
    let report = EvaluationReport::load(file)
        .with_context(|| format!("Failed to read report {}", file.display()))?;
    print!("{}", report.render_summary());
    Ok(())
}

fn handle_validate(
    text: Option<String>,
    file: Option<&Path>,
    json: bool,
    workspace: &Path,
) -> anyhow::Result<()> {
    let reply = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let validator = Validator::new(&config.validation.corrections)
        .map_err(|e| anyhow::anyhow!("Invalid correction table: {}", e))?;
    let reviewed = validator.review(&reply);

    if json {
        println!("{}", serde_json::to_string_pretty(&reviewed)?);
        return Ok(());
    }

    println!("Corrected:   {}", reviewed.corrected);
    println!("Explanation: {}", reviewed.explanation);
    println!("Confidence:  {:.2}", reviewed.confidence);
    for applied in &reviewed.applied {
        println!(
            "  {} -> {} (x{}) {}",
            applied.term, applied.corrected, applied.occurrences, applied.note
        );
    }
    for (field, reason) in &reviewed.fallbacks {
        println!("  [fallback] {}: {}", field, reason);
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".lugha");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = LughaConfig::default()
                .to_toml()
                .map_err(|e| anyhow::anyhow!("Failed to render config: {}", e))?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const BATCH: &str = concat!(
        r#"{"id": "greeting", "query": "What does jambo mean?", "retrieved": [{"id": "A", "text": "Jambo is a greeting."}, {"id": "B", "text": "Asante means thank you."}], "relevant_ids_or_scores": ["greeting"], "answer": "Jambo is a greeting.", "expected_points": ["greeting"], "start_ts": 0.0, "end_ts": 1.5}"#,
        "\n",
        r#"{"id": "thanks", "query": "How do I say thank you?", "retrieved_ids": ["B", "A"], "relevant_ids_or_scores": {"B": 2}, "answer": "Asante.", "ground_truth": "Asante", "start_ts": 1.0, "end_ts": 7.0}"#,
        "\n",
    );

    fn eval_args(input: &Path, output: Option<&Path>) -> EvalArgs {
        EvalArgs {
            input: input.to_path_buf(),
            output: output.map(Path::to_path_buf),
            concurrency: Some(2),
            threshold: None,
            k: Some(3),
            offline: true,
            summary_only: false,
        }
    }

    #[test]
    fn test_offline_overrides() {
        let dir = TempDir::new().unwrap();
        let mut config = LughaConfig::default();
        apply_eval_overrides(&mut config, &eval_args(&dir.path().join("x.jsonl"), None));
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.provider, "none");
        assert_eq!(config.evaluation.concurrency, 2);
        assert_eq!(config.evaluation.ndcg_k, 3);
        assert!(!config.evaluation.metrics.contains(&MetricKind::Faithfulness));
    }

    #[tokio::test]
    async fn test_eval_offline_writes_report() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("batch.jsonl");
        let output = dir.path().join("out").join("report.json");
        std::fs::write(&input, BATCH).unwrap();

        handle_command(
            Commands::Eval(eval_args(&input, Some(&output))),
            dir.path(),
        )
        .await
        .unwrap();

        let report = EvaluationReport::load(&output).unwrap();
        assert_eq!(report.total_samples, 2);
        assert_eq!(report.samples.len(), 2);
        assert_eq!(report.samples[0].sample_id, "greeting");
        assert_eq!(report.latency.evaluated, 2);
        assert_eq!(report.latency.acceptable, 1);
        assert!(report.aggregate(MetricKind::Faithfulness).is_none());
        assert_eq!(report.coverage(MetricKind::AnswerCorrectness), (1, 2));
        assert_eq!(report.coverage(MetricKind::AnswerCompleteness), (1, 2));
        assert_eq!(report.mean(MetricKind::ReciprocalRank), Some(1.0));

        handle_command(Commands::Report { file: output }, dir.path())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_eval_rejects_empty_batch() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.jsonl");
        std::fs::write(&input, "\n").unwrap();
        let result = handle_command(Commands::Eval(eval_args(&input, None)), dir.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_validate_text() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Validate {
            text: Some("CORRECTED: Habari\nEXPLANATION: ok\nCONFIDENCE: 0.9".into()),
            file: None,
            json: true,
        };
        assert!(handle_command(command, dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).await.unwrap();

        let config_path = workspace.join(".lugha").join("config.toml");
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: LughaConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.language, "Kiswahili");
        assert_eq!(parsed.evaluation.ndcg_k, 5);
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).await.unwrap();
        let config_path = workspace.join(".lugha").join("config.toml");
        let content_first = std::fs::read_to_string(&config_path).unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace).await.unwrap();
        let content_second = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(content_first, content_second);
    }

    #[tokio::test]
    async fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        assert!(handle_command(command, dir.path()).await.is_ok());
    }
}
