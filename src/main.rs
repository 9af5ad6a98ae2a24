//! Docsense 命令行入口
//!
//! 用法：`docsense <FILE> [--config <PATH>] [--json]`
//! 加载配置、提交文档、实时打印步骤进度，结束后输出分析结果；运行失败时以非 0 退出。

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use docsense::analysis::{AnalysisResult, StepStatus};
use docsense::backend::DegradedMode;
use docsense::config::{load_config, AppConfig};
use docsense::{observability, AnalysisController, AnalysisStatus, DocumentFile};

struct CliArgs {
    file: PathBuf,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut file = None;
    let mut config = None;
    let mut json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--config" => {
                let path = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("Usage: docsense <FILE> [--config <PATH>] [--json]");
                std::process::exit(0);
            }
            other if file.is_none() => file = Some(PathBuf::from(other)),
            other => anyhow::bail!("Unexpected argument: {}", other),
        }
    }

    Ok(CliArgs {
        file: file.context("Usage: docsense <FILE> [--config <PATH>] [--json]")?,
        config,
        json,
    })
}

fn print_summary(result: &AnalysisResult) {
    println!("Parties:");
    for (i, party) in result.parties.iter().enumerate() {
        let label = match i {
            0 => "First Party",
            1 => "Second Party",
            _ => "Party",
        };
        println!("  {}: {}", label, party);
    }
    println!("Key dates:");
    for date in &result.key_dates {
        println!("  {} - {}", date.date, date.description);
    }
    println!("Clauses:");
    for clause in &result.clauses {
        println!("  [p.{}] {}", clause.page, clause.title);
    }
    println!("Signatures:");
    for sig in &result.signatures {
        println!("  {} ({}) p.{}", sig.name, sig.role, sig.page);
    }
    println!("Summary:\n  {}", result.summary);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;

    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let file = DocumentFile::load(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let controller = AnalysisController::from_config(&cfg, DegradedMode::new());
    let mut state_rx = controller.subscribe();

    // 进度打印：每个步骤状态变化时输出一行
    let progress = tokio::spawn(async move {
        let mut printed: HashMap<_, StepStatus> = HashMap::new();
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            for step in &state.thinking_steps {
                if printed.get(&step.id) != Some(&step.status) {
                    printed.insert(step.id, step.status);
                    tracing::info!(
                        "[{:>3.0}%] {} ... {}",
                        state.progress(),
                        step.description,
                        step.status
                    );
                }
            }
            if state.status.is_terminal() {
                break;
            }
        }
    });

    let handle = controller.submit(file).await?;
    handle.wait().await;
    if let Err(e) = progress.await {
        tracing::warn!("Progress printer stopped: {}", e);
    }

    if controller.is_demo_mode() {
        tracing::warn!("Remote backend unavailable, results come from demo mode");
    }

    let state = controller.snapshot();
    match (state.status, state.result.as_ref()) {
        (AnalysisStatus::Complete, Some(result)) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                print_summary(result);
            }
            Ok(())
        }
        _ => {
            let message = state.error.unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("Analysis failed: {}", message)
        }
    }
}
