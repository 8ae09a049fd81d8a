//! snipverify command-line front end

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{BackendArgs, Cli, Command, RuntimeKind, VerifyArgs, VerifyBlocksArgs};
use snipverify_core::{Language, Snippet, Verdict, VerificationResult};
use snipverify_engine::{EngineConfig, VerificationEngine};
use snipverify_pipeline::{
    extract_code_blocks, BlockOutcome, BlockReport, HealthState, RuntimeCheck, SnippetChecker,
};
use snipverify_sandbox::{DockerRuntime, ProcessRuntime, SharedRuntime};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_VERIFIED: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_INFRA: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_INFRA)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Command) -> Result<u8> {
    match command {
        Command::Verify(args) => verify(args).await,
        Command::VerifyBlocks(args) => verify_blocks(args).await,
        Command::CheckConfig { path } => check_config(&path),
        Command::Health { backend } => health(&backend).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn build_runtime(kind: RuntimeKind) -> SharedRuntime {
    match kind {
        RuntimeKind::Docker => Arc::new(DockerRuntime::new()),
        RuntimeKind::Process => Arc::new(ProcessRuntime::new()),
    }
}

async fn build_checker(backend: &BackendArgs, config: EngineConfig, no_screen: bool) -> Result<SnippetChecker> {
    let runtime = build_runtime(backend.runtime);
    if !runtime.is_available().await {
        tracing::warn!(runtime = runtime.name(), "sandbox runtime does not look available");
    }
    let engine = VerificationEngine::new(runtime, config).context("invalid engine configuration")?;
    let checker = SnippetChecker::new(Arc::new(engine));
    Ok(if no_screen { checker.with_screen(None) } else { checker })
}

async fn verify(args: VerifyArgs) -> Result<u8> {
    let Some(language) = cli::resolve_language(args.language.as_deref(), &args.file) else {
        bail!("cannot infer language of {}; pass --language", args.file.display());
    };

    let mut config = load_config(args.backend.config.as_deref())?;
    if let Some(ms) = args.timeout_ms {
        config
            .languages
            .entry(language.as_str().to_string())
            .or_default()
            .timeout_ms = Some(ms);
    }

    let source = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let mut snippet = Snippet::new(source, language);
    if let Some(expected) = args.expected() {
        snippet = snippet.with_expected(expected);
    }

    let checker = build_checker(&args.backend, config, args.no_screen).await?;
    let result = checker.check(&snippet).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(exit_code(result.verdict))
}

async fn verify_blocks(args: VerifyBlocksArgs) -> Result<u8> {
    let html = tokio::fs::read_to_string(&args.html_file)
        .await
        .with_context(|| format!("reading {}", args.html_file.display()))?;
    let blocks = extract_code_blocks(&html);
    if blocks.is_empty() {
        bail!("no code blocks found in {}", args.html_file.display());
    }

    let config = load_config(args.backend.config.as_deref())?;
    let checker = build_checker(&args.backend, config, args.no_screen).await?;
    let report = checker
        .verify_blocks(&blocks, &Language::parse(&args.language))
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let code = match &report.verified {
        Some(_) => EXIT_VERIFIED,
        None if all_infra(&report) => EXIT_INFRA,
        None => EXIT_FAILED,
    };
    Ok(code)
}

fn all_infra(report: &BlockReport) -> bool {
    let mut ran = report.tried.iter().filter_map(|t| match &t.outcome {
        BlockOutcome::Checked { result } => Some(result),
        BlockOutcome::TooShort => None,
    });
    let first = ran.next();
    first.is_some_and(VerificationResult::is_infra_error) && ran.all(VerificationResult::is_infra_error)
}

fn check_config(path: &Path) -> Result<u8> {
    let config = load_config(Some(path))?;
    let registry = config.build_registry().context("building language registry")?;

    println!("config ok: {}", path.display());
    println!("  max_concurrent_sandboxes: {}", config.max_concurrent_sandboxes);
    println!("  queue_timeout: {:?}", config.queue_timeout());
    println!("  provision_attempts: {}", config.provision_attempts);
    println!("  cache: {} entries, ttl {:?}", config.cache_capacity, config.cache_ttl());
    for language in registry.languages() {
        if let Ok(spec) = registry.spec_for(&language) {
            println!(
                "  {language}: {} ({}) deadline {:?}",
                spec.profile().image,
                spec.profile().command.join(" "),
                spec.deadline()
            );
        }
    }
    Ok(EXIT_VERIFIED)
}

async fn health(backend: &BackendArgs) -> Result<u8> {
    let check = RuntimeCheck(build_runtime(backend.runtime));
    let status = HealthState::init(&check).await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(if status.ok { EXIT_VERIFIED } else { EXIT_INFRA })
}

fn exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Verified => EXIT_VERIFIED,
        Verdict::Failed | Verdict::TimedOut => EXIT_FAILED,
        Verdict::InfraError(_) => EXIT_INFRA,
    }
}

fn print_result(result: &VerificationResult) {
    match result.exit_code {
        Some(code) => println!("{} (exit {code}, {:?})", result.verdict, result.elapsed),
        None => println!("{} ({:?})", result.verdict, result.elapsed),
    }
    if !result.stdout.is_empty() {
        println!("--- stdout{} ---", if result.stdout.truncated { " (truncated)" } else { "" });
        print!("{}", result.stdout.as_str());
    }
    if !result.stderr.is_empty() {
        println!("--- stderr{} ---", if result.stderr.truncated { " (truncated)" } else { "" });
        print!("{}", result.stderr.as_str());
    }
    if let Some(detail) = &result.detail {
        println!("detail: {detail}");
    }
}

fn print_report(report: &BlockReport) {
    for tried in &report.tried {
        match &tried.outcome {
            BlockOutcome::TooShort => println!("[{}] skipped: too short", tried.index),
            BlockOutcome::Checked { result } => match &result.detail {
                Some(detail) => println!("[{}] {}: {}", tried.index, result.verdict, last_line(detail)),
                None => println!("[{}] {}", tried.index, result.verdict),
            },
        }
    }
    match &report.verified {
        Some(block) => {
            println!();
            println!("verified block {}:", block.index);
            println!("{}", block.snippet.source());
        }
        None => println!("no block verified"),
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}
