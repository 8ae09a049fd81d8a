//! Command-line arguments

use clap::{Args, Parser, Subcommand, ValueEnum};
use snipverify_core::{ExpectedOutput, Language};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "snipverify", version, about = "Verify untrusted code snippets in a sandbox")]
pub(crate) struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Verify one source file
    Verify(VerifyArgs),
    /// Extract code blocks from answer HTML and verify them in order
    VerifyBlocks(VerifyBlocksArgs),
    /// Parse and validate an engine config file
    CheckConfig {
        path: PathBuf,
    },
    /// Check the sandbox backend
    Health {
        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum RuntimeKind {
    Docker,
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExpectKind {
    Exact,
    Contains,
    Regex,
}

#[derive(Debug, Args)]
pub(crate) struct BackendArgs {
    /// Isolation backend
    #[arg(long, value_enum, default_value_t = RuntimeKind::Docker)]
    pub runtime: RuntimeKind,

    /// Engine config (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct VerifyArgs {
    /// Source file to verify
    pub file: PathBuf,

    /// Snippet language; inferred from the file extension when omitted
    #[arg(long, short)]
    pub language: Option<String>,

    /// Wall-clock deadline for the run
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Expected stdout
    #[arg(long)]
    pub expect: Option<String>,

    /// How `--expect` is compared
    #[arg(long, value_enum, default_value_t = ExpectKind::Exact, requires = "expect")]
    pub expect_kind: ExpectKind,

    /// Skip the static deny-list screen
    #[arg(long)]
    pub no_screen: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

impl VerifyArgs {
    pub(crate) fn expected(&self) -> Option<ExpectedOutput> {
        self.expect.clone().map(|value| match self.expect_kind {
            ExpectKind::Exact => ExpectedOutput::Exact(value),
            ExpectKind::Contains => ExpectedOutput::Contains(value),
            ExpectKind::Regex => ExpectedOutput::Regex(value),
        })
    }
}

#[derive(Debug, Args)]
pub(crate) struct VerifyBlocksArgs {
    /// HTML file holding the answer body
    pub html_file: PathBuf,

    /// Language of the code blocks
    #[arg(long, short)]
    pub language: String,

    /// Skip the static deny-list screen
    #[arg(long)]
    pub no_screen: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

/// Language from an explicit flag, else from the file extension
pub(crate) fn resolve_language(flag: Option<&str>, file: &Path) -> Option<Language> {
    if let Some(tag) = flag {
        return Some(Language::parse(tag));
    }
    let ext = file.extension()?.to_str()?;
    match Language::parse(ext) {
        Language::Other(_) => None,
        language => Some(language),
    }
}
