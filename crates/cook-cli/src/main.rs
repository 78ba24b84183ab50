mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    artifact::ArtifactSubcommand, audit::AuditSubcommand, index::IndexSubcommand,
    memory::MemorySubcommand, patterns::PatternsSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cook",
    about = "Cook workflow toolkit — verify implementations against plans, detect drift, and mine the audit trail",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from cook/ or .git/)
    #[arg(long, global = true, env = "COOK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check plan-vs-git coverage for an artifact
    Coverage {
        /// Artifact slug or path
        artifact: String,
        /// Branch whose changes to inspect (default: current)
        #[arg(long)]
        branch: Option<String>,
        /// Base to diff against (default: main branch)
        #[arg(long)]
        base: Option<String>,
    },

    /// Compare planned files against what actually changed
    Drift {
        artifact: String,
        /// Commit range to inspect (e.g. HEAD~5..HEAD)
        #[arg(long)]
        range: Option<String>,
        /// Inspect commits since a date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },

    /// Structural plus semantic verification of an implementation
    Verify {
        artifact: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        base: Option<String>,
        /// Emit the judge prompt instead of verifying
        #[arg(long)]
        prompt: bool,
        /// Parse a judge response file and combine it with the structural check
        #[arg(long)]
        response: Option<PathBuf>,
        /// Skip the judge and use content heuristics
        #[arg(long)]
        simplified: bool,
    },

    /// Run mode-aware quality checks on an artifact
    Validate {
        artifact: String,
        /// Override the cooking mode (well-done, microwave)
        #[arg(long)]
        mode: Option<String>,
        /// Check ids to skip (repeatable)
        #[arg(long = "skip")]
        skip: Vec<String>,
        /// Show passing checks and failure details
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Build and query the artifact index
    Index {
        #[command(subcommand)]
        subcommand: IndexSubcommand,
    },

    /// Read and append to the audit log
    Audit {
        #[command(subcommand)]
        subcommand: AuditSubcommand,
    },

    /// Mine the audit log for recurring patterns
    Patterns {
        #[command(subcommand)]
        subcommand: PatternsSubcommand,
    },

    /// Retrieve similar past work and phase insights
    Memory {
        #[command(subcommand)]
        subcommand: MemorySubcommand,
    },

    /// Inspect and update a single artifact
    Artifact {
        #[command(subcommand)]
        subcommand: ArtifactSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root_path = cli.root.as_deref();
    let root = root::resolve_root(root_path);

    let result = match cli.command {
        Commands::Coverage {
            artifact,
            branch,
            base,
        } => cmd::coverage::run(&root, &artifact, branch.as_deref(), base.as_deref(), cli.json),
        Commands::Drift {
            artifact,
            range,
            since,
        } => cmd::drift::run(&root, &artifact, range.as_deref(), since.as_deref(), cli.json),
        Commands::Verify {
            artifact,
            branch,
            base,
            prompt,
            response,
            simplified,
        } => cmd::verify::run(
            &root,
            &artifact,
            branch.as_deref(),
            base.as_deref(),
            prompt,
            response.as_deref(),
            simplified,
            cli.json,
        ),
        Commands::Validate {
            artifact,
            mode,
            skip,
            verbose,
        } => cmd::validate::run(&root, &artifact, mode.as_deref(), &skip, verbose, cli.json),
        Commands::Index { subcommand } => cmd::index::run(&root, subcommand, cli.json),
        Commands::Audit { subcommand } => cmd::audit::run(&root, subcommand, cli.json),
        Commands::Patterns { subcommand } => cmd::patterns::run(&root, subcommand, cli.json),
        Commands::Memory { subcommand } => cmd::memory::run(&root, subcommand, cli.json),
        Commands::Artifact { subcommand } => cmd::artifact::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
