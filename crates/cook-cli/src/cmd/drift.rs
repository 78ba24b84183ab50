use crate::output::print_json;
use anyhow::Context;
use cook_core::drift::{analyze_drift, format_drift_report};
use cook_core::git::GitFacts;
use std::path::Path;

pub fn run(
    root: &Path,
    artifact: &str,
    range: Option<&str>,
    since: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let artifact_path = super::resolve_artifact(root, artifact)?;
    let facts = GitFacts::new(root);

    let analysis = analyze_drift(&facts, &artifact_path, range, since)
        .with_context(|| format!("drift analysis failed for {}", artifact_path.display()))?;

    if json {
        print_json(&analysis)?;
    } else {
        println!("{}", format_drift_report(&analysis));
    }

    if analysis.drift.has_drift {
        std::process::exit(1);
    }
    Ok(())
}
