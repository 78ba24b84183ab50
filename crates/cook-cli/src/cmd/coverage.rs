use crate::output::print_json;
use anyhow::Context;
use cook_core::coverage::run_structural_verification;
use cook_core::git::GitFacts;
use cook_core::types::Verdict;
use std::path::Path;

pub fn run(
    root: &Path,
    artifact: &str,
    branch: Option<&str>,
    base: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let artifact_path = super::resolve_artifact(root, artifact)?;
    let facts = GitFacts::new(root);

    let result = run_structural_verification(&facts, &artifact_path, branch, base)
        .with_context(|| format!("coverage check failed for {}", artifact_path.display()))?;

    if json {
        print_json(&result)?;
    } else {
        println!("{}", result.report);
        println!("Verdict: {}", result.verdict);
        for reason in &result.reasons {
            println!("  - {reason}");
        }
    }

    if result.verdict == Verdict::NeedsWork {
        std::process::exit(1);
    }
    Ok(())
}
