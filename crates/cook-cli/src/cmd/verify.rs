use crate::output::print_json;
use anyhow::Context;
use cook_core::coverage::run_structural_verification;
use cook_core::git::GitFacts;
use cook_core::types::Verdict;
use cook_core::verify::{
    build_full_prompt, combine_results, extract_verification_items, format_verification_report,
    parse_verification_response, run_simplified_verification,
};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn run(
    root: &Path,
    artifact: &str,
    branch: Option<&str>,
    base: Option<&str>,
    prompt: bool,
    response: Option<&Path>,
    simplified: bool,
    json: bool,
) -> anyhow::Result<()> {
    let artifact_path = super::resolve_artifact(root, artifact)?;

    // Prompt emission stands alone: the external judge consumes it and
    // its response comes back through --response.
    if prompt {
        let full = build_full_prompt(root, &artifact_path)?;
        if json {
            print_json(&full)?;
        } else {
            println!("{}", full.prompt);
        }
        return Ok(());
    }

    let semantic = if let Some(response_path) = response {
        let text = std::fs::read_to_string(response_path)
            .with_context(|| format!("cannot read response file {}", response_path.display()))?;
        let items = extract_verification_items(&artifact_path)?;
        parse_verification_response(&text, &items)
    } else {
        if !simplified {
            tracing::info!("no judge response given, falling back to simplified checks");
        }
        run_simplified_verification(root, &artifact_path)?
    };

    let facts = GitFacts::new(root);
    let structural = run_structural_verification(&facts, &artifact_path, branch, base)
        .with_context(|| format!("structural check failed for {}", artifact_path.display()))?;

    let combined = combine_results(structural, semantic);

    if json {
        print_json(&combined)?;
    } else {
        println!("{}", combined.structural.report);
        println!("{}", format_verification_report(&combined.semantic));
        println!("Combined verdict: {}", combined.combined_verdict);
    }

    if combined.combined_verdict == Verdict::NeedsWork {
        std::process::exit(1);
    }
    Ok(())
}
