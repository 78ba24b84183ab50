use crate::output::print_json;
use cook_core::artifact;
use cook_core::types::CookingMode;
use cook_core::validate::{format_result, validate_artifact};
use std::path::Path;
use std::str::FromStr;

pub fn run(
    root: &Path,
    artifact_arg: &str,
    mode: Option<&str>,
    skip: &[String],
    verbose: bool,
    json: bool,
) -> anyhow::Result<()> {
    let artifact_path = super::resolve_artifact(root, artifact_arg)?;
    let parsed = artifact::parse(&artifact_path)?;

    let mode_override = mode.map(CookingMode::from_str).transpose()?;
    let result = validate_artifact(&parsed, mode_override, skip);

    if json {
        print_json(&result)?;
    } else {
        println!(
            "Validating {} ({} mode)",
            parsed.filename, result.mode
        );
        let body = format_result(&result, verbose);
        if !body.is_empty() {
            println!("{body}");
        }
        println!(
            "{}: {} error(s), {} warning(s)",
            if result.valid { "VALID" } else { "INVALID" },
            result.error_count,
            result.warning_count
        );
    }

    if !result.valid {
        std::process::exit(1);
    }
    Ok(())
}
