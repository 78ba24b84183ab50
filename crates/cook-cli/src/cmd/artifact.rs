use crate::output::{print_json, print_table};
use clap::Subcommand;
use cook_core::artifact::{self, add_changelog_entry, filter_changelog_since, update_status};
use cook_core::io::atomic_write;
use cook_core::types::ArtifactStatus;
use std::path::Path;
use std::str::FromStr;

#[derive(Subcommand)]
pub enum ArtifactSubcommand {
    /// Show parsed header, sections, and patch plan
    Show { artifact: String },
    /// Show or set the artifact status
    Status {
        artifact: String,
        /// New status (omit to just print the current one)
        new_status: Option<String>,
    },
    /// Show the changelog, optionally adding an entry first
    Changelog {
        artifact: String,
        /// Append an entry dated today
        #[arg(long)]
        add: Option<String>,
        /// Only show entries on or after (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ArtifactSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ArtifactSubcommand::Show { artifact } => {
            let path = super::resolve_artifact(root, &artifact)?;
            let parsed = artifact::parse(&path)?;
            let plan = artifact::extract_patch_plan(&parsed.raw);
            if json {
                print_json(&serde_json::json!({
                    "path": parsed.path,
                    "slug": parsed.slug,
                    "date": parsed.date,
                    "header": parsed.header,
                    "sections": parsed.sections.names().collect::<Vec<_>>(),
                    "patchPlan": plan,
                }))?;
            } else {
                println!("{} ({})", parsed.slug, parsed.filename);
                if let Some(title) = &parsed.header.title {
                    println!("Title:  {title}");
                }
                if let Some(status) = parsed.header.status {
                    println!("Status: {status}");
                }
                if let Some(mode) = parsed.header.mode {
                    println!("Mode:   {mode}");
                }
                if let Some(owner) = &parsed.header.owner {
                    println!("Owner:  {owner}");
                }
                println!();
                println!("Sections: {}", parsed.sections.names().collect::<Vec<_>>().join(", "));
                if !plan.is_empty() {
                    println!();
                    let rows = plan
                        .iter()
                        .map(|p| {
                            vec![p.file.clone(), p.action.to_string(), p.description.clone()]
                        })
                        .collect();
                    print_table(&["FILE", "ACTION", "DESCRIPTION"], rows);
                }
            }
            Ok(())
        }
        ArtifactSubcommand::Status {
            artifact,
            new_status,
        } => {
            let path = super::resolve_artifact(root, &artifact)?;
            let parsed = artifact::parse(&path)?;
            match new_status {
                Some(raw) => {
                    let status = ArtifactStatus::from_str(&raw)?;
                    let updated = update_status(&parsed.raw, status);
                    atomic_write(&path, updated.as_bytes())?;
                    if json {
                        print_json(&serde_json::json!({
                            "slug": parsed.slug,
                            "status": status,
                        }))?;
                    } else {
                        println!("{} -> {status}", parsed.slug);
                    }
                }
                None => {
                    if json {
                        print_json(&serde_json::json!({
                            "slug": parsed.slug,
                            "status": parsed.header.status,
                        }))?;
                    } else {
                        match parsed.header.status {
                            Some(status) => println!("{status}"),
                            None => println!("unknown"),
                        }
                    }
                }
            }
            Ok(())
        }
        ArtifactSubcommand::Changelog {
            artifact,
            add,
            since,
        } => {
            let path = super::resolve_artifact(root, &artifact)?;
            let mut parsed = artifact::parse(&path)?;

            if let Some(entry) = add {
                let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
                let updated = add_changelog_entry(&parsed.raw, &entry, &today);
                atomic_write(&path, updated.as_bytes())?;
                parsed = artifact::parse(&path)?;
            }

            let entries = match since.as_deref() {
                Some(date) => filter_changelog_since(&parsed.changelog, date),
                None => parsed.changelog.clone(),
            };

            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No changelog entries");
            } else {
                let rows = entries
                    .iter()
                    .map(|e| vec![e.date.clone(), e.summary.clone()])
                    .collect();
                print_table(&["DATE", "SUMMARY"], rows);
            }
            Ok(())
        }
    }
}
