#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cook(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cook").unwrap();
    cmd.current_dir(dir.path()).env("COOK_ROOT", dir.path());
    cmd
}

fn write_artifact(dir: &TempDir, filename: &str, content: &str) {
    let cook_dir = dir.path().join("cook");
    std::fs::create_dir_all(&cook_dir).unwrap();
    std::fs::write(cook_dir.join(filename), content).unwrap();
}

const WELL_DONE: &str = "\
# Checkout Flow

## Dish

Add a new checkout flow with saved cards.

## Status

cooking

## Cooking Mode

well-done

## Ownership

- Decision Owner: @mira

## Scope

### In Scope

- New checkout module

### Out of Scope

- Subscription billing migration

## Pre-mortem

1. Payment provider times out -> retry with backoff
2. Saved card is stale -> revalidate on load
3. Cart drifts during checkout -> re-price at submit

## Trade-offs

Rejected alternative: client-side retries only, due to double-charges.

## Implementation Plan

- `src/checkout.ts` - new checkout module

## QA Plan

### Test Cases

1. Happy path checkout
2. Declined card shows error
3. Timeout falls back to retry

## Security Review

Risk level: low

## Blast Radius & Rollout

### Rollback Steps

1. Revert the deploy

## Changelog

| Date | Summary |
|------|---------|
| 2026-03-01 | Artifact created |
";

// ---------------------------------------------------------------------------
// cook validate
// ---------------------------------------------------------------------------

#[test]
fn validate_passes_complete_artifact() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["validate", "checkout-flow"])
        .assert()
        .success()
        .stdout(predicate::str::contains("VALID"));
}

#[test]
fn validate_fails_on_tbd() {
    let dir = TempDir::new().unwrap();
    let content = WELL_DONE.replace("Risk level: low", "TBD");
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", &content);

    cook(&dir)
        .args(["validate", "checkout-flow"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("INVALID"));
}

#[test]
fn validate_json_reports_mode() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["validate", "checkout-flow", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\": \"well-done\""));
}

#[test]
fn validate_unknown_slug_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("cook")).unwrap();

    cook(&dir)
        .args(["validate", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

// ---------------------------------------------------------------------------
// cook artifact
// ---------------------------------------------------------------------------

#[test]
fn artifact_show_prints_header() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["artifact", "show", "checkout-flow"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: cooking"))
        .stdout(predicate::str::contains("src/checkout.ts"));
}

#[test]
fn artifact_status_set_and_get() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["artifact", "status", "checkout-flow", "well-done"])
        .assert()
        .success();

    cook(&dir)
        .args(["artifact", "status", "checkout-flow"])
        .assert()
        .success()
        .stdout(predicate::str::contains("well-done"));
}

#[test]
fn artifact_changelog_add_and_filter() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args([
            "artifact",
            "changelog",
            "checkout-flow",
            "--add",
            "Implemented retries",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Implemented retries"));
}

// ---------------------------------------------------------------------------
// cook index
// ---------------------------------------------------------------------------

#[test]
fn index_build_then_show() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["index", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 1 artifact(s)"));

    cook(&dir)
        .args(["index", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkout-flow"));
}

#[test]
fn index_stale_exits_nonzero_without_index() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["index", "stale"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("stale"));

    cook(&dir).args(["index", "build"]).assert().success();
    cook(&dir)
        .args(["index", "stale"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh"));
}

#[test]
fn index_stats_counts_statuses() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["index", "stats", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 1"));
}

#[test]
fn index_search_finds_by_title() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["index", "search", "checkout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkout-flow"));
}

#[test]
fn index_similar_scores_matching_files() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args([
            "index",
            "similar",
            "rework the checkout retry handling",
            "--file",
            "src/checkout.ts",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("checkout-flow"));
}

// ---------------------------------------------------------------------------
// cook audit / patterns
// ---------------------------------------------------------------------------

#[test]
fn audit_log_then_list_and_show() {
    let dir = TempDir::new().unwrap();

    cook(&dir)
        .args([
            "audit", "log", "phase-start", "order-1", "design", "--chef", "line-cook",
        ])
        .assert()
        .success();

    cook(&dir)
        .args([
            "audit",
            "log",
            "blocker",
            "order-1",
            "design",
            "missing api docs",
            "--type",
            "dependency",
            "--severity",
            "high",
        ])
        .assert()
        .success();

    cook(&dir)
        .args(["audit", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("order-1"));

    cook(&dir)
        .args(["audit", "show", "order-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blocker"))
        .stdout(predicate::str::contains("missing api docs"));
}

#[test]
fn patterns_report_counts_orders() {
    let dir = TempDir::new().unwrap();

    for order in ["order-1", "order-2"] {
        cook(&dir)
            .args(["audit", "log", "phase-start", order, "design", "--chef", "line-cook"])
            .assert()
            .success();
        cook(&dir)
            .args([
                "audit",
                "log",
                "blocker",
                order,
                "design",
                "flaky integration suite",
                "--type",
                "testing",
                "--severity",
                "high",
            ])
            .assert()
            .success();
    }

    cook(&dir)
        .args(["patterns", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 order(s)"));

    cook(&dir)
        .args(["patterns", "blockers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("testing"));
}

#[test]
fn patterns_report_empty_log_is_fine() {
    let dir = TempDir::new().unwrap();

    cook(&dir)
        .args(["patterns", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 order(s)"));
}

// ---------------------------------------------------------------------------
// cook memory
// ---------------------------------------------------------------------------

#[test]
fn memory_query_empty_history() {
    let dir = TempDir::new().unwrap();

    cook(&dir)
        .args(["memory", "query", "add checkout retries", "--file", "src/checkout.ts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No similar past orders"));
}

#[test]
fn memory_feedback_roundtrip() {
    let dir = TempDir::new().unwrap();

    cook(&dir)
        .args(["memory", "feedback", "order-1", "warning", "helpful"])
        .assert()
        .success();

    cook(&dir)
        .args(["memory", "feedback-stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 helpful"));
}

#[test]
fn memory_feedback_rejects_unknown_value() {
    let dir = TempDir::new().unwrap();

    cook(&dir)
        .args(["memory", "feedback", "order-1", "warning", "great"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// cook verify (prompt path needs no git repo)
// ---------------------------------------------------------------------------

#[test]
fn verify_prompt_emits_items() {
    let dir = TempDir::new().unwrap();
    write_artifact(&dir, "checkout-flow.2026-03-01.cook.md", WELL_DONE);

    cook(&dir)
        .args(["verify", "checkout-flow", "--prompt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("src/checkout.ts"));
}
