//! Version-control facts provider.
//!
//! A narrow, read-only wrapper over the `git` binary: current branch,
//! changed files vs a base, cook-tagged commit listing, foreign-commit
//! detection. Advisory queries ("is there a branch named X") swallow
//! failures into empty results — not being in a repository is never fatal
//! here. Load-bearing callers (coverage) surface their own explicit error
//! states instead of fabricating numbers.
//!
//! Every subprocess call carries an explicit timeout; git is the only
//! genuinely blocking external dependency in the pipeline.

use crate::error::{CookError, Result};
use crate::types::ChangeStatus;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One file touched relative to a base reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub file: String,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Handle to a repository working directory.
#[derive(Debug, Clone)]
pub struct GitFacts {
    root: PathBuf,
    timeout: Duration,
}

// ---------------------------------------------------------------------------
// Subprocess plumbing
// ---------------------------------------------------------------------------

fn drain(stream: Option<impl Read + Send + 'static>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut s) = stream {
            let _ = s.read_to_string(&mut buf);
        }
        buf
    })
}

impl GitFacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run git with the configured timeout. Reader threads keep the pipes
    /// drained so a chatty command cannot deadlock against a full pipe.
    fn run(&self, args: &[&str]) -> Result<String> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CookError::Git(format!("failed to spawn git: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CookError::GitTimeout(self.timeout.as_secs()));
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(CookError::Git(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                status.code().map_or("signal".to_string(), |c| c.to_string()),
                err.trim()
            )));
        }
        Ok(out.trim().to_string())
    }

    /// Advisory form: any failure collapses to `None`.
    fn run_ok(&self, args: &[&str]) -> Option<String> {
        self.run(args).ok()
    }

    // -----------------------------------------------------------------------
    // Repository facts
    // -----------------------------------------------------------------------

    pub fn is_repo(&self) -> bool {
        which::which("git").is_ok() && self.run_ok(&["rev-parse", "--git-dir"]).is_some()
    }

    pub fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.run_ok(&["rev-parse", "--verify", branch]).is_some()
    }

    /// `main` if it exists, else `master`, else whatever the remote HEAD
    /// points at, defaulting to `main`.
    pub fn main_branch(&self) -> String {
        if self.branch_exists("main") {
            return "main".to_string();
        }
        if self.branch_exists("master") {
            return "master".to_string();
        }
        if let Some(remote) = self.run_ok(&["remote", "show", "origin"]) {
            for line in remote.lines() {
                if let Some(rest) = line.trim().strip_prefix("HEAD branch:") {
                    return rest.trim().to_string();
                }
            }
        }
        "main".to_string()
    }

    // -----------------------------------------------------------------------
    // Changed files
    // -----------------------------------------------------------------------

    /// Files changed on `branch` (default: current) relative to `base`
    /// (default: main/master), via the merge-base three-dot form. Returns
    /// empty outside a repository or when a ref is missing.
    pub fn changed_files(&self, branch: Option<&str>, base: Option<&str>) -> Vec<ChangeRecord> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => match self.current_branch() {
                Ok(b) => b,
                Err(_) => return Vec::new(),
            },
        };
        let base = base.map_or_else(|| self.main_branch(), str::to_string);
        let range = format!("{base}...{branch}");

        let Some(output) = self.run_ok(&["diff", "--name-status", &range]) else {
            return Vec::new();
        };

        output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split('\t');
                let letter = parts.next()?.chars().next()?;
                // Renames/copies list old and new path; keep the new one.
                let file = parts.last()?.trim();
                if file.is_empty() {
                    return None;
                }
                Some(ChangeRecord {
                    file: file.to_string(),
                    status: ChangeStatus::from_letter(letter),
                })
            })
            .collect()
    }

    /// Files changed in an arbitrary commit range. Tries `diff` first,
    /// then `diff-tree` so a single commit hash also works.
    pub fn files_in_range(&self, range: &str) -> Vec<String> {
        if let Some(out) = self.run_ok(&["diff", "--name-only", range]) {
            if !out.is_empty() {
                return out.lines().map(str::to_string).collect();
            }
        }
        let Some(out) =
            self.run_ok(&["diff-tree", "--no-commit-id", "--name-only", "-r", range])
        else {
            return Vec::new();
        };
        out.lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Distinct files touched by commits since a date (`YYYY-MM-DD`).
    pub fn files_since(&self, since: &str) -> Vec<String> {
        let Some(out) = self.run_ok(&[
            "log",
            "--since",
            since,
            "--name-only",
            "--pretty=format:",
        ]) else {
            return Vec::new();
        };

        let mut seen = std::collections::BTreeSet::new();
        for line in out.lines() {
            let file = line.trim();
            if !file.is_empty() {
                seen.insert(file.to_string());
            }
        }
        seen.into_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Commit listing
    // -----------------------------------------------------------------------

    fn parse_commit_lines(output: &str, with_date: bool) -> Vec<CommitInfo> {
        output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(if with_date { 4 } else { 3 }, '|');
                let hash = parts.next()?.to_string();
                let message = parts.next().unwrap_or_default().to_string();
                let author = parts.next().unwrap_or_default().to_string();
                let date = if with_date {
                    parts.next().map(str::to_string)
                } else {
                    None
                };
                Some(CommitInfo {
                    hash,
                    message,
                    author,
                    date,
                })
            })
            .collect()
    }

    /// Commits on `branch` carrying a `[cook:<id>]` tag.
    pub fn commits_matching_tag(&self, cook_id: &str, branch: Option<&str>) -> Vec<CommitInfo> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => match self.current_branch() {
                Ok(b) => b,
                Err(_) => return Vec::new(),
            },
        };
        let grep = format!("\\[cook:{cook_id}\\]");
        let Some(out) = self.run_ok(&[
            "log",
            &branch,
            "--grep",
            &grep,
            "--format=%h|%s|%an|%ai",
        ]) else {
            return Vec::new();
        };
        Self::parse_commit_lines(&out, true)
    }

    /// All commits on `branch` not reachable from `base`.
    pub fn all_commits_on_branch(&self, branch: &str, base: Option<&str>) -> Vec<CommitInfo> {
        let base = base.map_or_else(|| self.main_branch(), str::to_string);
        let range = format!("{base}..{branch}");
        let Some(out) = self.run_ok(&["log", &range, "--format=%h|%s|%an"]) else {
            return Vec::new();
        };
        Self::parse_commit_lines(&out, false)
    }

    /// Commits on a cook branch that do not carry the cook tag — work that
    /// slipped onto the branch outside the cook workflow.
    pub fn foreign_commits(&self, branch: &str, cook_id: &str) -> Vec<CommitInfo> {
        let tagged: std::collections::BTreeSet<String> = self
            .commits_matching_tag(cook_id, Some(branch))
            .into_iter()
            .map(|c| c.hash)
            .collect();

        self.all_commits_on_branch(branch, None)
            .into_iter()
            .filter(|c| !tagged.contains(&c.hash))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn commit(dir: &Path, message: &str) {
        git(
            dir,
            &[
                "-c",
                "user.email=test@example.com",
                "-c",
                "user.name=test",
                "commit",
                "-m",
                message,
            ],
        );
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        git(dir, &["add", "."]);
        commit(dir, "initial");
    }

    #[test]
    fn non_repo_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let facts = GitFacts::new(dir.path());
        assert!(!facts.is_repo());
        assert!(facts.changed_files(None, None).is_empty());
        assert!(facts.files_since("2020-01-01").is_empty());
        assert!(facts.commits_matching_tag("x", Some("main")).is_empty());
    }

    #[test]
    fn changed_files_vs_base() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        git(dir.path(), &["checkout", "-q", "-b", "cook/user-auth"]);
        std::fs::write(dir.path().join("a.ts"), "x\n").unwrap();
        git(dir.path(), &["add", "."]);
        commit(dir.path(), "add a.ts [cook:user-auth.2026-01-15]");

        let facts = GitFacts::new(dir.path());
        assert!(facts.is_repo());
        assert_eq!(facts.main_branch(), "main");

        let changes = facts.changed_files(Some("cook/user-auth"), Some("main"));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].file, "a.ts");
        assert_eq!(changes[0].status, ChangeStatus::Added);
    }

    #[test]
    fn tagged_and_foreign_commits() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        git(dir.path(), &["checkout", "-q", "-b", "cook/user-auth"]);
        std::fs::write(dir.path().join("a.ts"), "x\n").unwrap();
        git(dir.path(), &["add", "."]);
        commit(dir.path(), "planned work [cook:user-auth.2026-01-15]");
        std::fs::write(dir.path().join("b.ts"), "y\n").unwrap();
        git(dir.path(), &["add", "."]);
        commit(dir.path(), "drive-by fix");

        let facts = GitFacts::new(dir.path());
        let tagged = facts.commits_matching_tag("user-auth.2026-01-15", Some("cook/user-auth"));
        assert_eq!(tagged.len(), 1);
        assert!(tagged[0].message.contains("planned work"));

        let foreign = facts.foreign_commits("cook/user-auth", "user-auth.2026-01-15");
        assert_eq!(foreign.len(), 1);
        assert_eq!(foreign[0].message, "drive-by fix");
    }

    #[test]
    fn files_in_range_handles_single_commit() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("c.ts"), "z\n").unwrap();
        git(dir.path(), &["add", "."]);
        commit(dir.path(), "add c.ts");

        let facts = GitFacts::new(dir.path());
        let files = facts.files_in_range("HEAD~1..HEAD");
        assert_eq!(files, vec!["c.ts"]);
    }
}
