//! Per-invocation context.
//!
//! The order ID (the active cook) is carried explicitly rather than read
//! from a shared state file, so every operation is a pure function of its
//! arguments plus the files it names.

use crate::paths;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RunContext {
    /// Project root (the directory holding `cook/` and `.cook/`).
    pub root: PathBuf,
    /// Active cook ID (`<slug>.<date>`), when one is in flight.
    pub order_id: Option<String>,
}

impl RunContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            order_id: None,
        }
    }

    pub fn with_order(root: impl Into<PathBuf>, order_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            order_id: Some(order_id.into()),
        }
    }

    pub fn cook_dir(&self) -> PathBuf {
        paths::cook_dir(&self.root)
    }

    pub fn audit_path(&self) -> PathBuf {
        paths::audit_path(&self.root)
    }

    pub fn feedback_path(&self) -> PathBuf {
        paths::feedback_path(&self.root)
    }

    pub fn index_path(&self) -> PathBuf {
        paths::index_path(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
