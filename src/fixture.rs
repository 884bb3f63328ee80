//! Fixture resolution.
//!
//! Named fixtures (JSON bodies kept next to the tests) are turned into text
//! before a matcher or response is built from them.

use crate::error::{MockError, Result};
use std::path::PathBuf;
use tracing::debug;

/// Turns a fixture name into its content.
pub trait FixtureResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<String>;
}

/// Resolves fixtures relative to a directory.
#[derive(Debug, Clone)]
pub struct FixtureDir {
    root: PathBuf,
}

impl FixtureDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FixtureResolver for FixtureDir {
    fn resolve(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        debug!(fixture = %name, path = %path.display(), "Reading fixture");
        std::fs::read_to_string(&path).map_err(|source| MockError::Fixture {
            name: name.to_string(),
            source,
        })
    }
}

/// Resolver for dispatchers without a fixture directory. Always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFixtures;

impl FixtureResolver for NoFixtures {
    fn resolve(&self, name: &str) -> Result<String> {
        Err(MockError::NoFixtureResolver(name.to_string()))
    }
}
