//! Query keys for catalog API calls.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::query::QueryKey;

/// Query key types for catalog API calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogQueryKey {
  Tools,
  Articles,
  Prompts,
}

impl CatalogQueryKey {
  fn table(&self) -> &'static str {
    match self {
      Self::Tools => "tools",
      Self::Articles => "articles",
      Self::Prompts => "prompts",
    }
  }
}

impl QueryKey for CatalogQueryKey {
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.identity().to_string().as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn identity(&self) -> Value {
    json!(["catalog", self.table()])
  }

  fn description(&self) -> String {
    format!("catalog {}", self.table())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hashes_are_stable_and_distinct() {
    let tools = CatalogQueryKey::Tools.cache_hash();

    assert_eq!(tools.len(), 64);
    assert_eq!(tools, CatalogQueryKey::Tools.cache_hash());
    assert_ne!(tools, CatalogQueryKey::Articles.cache_hash());
    assert_ne!(tools, CatalogQueryKey::Prompts.cache_hash());
  }

  #[test]
  fn test_identity() {
    assert_eq!(
      CatalogQueryKey::Prompts.identity(),
      json!(["catalog", "prompts"])
    );
  }
}
