//! Catalog REST API: types, query keys and a thin read-only client.

mod client;
mod keys;
mod types;

pub use client::CatalogClient;
pub use keys::CatalogQueryKey;
pub use types::{Article, CatalogRow, Prompt, Tool};
