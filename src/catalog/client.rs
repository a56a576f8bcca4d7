use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use url::Url;

use crate::catalog::types::{Article, Prompt, Tool};
use crate::config::Config;

/// Read-only client for the catalog REST API
#[derive(Clone)]
pub struct CatalogClient {
  http: reqwest::Client,
  base: Url,
}

impl CatalogClient {
  pub fn new(config: &Config) -> Result<Self> {
    let raw = config
      .catalog
      .url
      .as_deref()
      .ok_or_else(|| eyre!("No catalog URL configured. Set catalog.url in the config file."))?;
    let base = parse_base(raw)?;

    let mut headers = HeaderMap::new();
    if let Some(key) = Config::get_api_key() {
      let value =
        HeaderValue::from_str(&key).map_err(|e| eyre!("Invalid TOOLSHELF_API_KEY: {}", e))?;
      headers.insert("apikey", value.clone());
      let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
        .map_err(|e| eyre!("Invalid TOOLSHELF_API_KEY: {}", e))?;
      headers.insert(AUTHORIZATION, bearer);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// List catalog tools, newest first
  pub async fn tools(&self) -> Result<Vec<Tool>> {
    self.list("tools", "updated_at.desc").await
  }

  /// List published articles, newest first
  pub async fn articles(&self) -> Result<Vec<Article>> {
    self.list("articles", "published_at.desc").await
  }

  /// List prompts by title
  pub async fn prompts(&self) -> Result<Vec<Prompt>> {
    self.list("prompts", "title.asc").await
  }

  async fn list<T: DeserializeOwned>(&self, table: &str, order: &str) -> Result<Vec<T>> {
    let url = table_url(&self.base, table, order)?;

    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Failed to fetch {}: {}", table, e))?;

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {}: {}", table, e))
  }
}

/// Ensure the base URL ends with a slash so joins append instead of replace
fn parse_base(raw: &str) -> Result<Url> {
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized).map_err(|e| eyre!("Invalid catalog URL {}: {}", raw, e))
}

fn table_url(base: &Url, table: &str, order: &str) -> Result<Url> {
  let mut url = base
    .join(&format!("rest/v1/{}", table))
    .map_err(|e| eyre!("Invalid catalog URL: {}", e))?;
  url
    .query_pairs_mut()
    .append_pair("select", "*")
    .append_pair("order", order);
  Ok(url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_table_url() {
    let base = parse_base("https://catalog.example.com/api").unwrap();
    let url = table_url(&base, "tools", "updated_at.desc").unwrap();

    assert_eq!(
      url.as_str(),
      "https://catalog.example.com/api/rest/v1/tools?select=*&order=updated_at.desc"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(parse_base("not a url").is_err());
  }

  #[test]
  fn test_missing_url_is_error() {
    let err = CatalogClient::new(&Config::default()).err().unwrap();
    assert!(err.to_string().contains("No catalog URL"));
  }
}
