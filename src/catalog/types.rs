use serde::{Deserialize, Serialize};

/// An AI tool listed in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

/// A published article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub excerpt: String,
  #[serde(default)]
  pub author: Option<String>,
  #[serde(default)]
  pub published_at: Option<String>,
}

/// A reusable prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub tags: Vec<String>,
}

/// One row of a catalog list view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
  pub title: String,
  pub tag: String,
  pub detail: String,
}

impl From<&Tool> for CatalogRow {
  fn from(tool: &Tool) -> Self {
    Self {
      title: tool.name.clone(),
      tag: tool.category.clone().unwrap_or_default(),
      detail: tool.description.clone(),
    }
  }
}

impl From<&Article> for CatalogRow {
  fn from(article: &Article) -> Self {
    Self {
      title: article.title.clone(),
      tag: article.author.clone().unwrap_or_default(),
      detail: article.excerpt.clone(),
    }
  }
}

impl From<&Prompt> for CatalogRow {
  fn from(prompt: &Prompt) -> Self {
    Self {
      title: prompt.title.clone(),
      tag: prompt.tags.first().cloned().unwrap_or_default(),
      detail: prompt.body.lines().next().unwrap_or_default().to_string(),
    }
  }
}
