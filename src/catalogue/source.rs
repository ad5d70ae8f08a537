//! Where catalogue documents come from.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::model::CatalogueDocument;
use crate::config::CatalogueConfig;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading catalogue file failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalogue file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("catalogue request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalogue endpoint answered with status {0}")]
    Status(u16),

    #[error("no catalogue source configured")]
    NotConfigured,
}

/// Supplier of the catalogue document (services + rules).
#[derive(Debug, Clone)]
pub enum RuleSource {
    /// TOML document on disk.
    File(PathBuf),
    /// JSON document served by the catalogue.
    Http {
        client: reqwest::Client,
        url: String,
        token: Option<String>,
    },
    /// Fixed document, used by embedding code and tests.
    Static(CatalogueDocument),
}

impl RuleSource {
    pub fn from_config(config: &CatalogueConfig, timeout: Duration) -> Result<Self, SourceError> {
        if let Some(path) = &config.path {
            return Ok(RuleSource::File(PathBuf::from(path)));
        }
        if let Some(url) = &config.url {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            return Ok(RuleSource::Http {
                client,
                url: url.clone(),
                token: config.token.clone(),
            });
        }
        Err(SourceError::NotConfigured)
    }

    pub async fn load(&self) -> Result<CatalogueDocument, SourceError> {
        match self {
            RuleSource::File(path) => {
                let text = tokio::fs::read_to_string(path).await?;
                Ok(toml::from_str(&text)?)
            }
            RuleSource::Http { client, url, token } => {
                let mut request = client.get(url);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(SourceError::Status(response.status().as_u16()));
                }
                Ok(response.json::<CatalogueDocument>().await?)
            }
            RuleSource::Static(doc) => Ok(doc.clone()),
        }
    }

    /// Local file backing this source, if any.
    pub fn watch_path(&self) -> Option<&PathBuf> {
        match self {
            RuleSource::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RuleSource::File(path) => format!("file:{}", path.display()),
            RuleSource::Http { url, .. } => url.clone(),
            RuleSource::Static(_) => "static".to_string(),
        }
    }
}
