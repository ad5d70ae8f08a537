//! Audit destinations.

use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{AuditError, ProxyLogEntry};
use crate::config::AuditSinkConfig;

pub enum AuditSink {
    /// Structured `tracing` events on the `audit` target.
    Tracing,
    /// One JSON object per line, appended.
    Jsonl(PathBuf),
    /// JSON array POSTed per batch.
    Http {
        client: reqwest::Client,
        url: String,
        token: Option<String>,
    },
}

impl AuditSink {
    pub fn from_config(config: &AuditSinkConfig, timeout: Duration) -> Result<Self, AuditError> {
        Ok(match config {
            AuditSinkConfig::Tracing => AuditSink::Tracing,
            AuditSinkConfig::Jsonl { path } => AuditSink::Jsonl(PathBuf::from(path)),
            AuditSinkConfig::Http { url, token } => AuditSink::Http {
                client: reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| AuditError::Http(e.to_string()))?,
                url: url.clone(),
                token: token.clone(),
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuditSink::Tracing => "tracing",
            AuditSink::Jsonl(_) => "jsonl",
            AuditSink::Http { .. } => "http",
        }
    }

    pub async fn write(&self, batch: &[ProxyLogEntry]) -> Result<(), AuditError> {
        if batch.is_empty() {
            return Ok(());
        }
        match self {
            AuditSink::Tracing => {
                for e in batch {
                    tracing::info!(
                        target: "audit",
                        request_id = %e.request_id,
                        service = %e.service,
                        operation = e.operation.as_deref().unwrap_or("-"),
                        principal = %e.principal,
                        matched_rules = ?e.matched_rule_ids,
                        decision = e.decision.map(|d| d.as_str()).unwrap_or("-"),
                        outcome = e.outcome.as_str(),
                        status = e.status_code,
                        bytes = e.bytes_transferred,
                        entities = ?e.entity_count,
                        duration_ms = e.duration_ms,
                        "Proxied call"
                    );
                }
                Ok(())
            }
            AuditSink::Jsonl(path) => {
                let mut lines = Vec::new();
                for e in batch {
                    serde_json::to_writer(&mut lines, e)?;
                    lines.push(b'\n');
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&lines).await?;
                file.flush().await?;
                Ok(())
            }
            AuditSink::Http { client, url, token } => {
                let mut request = client.post(url).json(batch);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                let response = request.send().await.map_err(|e| AuditError::Http(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(AuditError::Status(response.status().as_u16()));
                }
                Ok(())
            }
        }
    }
}
