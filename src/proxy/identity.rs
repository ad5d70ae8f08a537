//! Principal from trusted front-proxy headers.

use axum::http::{HeaderMap, HeaderName};
use std::collections::BTreeSet;

use crate::catalogue::Principal;
use crate::config::IdentityConfig;

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    user_header: HeaderName,
    groups_header: HeaderName,
    separator: String,
}

impl IdentityResolver {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, String> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| format!("invalid identity header {name}: {e}"))
        };
        Ok(Self {
            user_header: parse(&config.user_header)?,
            groups_header: parse(&config.groups_header)?,
            separator: config.group_separator.clone(),
        })
    }

    /// No user header means anonymous; groups without a user are ignored.
    pub fn resolve(&self, headers: &HeaderMap) -> Principal {
        let Some(id) = headers
            .get(&self.user_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Principal::Anonymous;
        };

        let groups: BTreeSet<String> = headers
            .get_all(&self.groups_header)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(self.separator.as_str()))
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();

        Principal::User {
            id: id.to_string(),
            groups,
        }
    }
}
