//! Authorization outcomes.

use serde::Serialize;

use crate::geometry::Area;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
        }
    }
}

/// Decision for one requested layer, or for the service itself when the
/// request names no layers (`layer = None`).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDecision {
    pub layer: Option<String>,
    pub decision: Decision,
    /// `None`: unrestricted.
    pub permitted_area: Option<Area>,
    pub matched_rule_ids: Vec<u64>,
    /// At least one rule references the subject.
    pub restricted: bool,
}

impl LayerDecision {
    pub fn open(layer: Option<String>) -> Self {
        Self {
            layer,
            decision: Decision::Allow,
            permitted_area: None,
            matched_rule_ids: Vec::new(),
            restricted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResult {
    pub layers: Vec<LayerDecision>,
    pub decision: Decision,
}

impl AuthorizationResult {
    /// Every subject must be allowed.
    pub fn from_layers(layers: Vec<LayerDecision>) -> Self {
        let decision = if layers.iter().all(|l| l.decision == Decision::Allow) {
            Decision::Allow
        } else {
            Decision::Deny
        };
        Self { layers, decision }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn matched_rule_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .layers
            .iter()
            .flat_map(|l| l.matched_rule_ids.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Areas of all allowed layers that carry a bounded area.
    pub fn bounded_areas(&self) -> Vec<&Area> {
        self.layers
            .iter()
            .filter(|l| l.decision == Decision::Allow)
            .filter_map(|l| l.permitted_area.as_ref())
            .collect()
    }

    pub fn denied_layers(&self) -> Vec<&str> {
        self.layers
            .iter()
            .filter(|l| l.decision == Decision::Deny)
            .map(|l| l.layer.as_deref().unwrap_or("<service>"))
            .collect()
    }
}
