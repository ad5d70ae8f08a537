//! Immutable, compiled view of the catalogue.
//!
//! Rules live in a flat arena; an index maps `(service, subject)` to arena
//! positions. A subject is either a concrete layer or the service itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::catalogue::{AllowedOperation, CatalogueDocument, SecuredService};
use crate::geometry::{Area, GeometryError};
use crate::ogc::Operation;

/// Reasons a rule is left out of the active snapshot.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleConfigurationError {
    #[error("references unknown service {0}")]
    UnknownService(String),

    #[error("references layer {0} which the service does not declare")]
    UnknownLayer(String),

    #[error("operation {0} does not exist for this service kind")]
    OperationNotApplicable(Operation),

    #[error("allowed area is unusable: {0}")]
    InvalidArea(GeometryError),

    #[error("rule id is used more than once")]
    DuplicateId,

    #[error("rule cannot be read: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Service,
    Layer(String),
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: u64,
    pub service: String,
    /// Empty: service-wide.
    pub layers: BTreeSet<String>,
    pub operations: BTreeSet<Operation>,
    pub groups: BTreeSet<String>,
    pub area: Option<Area>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedRule {
    /// Missing when the record is too broken to carry a readable id.
    pub id: Option<u64>,
    pub service: String,
    pub reason: String,
}

/// Rules relevant to one subject.
#[derive(Debug)]
pub enum RuleLookup<'a> {
    /// No rule references the subject.
    Open,
    /// Referenced; only these rules may grant access.
    Closed(Vec<&'a CompiledRule>),
}

#[derive(Debug)]
pub struct RuleSnapshot {
    services: HashMap<String, Arc<SecuredService>>,
    rules: Vec<CompiledRule>,
    index: HashMap<(String, Subject), Vec<usize>>,
    closed: HashSet<(String, Subject)>,
    excluded: Vec<ExcludedRule>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl RuleSnapshot {
    /// Snapshot with no services at all. Every request resolves to an
    /// unknown service until a catalogue is loaded.
    pub fn empty() -> Self {
        Self {
            services: HashMap::new(),
            rules: Vec::new(),
            index: HashMap::new(),
            closed: HashSet::new(),
            excluded: Vec::new(),
            generation: 0,
            loaded_at: Utc::now(),
        }
    }

    pub fn compile(doc: CatalogueDocument, generation: u64) -> Self {
        let services: HashMap<String, Arc<SecuredService>> = doc
            .services
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(s)))
            .collect();

        let mut snapshot = Self {
            services,
            generation,
            ..Self::empty()
        };
        let mut seen_ids = HashSet::new();

        for record in doc.rules {
            let rule = match record.parse() {
                Ok(rule) => rule,
                Err(e) => {
                    let service = record.service().unwrap_or_default().to_string();
                    let subjects = subjects_from(record.layers());
                    snapshot.exclude(
                        record.id(),
                        service,
                        subjects,
                        RuleConfigurationError::Malformed(e.to_string()),
                    );
                    continue;
                }
            };

            let subjects = subjects_from(rule.layers.clone());
            let outcome = if seen_ids.insert(rule.id) {
                snapshot.check(&rule)
            } else {
                Err(RuleConfigurationError::DuplicateId)
            };

            match outcome {
                Ok(area) => {
                    let pos = snapshot.rules.len();
                    for subject in subjects {
                        let key = (rule.service.clone(), subject);
                        snapshot.closed.insert(key.clone());
                        snapshot.index.entry(key).or_default().push(pos);
                    }
                    snapshot.rules.push(CompiledRule {
                        id: rule.id,
                        service: rule.service,
                        layers: rule.layers,
                        operations: rule.operations,
                        groups: rule.groups,
                        area,
                        description: rule.description,
                    });
                }
                Err(reason) => snapshot.exclude(Some(rule.id), rule.service, subjects, reason),
            }
        }

        snapshot
    }

    fn exclude(
        &mut self,
        id: Option<u64>,
        service: String,
        subjects: Vec<Subject>,
        reason: RuleConfigurationError,
    ) {
        tracing::warn!(
            rule_id = ?id,
            service = %service,
            reason = %reason,
            "Excluding access rule from snapshot"
        );
        // The subjects stay closed; a broken rule must not open them up.
        if !service.is_empty() {
            for subject in subjects {
                self.closed.insert((service.clone(), subject));
            }
        }
        self.excluded.push(ExcludedRule {
            id,
            service,
            reason: reason.to_string(),
        });
    }

    fn check(&self, rule: &AllowedOperation) -> Result<Option<Area>, RuleConfigurationError> {
        let service = self
            .services
            .get(&rule.service)
            .ok_or_else(|| RuleConfigurationError::UnknownService(rule.service.clone()))?;

        if service.declares_layers() {
            if let Some(layer) = rule.layers.iter().find(|l| !service.has_layer(l)) {
                return Err(RuleConfigurationError::UnknownLayer(layer.clone()));
            }
        }
        if let Some(op) = rule.operations.iter().find(|op| !op.applies_to(service.kind)) {
            return Err(RuleConfigurationError::OperationNotApplicable(*op));
        }
        rule.allowed_area
            .as_deref()
            .map(Area::from_wkt)
            .transpose()
            .map_err(RuleConfigurationError::InvalidArea)
    }

    pub fn service(&self, id: &str) -> Option<&Arc<SecuredService>> {
        self.services.get(id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<SecuredService>> {
        self.services.values()
    }

    pub fn lookup(&self, service: &str, subject: &Subject) -> RuleLookup<'_> {
        let key = (service.to_string(), subject.clone());
        if !self.closed.contains(&key) {
            return RuleLookup::Open;
        }
        let rules = self
            .index
            .get(&key)
            .map(|positions| positions.iter().map(|&i| &self.rules[i]).collect())
            .unwrap_or_default();
        RuleLookup::Closed(rules)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn excluded(&self) -> &[ExcludedRule] {
        &self.excluded
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

fn subjects_from(layers: BTreeSet<String>) -> Vec<Subject> {
    if layers.is_empty() {
        vec![Subject::Service]
    } else {
        layers.into_iter().map(Subject::Layer).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> CatalogueDocument {
        toml::from_str(
            r#"
            [[services]]
            id = "wms1"
            kind = "WMS"
            layers = [{ name = "A" }, { name = "B" }, { name = "C" }]

            [[rules]]
            id = 1
            service = "wms1"
            layers = ["A"]
            operations = ["GetMap"]

            [[rules]]
            id = 2
            service = "wms1"
            layers = ["B"]
            operations = ["GetMap"]
            allowed_area = "POLYGON((0 0,1 0"

            [[rules]]
            id = 3
            service = "wms1"
            layers = ["A"]
            operations = ["GetFeature"]

            [[rules]]
            id = 1
            service = "wms1"
            layers = ["C"]
            operations = ["GetMap"]

            [[rules]]
            id = 4
            service = "ghost"
            operations = ["GetMap"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_rules_are_indexed() {
        let snap = RuleSnapshot::compile(doc(), 1);
        assert_eq!(snap.rule_count(), 1);
        match snap.lookup("wms1", &Subject::Layer("A".into())) {
            RuleLookup::Closed(rules) => assert_eq!(rules[0].id, 1),
            RuleLookup::Open => panic!("layer A must be closed"),
        }
    }

    #[test]
    fn test_excluded_rules_keep_subjects_closed() {
        let snap = RuleSnapshot::compile(doc(), 1);
        assert_eq!(snap.excluded().len(), 4);
        match snap.lookup("wms1", &Subject::Layer("B".into())) {
            RuleLookup::Closed(rules) => assert!(rules.is_empty()),
            RuleLookup::Open => panic!("layer B must stay closed"),
        }
        assert!(matches!(snap.lookup("wms1", &Subject::Layer("C".into())), RuleLookup::Closed(_)));
    }

    #[test]
    fn test_unreferenced_subjects_are_open() {
        let snap = RuleSnapshot::compile(doc(), 1);
        assert!(matches!(snap.lookup("wms1", &Subject::Service), RuleLookup::Open));
        assert!(matches!(snap.lookup("other", &Subject::Layer("A".into())), RuleLookup::Open));
    }

    #[test]
    fn test_unreadable_rule_is_excluded_alone() {
        let doc: CatalogueDocument = toml::from_str(
            r#"
            [[services]]
            id = "wmts"
            kind = "WMS"

            [[rules]]
            id = 1
            service = "wmts"
            layers = ["Roads"]
            operations = ["GetMap"]

            [[rules]]
            id = 2
            service = "wmts"
            layers = ["Tiles"]
            operations = ["GetTile"]
            "#,
        )
        .unwrap();
        let snap = RuleSnapshot::compile(doc, 1);

        assert_eq!(snap.rule_count(), 1);
        assert!(matches!(
            snap.lookup("wmts", &Subject::Layer("Roads".into())),
            RuleLookup::Closed(rules) if rules[0].id == 1
        ));

        assert_eq!(snap.excluded().len(), 1);
        assert_eq!(snap.excluded()[0].id, Some(2));
        assert!(snap.excluded()[0].reason.starts_with("rule cannot be read"));
        match snap.lookup("wmts", &Subject::Layer("Tiles".into())) {
            RuleLookup::Closed(rules) => assert!(rules.is_empty()),
            RuleLookup::Open => panic!("layer of an unreadable rule must stay closed"),
        }
    }
}
