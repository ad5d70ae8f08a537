//! Rule matching.
//!
//! Each requested layer is decided independently:
//! 1. no rule references the layer → allow, unbounded
//! 2. otherwise keep the layer's rules plus the service-wide rules that
//!    grant the operation to the principal
//! 3. none left → deny
//! 4. allow with the union of the matching areas; a matching rule without an
//!    area makes the layer unbounded
//!
//! Service-wide rules never close a layer on their own. Layerless requests
//! are decided by the service-wide rules alone.
//!
//! The request is allowed only when every layer is allowed.

use crate::catalogue::Principal;
use crate::geometry::{Area, GeometryError};
use crate::ogc::Operation;

use super::decision::{AuthorizationResult, Decision, LayerDecision};
use super::snapshot::{CompiledRule, RuleLookup, RuleSnapshot, Subject};

/// Decide a request. Geometry errors propagate so the caller can fail closed.
pub fn authorize(
    snapshot: &RuleSnapshot,
    service_id: &str,
    operation: Operation,
    layers: &[String],
    principal: &Principal,
) -> Result<AuthorizationResult, GeometryError> {
    let service_rules = snapshot.lookup(service_id, &Subject::Service);

    let decisions = if layers.is_empty() {
        vec![decide(None, candidates(&service_rules, None), operation, principal)?]
    } else {
        layers
            .iter()
            .map(|layer| {
                let layer_rules = snapshot.lookup(service_id, &Subject::Layer(layer.clone()));
                decide(
                    Some(layer.clone()),
                    candidates(&service_rules, Some(&layer_rules)),
                    operation,
                    principal,
                )
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(AuthorizationResult::from_layers(decisions))
}

/// `None` when the subject is open. Only the layer's own rules decide
/// whether a layer is closed; service-wide rules add grants to it.
fn candidates<'a>(service: &RuleLookup<'a>, layer: Option<&RuleLookup<'a>>) -> Option<Vec<&'a CompiledRule>> {
    match layer {
        None => match service {
            RuleLookup::Closed(rules) => Some(rules.clone()),
            RuleLookup::Open => None,
        },
        Some(RuleLookup::Open) => None,
        Some(RuleLookup::Closed(rules)) => {
            let mut out = rules.clone();
            if let RuleLookup::Closed(service_rules) = service {
                out.extend(service_rules.iter().copied());
            }
            Some(out)
        }
    }
}

fn decide(
    layer: Option<String>,
    candidates: Option<Vec<&CompiledRule>>,
    operation: Operation,
    principal: &Principal,
) -> Result<LayerDecision, GeometryError> {
    let Some(candidates) = candidates else {
        return Ok(LayerDecision::open(layer));
    };

    let matching: Vec<&CompiledRule> = candidates
        .into_iter()
        .filter(|r| r.operations.contains(&operation) && grants(r, principal))
        .collect();

    if matching.is_empty() {
        return Ok(LayerDecision {
            layer,
            decision: Decision::Deny,
            permitted_area: None,
            matched_rule_ids: Vec::new(),
            restricted: true,
        });
    }

    let permitted_area = if matching.iter().any(|r| r.area.is_none()) {
        None
    } else {
        Some(Area::union_all(matching.iter().filter_map(|r| r.area.as_ref()))?)
    };

    Ok(LayerDecision {
        layer,
        decision: Decision::Allow,
        permitted_area,
        matched_rule_ids: matching.iter().map(|r| r.id).collect(),
        restricted: true,
    })
}

fn grants(rule: &CompiledRule, principal: &Principal) -> bool {
    if rule.groups.is_empty() {
        return true;
    }
    match principal.groups() {
        None => false,
        Some(groups) => !rule.groups.is_disjoint(groups),
    }
}
