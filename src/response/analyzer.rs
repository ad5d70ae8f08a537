//! Entity counting for feature and record responses.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use super::AnalysisError;
use crate::ogc::Operation;
use crate::spatial::features::is_json;

/// Number of entities in a response, or `None` when `op` returns none.
pub fn count_entities(op: Operation, body: &[u8], content_type: Option<&str>) -> Result<Option<u64>, AnalysisError> {
    if !op.returns_entities() {
        return Ok(None);
    }
    if is_json(body, content_type) {
        return count_json(body).map(Some);
    }
    let count = match op {
        Operation::GetRecords => count_records(body)?,
        Operation::GetRecordById => count_children(body, 1)?,
        _ => count_members(body)?,
    };
    Ok(Some(count))
}

fn xml_err(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Xml(e.to_string())
}

fn count_json(body: &[u8]) -> Result<u64, AnalysisError> {
    let doc: Value = serde_json::from_slice(body).map_err(|e| AnalysisError::Json(e.to_string()))?;
    if let Some(features) = doc.get("features").and_then(Value::as_array) {
        return Ok(features.len() as u64);
    }
    doc.get("numberReturned")
        .and_then(Value::as_u64)
        .ok_or_else(|| AnalysisError::Json("no features array".into()))
}

fn numeric_attribute(e: &BytesStart<'_>, names: &[&[u8]]) -> Option<u64> {
    e.attributes()
        .flatten()
        .find(|a| names.contains(&a.key.local_name().as_ref()))
        .and_then(|a| a.unescape_value().ok()?.trim().parse().ok())
}

/// WFS collections: the count attribute on the root, else the members.
fn count_members(body: &[u8]) -> Result<u64, AnalysisError> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut in_member_list = false;
    let mut count = 0u64;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    if let Some(n) = numeric_attribute(&e, &[b"numberReturned", b"numberOfFeatures"]) {
                        return Ok(n);
                    }
                }
                count += member_step(&e, depth, &mut in_member_list);
            }
            Event::Empty(e) => count += member_step(&e, depth + 1, &mut in_member_list.clone()),
            Event::End(_) => {
                if depth == 2 {
                    in_member_list = false;
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

fn member_step(e: &BytesStart<'_>, depth: usize, in_member_list: &mut bool) -> u64 {
    let local = e.local_name();
    match depth {
        2 if local.as_ref() == b"featureMembers" => {
            *in_member_list = true;
            0
        }
        2 if matches!(local.as_ref(), b"member" | b"featureMember") => 1,
        3 if *in_member_list => 1,
        _ => 0,
    }
}

/// CSW GetRecords: `SearchResults@numberOfRecordsReturned`, else its children.
fn count_records(body: &[u8]) -> Result<u64, AnalysisError> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut results_depth: Option<usize> = None;
    let mut count = 0u64;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(e) => {
                depth += 1;
                if results_depth.map(|d| depth == d + 1).unwrap_or(false) {
                    count += 1;
                } else if e.local_name().as_ref() == b"SearchResults" {
                    if let Some(n) = numeric_attribute(&e, &[b"numberOfRecordsReturned"]) {
                        return Ok(n);
                    }
                    results_depth = Some(depth);
                }
            }
            Event::Empty(e) => {
                if results_depth.map(|d| depth == d).unwrap_or(false) {
                    count += 1;
                } else if e.local_name().as_ref() == b"SearchResults" {
                    return Ok(numeric_attribute(&e, &[b"numberOfRecordsReturned"]).unwrap_or(0));
                }
            }
            Event::End(_) => {
                if results_depth == Some(depth) {
                    results_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

/// Element children of the element at `parent_depth`.
fn count_children(body: &[u8], parent_depth: usize) -> Result<u64, AnalysisError> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut count = 0u64;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(_) => {
                depth += 1;
                if depth == parent_depth + 1 {
                    count += 1;
                }
            }
            Event::Empty(_) if depth == parent_depth => count += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}
