//! XML-encoded (POST) request bodies.
//!
//! Reads only what the normalizer needs: the root element (operation) and its
//! `service`/`version`/`outputFormat` attributes, type names referenced by
//! queries and transaction actions, `srsName` on `Query`, and WMS named layers.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::kvp::split_list;
use super::request::RequestError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlRequest {
    pub operation: String,
    pub service: Option<String>,
    pub version: Option<String>,
    pub output_format: Option<String>,
    pub type_names: Vec<String>,
    pub srs_name: Option<String>,
    pub named_layers: Vec<String>,
}

pub fn parse(body: &[u8]) -> Result<XmlRequest, RequestError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut request: Option<XmlRequest> = None;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut capture_name = false;
    let mut capture_type_name = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| RequestError::MalformedXml(e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name().as_ref().to_vec();
                match request.as_mut() {
                    None => request = Some(root(e)?),
                    Some(req) => {
                        read_element(req, &local, e)?;
                        let parent = stack.last().map(Vec::as_slice);
                        capture_name = !is_empty && local == b"Name" && parent == Some(b"NamedLayer".as_slice());
                        capture_type_name = !is_empty && local == b"TypeName";
                    }
                }
                if !is_empty {
                    stack.push(local);
                }
            }
            Event::Text(ref t) if capture_name || capture_type_name => {
                let text = t
                    .unescape()
                    .map_err(|e| RequestError::MalformedXml(e.to_string()))?;
                if let Some(req) = request.as_mut() {
                    if capture_name {
                        req.named_layers.push(text.trim().to_string());
                    } else {
                        req.type_names.extend(split_names(&text));
                    }
                }
            }
            Event::End(_) => {
                capture_name = false;
                capture_type_name = false;
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    request.ok_or_else(|| RequestError::MalformedXml("document has no root element".into()))
}

fn root(e: &BytesStart<'_>) -> Result<XmlRequest, RequestError> {
    let mut req = XmlRequest {
        operation: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| RequestError::MalformedXml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| RequestError::MalformedXml(e.to_string()))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"service" => req.service = Some(value),
            b"version" => req.version = Some(value),
            b"outputFormat" => req.output_format = Some(value),
            _ => {}
        }
    }
    Ok(req)
}

fn read_element(req: &mut XmlRequest, local: &[u8], e: &BytesStart<'_>) -> Result<(), RequestError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| RequestError::MalformedXml(e.to_string()))?;
        let key = attr.key.local_name();
        let key = key.as_ref();
        if key != b"typeNames" && key != b"typeName" && !(key == b"srsName" && local == b"Query") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| RequestError::MalformedXml(e.to_string()))?;
        if key == b"srsName" {
            req.srs_name.get_or_insert_with(|| value.trim().to_string());
        } else if local != b"Query" || !req.operation.eq_ignore_ascii_case("GetRecords") {
            req.type_names.extend(split_names(&value));
        }
    }
    Ok(())
}

/// Type names may be comma or whitespace separated.
fn split_names(value: &str) -> Vec<String> {
    value.split_whitespace().flat_map(split_list).collect()
}
