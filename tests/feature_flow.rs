mod common;

use common::{start_mock_origin, start_proxy, test_config, wait_for_audit, MockReply};
use ogc_secure_proxy::audit::Outcome;
use ogc_secure_proxy::config::AuditSinkConfig;

fn catalogue(origin: &str) -> String {
    format!(
        r#"
        [[services]]
        id = "wfs1"
        kind = "WFS"
        layers = [{{ name = "Parcels" }}]
        operation_urls = [{{ url = "{origin}" }}]

        [[rules]]
        id = 20
        service = "wfs1"
        layers = ["Parcels"]
        operations = ["GetFeature"]
        allowed_area = "POLYGON((0 0,10 0,10 10,0 10,0 0))"
        "#
    )
}

const GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "totalFeatures": 2,
  "features": [
    { "type": "Feature", "id": "Parcels.1", "geometry": { "type": "Point", "coordinates": [5, 5] } },
    { "type": "Feature", "id": "Parcels.2", "geometry": { "type": "Point", "coordinates": [50, 50] } }
  ]
}"#;

const GML: &str = r#"<?xml version="1.0"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0" xmlns:gml="http://www.opengis.net/gml/3.2" numberMatched="2" numberReturned="2">
  <wfs:member><ns:Parcels gml:id="Parcels.1"><ns:geom><gml:Point><gml:pos>5 5</gml:pos></gml:Point></ns:geom></ns:Parcels></wfs:member>
  <wfs:member><ns:Parcels gml:id="Parcels.2"><ns:geom><gml:Point><gml:pos>50 50</gml:pos></gml:Point></ns:geom></ns:Parcels></wfs:member>
</wfs:FeatureCollection>"#;

fn get_feature(extra: &str) -> String {
    format!("SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&TYPENAMES=Parcels{extra}")
}

#[tokio::test]
async fn test_geojson_features_outside_area_are_removed() {
    let origin = start_mock_origin(|_| MockReply::ok("application/json", GEOJSON)).await;
    let proxy = start_proxy(&catalogue(&origin.url()), test_config(AuditSinkConfig::Tracing)).await;

    let res = proxy
        .get("wfs1", &get_feature("&OUTPUTFORMAT=application/json&BBOX=0,0,60,60"))
        .await;
    assert_eq!(res.status(), 200);
    let json: serde_json::Value = res.json().await.unwrap();
    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["id"], "Parcels.1");
    assert_eq!(json["totalFeatures"], 1);

    wait_for_audit(&proxy.audit, 1).await;
    let entry = proxy.audit.drain(10).remove(0);
    assert_eq!(entry.outcome, Outcome::Masked);
    assert_eq!(entry.entity_count, Some(1));
    assert_eq!(entry.matched_rule_ids, vec![20]);
}

#[tokio::test]
async fn test_gml_members_outside_area_are_removed() {
    let origin = start_mock_origin(|_| MockReply::ok("application/gml+xml; version=3.2", GML)).await;
    let proxy = start_proxy(&catalogue(&origin.url()), test_config(AuditSinkConfig::Tracing)).await;

    // no spatial filter at all: every returned feature is checked
    let res = proxy.get("wfs1", &get_feature("")).await;
    assert_eq!(res.status(), 200);
    let text = res.text().await.unwrap();
    assert!(text.contains(r#"gml:id="Parcels.1""#), "{text}");
    assert!(!text.contains(r#"gml:id="Parcels.2""#), "{text}");
    assert!(text.contains(r#"numberReturned="1""#), "{text}");
}

#[tokio::test]
async fn test_negated_filter_box_does_not_skip_masking() {
    let origin = start_mock_origin(|_| MockReply::ok("application/json", GEOJSON)).await;
    let proxy = start_proxy(&catalogue(&origin.url()), test_config(AuditSinkConfig::Tracing)).await;

    let filter = r#"<fes:Filter xmlns:fes="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2"><fes:Not><fes:BBOX><gml:Envelope srsName="EPSG:4326"><gml:lowerCorner>1 1</gml:lowerCorner><gml:upperCorner>2 2</gml:upperCorner></gml:Envelope></fes:BBOX></fes:Not></fes:Filter>"#;
    let encoded: String = url::form_urlencoded::byte_serialize(filter.as_bytes()).collect();
    let res = proxy
        .get("wfs1", &get_feature(&format!("&OUTPUTFORMAT=application/json&FILTER={encoded}")))
        .await;
    assert_eq!(res.status(), 200);
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["features"].as_array().unwrap().len(), 1);

    wait_for_audit(&proxy.audit, 1).await;
    assert_eq!(proxy.audit.drain(10)[0].outcome, Outcome::Masked);
}

#[tokio::test]
async fn test_disjoint_bbox_returns_empty_collection() {
    let origin = start_mock_origin(|_| MockReply::ok("application/json", GEOJSON)).await;
    let proxy = start_proxy(&catalogue(&origin.url()), test_config(AuditSinkConfig::Tracing)).await;

    let res = proxy
        .get("wfs1", &get_feature("&OUTPUTFORMAT=application/json&BBOX=20,20,30,30"))
        .await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["type"], "FeatureCollection");
    assert_eq!(json["features"].as_array().map(Vec::len), Some(0));
    assert_eq!(origin.hits(), 0);

    wait_for_audit(&proxy.audit, 1).await;
    let entry = proxy.audit.drain(10).remove(0);
    assert_eq!(entry.outcome, Outcome::Empty);
    assert_eq!(entry.entity_count, Some(0));

    let res = proxy.get("wfs1", &get_feature("&BBOX=20,20,30,30")).await;
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().contains(r#"numberReturned="0""#));
}
