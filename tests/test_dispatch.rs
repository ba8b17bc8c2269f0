mod common;

use common::{NOW, RecordingSink, dispatcher, record};
use eventgate::dispatch::{DispatchSettings, decode_records, derive_tag, split_body};
use eventgate::http::request::RequestBuilder;
use eventgate::http::response::StatusCode;
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr};

fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[test]
fn test_tag_derivation() {
    assert_eq!(derive_tag("/tag1", None), "tag1");
    assert_eq!(derive_tag("/a/b", None), "a.b");
    assert_eq!(derive_tag("/a/b/c", Some("unused")), "a.b.c");
    assert_eq!(derive_tag("/", Some("default.tag")), "default.tag");
    assert_eq!(derive_tag("", Some("default.tag")), "default.tag");
}

#[test]
fn test_emits_every_record_in_order() {
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);
    let req = RequestBuilder::new()
        .path("/tag1")
        .param("json", r#"[{"a":1},{"a":2},{"a":3}]"#)
        .param("time", "1357860203")
        .build()
        .unwrap();

    let response = dispatcher.dispatch(&req);

    assert_eq!(response.status, StatusCode::Ok);
    assert!(response.body.is_empty());
    let events = sink.events();
    assert_eq!(events.len(), 3);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.tag, "tag1");
        assert_eq!(event.time, 1357860203);
        assert_eq!(event.record, record(json!({ "a": i + 1 })));
    }
}

#[test]
fn test_time_defaults_to_clock() {
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);
    let req = RequestBuilder::new()
        .path("/a/b")
        .param("json", r#"[{"k":"v"}]"#)
        .build()
        .unwrap();

    assert_eq!(dispatcher.dispatch(&req).status, StatusCode::Ok);
    let events = sink.events();
    assert_eq!(events[0].tag, "a.b");
    assert_eq!(events[0].time, NOW);
}

#[test]
fn test_empty_batch_is_ok() {
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);
    let req = RequestBuilder::new()
        .path("/zero")
        .param("json", "[]")
        .build()
        .unwrap();

    assert_eq!(dispatcher.dispatch(&req).status, StatusCode::Ok);
    assert_eq!(sink.len(), 0);
}

#[test]
fn test_missing_json_is_bad_request() {
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);
    let req = RequestBuilder::new()
        .path("/tag")
        .param("time", "1")
        .param("msg", "x")
        .build()
        .unwrap();

    let response = dispatcher.dispatch(&req);
    assert_eq!(response.status, StatusCode::BadRequest);
    let text = body_text(&response.body);
    assert!(text.starts_with("400 Bad Request\n"));
    assert!(text.contains("'json' parameter is required"));
    assert!(text.contains(r#"["msg", "time"]"#));
    assert_eq!(sink.len(), 0);
}

#[test]
fn test_malformed_json_is_bad_request() {
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);

    for bad in [r#"[{"a":1}"#, "42", r#"[{"a":1}, 2]"#, "not json"] {
        let req = RequestBuilder::new()
            .path("/tag")
            .param("json", bad)
            .build()
            .unwrap();
        assert_eq!(dispatcher.dispatch(&req).status, StatusCode::BadRequest, "{bad}");
    }
    assert_eq!(sink.len(), 0);
}

#[test]
fn test_invalid_time_is_bad_request() {
    let sink = RecordingSink::new();
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);
    let req = RequestBuilder::new()
        .path("/tag")
        .param("json", r#"[{"a":1}]"#)
        .param("time", "noon")
        .build()
        .unwrap();

    assert_eq!(dispatcher.dispatch(&req).status, StatusCode::BadRequest);
    assert_eq!(sink.len(), 0);
}

#[test]
fn test_single_object_is_one_record() {
    let records = decode_records(r#"{"a":1}"#).unwrap();
    assert_eq!(records, vec![record(json!({ "a": 1 }))]);
}

#[test]
fn test_blob_fallback_splits_body() {
    let sink = RecordingSink::new();
    let settings = DispatchSettings {
        blob_fallback: true,
        ..DispatchSettings::default()
    };
    let dispatcher = dispatcher(settings, &sink);
    let req = RequestBuilder::new()
        .path("/logs")
        .body(&b"first line\nsecond \xff line\n"[..])
        .build()
        .unwrap();

    assert_eq!(dispatcher.dispatch(&req).status, StatusCode::Ok);
    let messages: Vec<_> = sink
        .events()
        .into_iter()
        .map(|e| e.record["message"].clone())
        .collect();
    assert_eq!(messages, vec![json!("first line"), json!("second ? line")]);
}

#[test]
fn test_json_takes_precedence_over_fallback() {
    let sink = RecordingSink::new();
    let settings = DispatchSettings {
        blob_fallback: true,
        ..DispatchSettings::default()
    };
    let dispatcher = dispatcher(settings, &sink);
    let req = RequestBuilder::new()
        .path("/logs")
        .param("json", r#"[{"a":1}]"#)
        .body(&b"ignored\nbody"[..])
        .build()
        .unwrap();

    assert_eq!(dispatcher.dispatch(&req).status, StatusCode::Ok);
    assert_eq!(sink.events()[0].record, record(json!({ "a": 1 })));
}

#[test]
fn test_split_body_custom_delimiter() {
    assert_eq!(split_body(b"a|b||c|", "|"), vec!["a", "b", "", "c"]);
    assert!(split_body(b"", "\n").is_empty());
}

#[test]
fn test_remote_host_enrichment() {
    let sink = RecordingSink::new();
    let settings = DispatchSettings {
        record_remote_host: true,
        remote_address_key: "ip".to_string(),
        remote_address_dns_key: "hostname".to_string(),
        ..DispatchSettings::default()
    };
    let dispatcher = dispatcher(settings, &sink);
    let req = RequestBuilder::new()
        .path("/tag")
        .param("json", r#"[{"a":1}]"#)
        .remote_addr(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
        .remote_host("client.example")
        .build()
        .unwrap();

    assert_eq!(dispatcher.dispatch(&req).status, StatusCode::Ok);
    assert_eq!(
        sink.events()[0].record,
        record(json!({ "a": 1, "ip": "192.168.1.20", "hostname": "client.example" }))
    );
}

#[test]
fn test_emission_failure_aborts_batch() {
    let sink = RecordingSink::failing_after(1);
    let dispatcher = dispatcher(DispatchSettings::default(), &sink);
    let req = RequestBuilder::new()
        .path("/tag")
        .param("json", r#"[{"a":1},{"a":2},{"a":3}]"#)
        .build()
        .unwrap();

    let response = dispatcher.dispatch(&req);
    assert_eq!(response.status, StatusCode::InternalServerError);
    assert!(body_text(&response.body).contains("buffer full"));
    assert_eq!(sink.len(), 1);
}
