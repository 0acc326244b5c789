//! Integration tests: transport.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use tm1_rest::{mock::MockTransport, Method, RestError, RestResult, SessionRegistry, Transport};

#[test]
fn scripted_rules_match_in_order() -> RestResult<()> {
    let transport = MockTransport::new();
    transport
        .on_once(Method::Post, "/ExecuteMDX", json!({"ID": "first"}))
        .on(Method::Post, "/ExecuteMDX", json!({"ID": "again"}));
    let first: serde_json::Value = transport.post("/api/v1/ExecuteMDX", None)?.json()?;
    let second: serde_json::Value = transport.post("/api/v1/ExecuteMDX", None)?.json()?;
    let third: serde_json::Value = transport.post("/api/v1/ExecuteMDX", None)?.json()?;
    assert_eq!(first["ID"], "first");
    assert_eq!(second["ID"], "again");
    assert_eq!(third["ID"], "again");
    assert_eq!(transport.calls().len(), 3);
    Ok(())
}

#[test]
fn body_rules_select_on_request_content() -> RestResult<()> {
    let transport = MockTransport::new();
    transport
        .on_body(
            Method::Post,
            "/Run",
            "'A','C'",
            json!({"Status": "Aborted"}),
        )
        .on(Method::Post, "/Run", json!({"Status": "Done"}));
    let status = |prolog: &str| -> RestResult<serde_json::Value> {
        let body = json!({"Process": {"PrologProcedure": prolog}});
        let reply = transport.post("/api/v1/Run", Some(&body))?;
        Ok(reply.json::<serde_json::Value>()?["Status"].clone())
    };
    assert_eq!(status("CellPutN(1,'c','A','B');")?, "Done");
    assert_eq!(status("CellPutN(2,'c','A','C');")?, "Aborted");
    let reply = transport.post("/api/v1/Run", None)?;
    assert_eq!(reply.json::<serde_json::Value>()?["Status"], "Done");
    Ok(())
}

#[test]
fn failures_carry_status() {
    let transport = MockTransport::new();
    transport.fail(Method::Delete, "Cellsets('x')", 404);
    let err = transport.delete("/api/v1/Cellsets('x')").unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(err.is_not_found());
    let err = transport.get("/api/v1/Cubes").unwrap_err();
    assert!(matches!(err, RestError::Unscripted { method: Method::Get, .. }));
    assert_eq!(err.status_code(), None);
}

#[test]
fn exists_maps_not_found() -> RestResult<()> {
    let transport = MockTransport::new();
    transport
        .on(Method::Get, "Sandboxes('here')", json!({"Name": "here"}))
        .fail(Method::Get, "Sandboxes('gone')", 404)
        .fail(Method::Get, "Sandboxes('broken')", 500);
    assert!(transport.exists("/api/v1/Sandboxes('here')")?);
    assert!(!transport.exists("/api/v1/Sandboxes('gone')")?);
    assert!(transport.exists("/api/v1/Sandboxes('broken')").is_err());
    Ok(())
}

#[test]
fn registry_connects_once_per_workspace() {
    let registry: SessionRegistry<String> = SessionRegistry::new();
    let connects = AtomicUsize::new(0);
    let connect = || {
        connects.fetch_add(1, Ordering::SeqCst);
        Ok::<_, RestError>("session".to_string())
    };
    let a = registry.get_or_connect("project", connect).unwrap();
    let b = registry
        .get_or_connect("project", || Ok::<_, RestError>("other".to_string()))
        .unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(*a, *b);
    assert_eq!(registry.names(), vec!["project".to_string()]);
    assert!(registry.close("project").is_some());
    assert!(registry.close("project").is_none());
    assert!(registry.is_empty());
}

#[test]
fn registry_does_not_cache_failed_connects() {
    let registry: SessionRegistry<String> = SessionRegistry::new();
    let failed = registry.get_or_connect("p", || Err(RestError::MissingConfig("TM1_ADDRESS")));
    assert!(failed.is_err());
    assert!(registry.get("p").is_none());
    let ok = registry.get_or_connect("p", || Ok::<_, RestError>("s".to_string()));
    assert!(ok.is_ok());
    assert_eq!(registry.len(), 1);
}
