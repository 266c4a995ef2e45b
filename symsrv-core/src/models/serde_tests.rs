//! Serialization tests for models that cross process boundaries (CLI JSON
//! output, settings).

use super::*;

#[test]
fn test_server_state_snake_case() {
    assert_eq!(serde_json::to_string(&ServerState::Ready).unwrap(), "\"ready\"");
    assert_eq!(
        serde_json::to_string(&ServerState::Initializing).unwrap(),
        "\"initializing\""
    );
    let state: ServerState = serde_json::from_str("\"auth\"").unwrap();
    assert_eq!(state, ServerState::Auth);
}

#[test]
fn test_file_type_serde() {
    assert_eq!(
        serde_json::to_string(&FileType::DebugInfo).unwrap(),
        "\"debug_info\""
    );
    let ft: FileType = serde_json::from_str("\"binary\"").unwrap();
    assert_eq!(ft, FileType::Binary);
}

#[test]
fn test_build_id_deserialize_validates() {
    let id: BuildId = serde_json::from_str("\"ABCDEF12\"").unwrap();
    assert_eq!(id.as_str(), "abcdef12");

    let bad: Result<BuildId, _> = serde_json::from_str("\"xy\"");
    assert!(bad.is_err());
}

#[test]
fn test_fetch_request_json() {
    let req = FetchRequest::binary("deadbeef01");
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["build_id"], "deadbeef01");
    assert_eq!(json["file_type"], "binary");
}

#[test]
fn test_status_json_shape() {
    let mut log = ErrorLog::new();
    log.push("Network error: connection refused");

    let status = ServerStatus {
        name: "my-bucket".to_string(),
        state: ServerState::Auth,
        ready_count: 2,
        retry_count: 1,
        errors: log.entries().to_vec(),
        next_refresh: None,
    };

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "auth");
    assert_eq!(json["ready_count"], 2);
    assert_eq!(json["errors"][0]["message"], "Network error: connection refused");
    assert!(!status.is_healthy());
}
