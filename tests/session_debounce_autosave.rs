mod test_support;

use serde_json::json;
use std::thread::sleep;
use std::time::Duration;
use test_support::{
    error_code, open_seeded_workspace, record_params, request_err, request_ok,
    spawn_sidecar_with_args, str_at,
};

fn open_params(quarter: &str) -> serde_json::Value {
    let mut params = record_params(quarter);
    params["actorId"] = json!("teacher-1");
    params
}

#[test]
fn rapid_edits_are_saved_once_after_quiescence() {
    let (_child, mut stdin, mut reader) = spawn_sidecar_with_args(&["--debounce-ms", "500"]);
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "session-debounce");

    let opened = request_ok(&mut stdin, &mut reader, "1", "session.open", open_params("Q1"));
    let session_id = str_at(&opened, "/sessionId").to_string();
    let record_id = str_at(&opened, "/classRecord/id").to_string();
    assert_eq!(opened["created"], json!(true));
    assert_eq!(opened["sync"]["state"], json!("clean"));

    for i in 0..10 {
        let edited = request_ok(
            &mut stdin,
            &mut reader,
            &format!("edit-{i}"),
            "session.editScore",
            json!({
                "sessionId": session_id,
                "studentId": "s1",
                "category": "ww",
                "itemIndex": i,
                "value": 9
            }),
        );
        assert_eq!(edited["sync"]["state"], json!("dirty"));
        assert_eq!(edited["student"]["id"], json!("s1"));
    }
    let state = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.state",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(state["sync"]["savesStarted"], json!(0));

    sleep(Duration::from_millis(2000));

    let state = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.state",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(state["sync"]["state"], json!("clean"));
    assert_eq!(state["sync"]["savesSucceeded"], json!(1));
    assert_eq!(state["sync"]["version"], json!(1));

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classrecord.history",
        json!({ "classRecordId": record_id }),
    );
    let entries = history["history"].as_array().expect("history");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["actorId"], json!("teacher-1"));

    let reloaded = request_ok(&mut stdin, &mut reader, "5", "classrecord.load", record_params("Q1"));
    let santos = &reloaded["students"][1];
    assert_eq!(santos["id"], json!("s1"));
    assert_eq!(santos["computed"]["ww"]["percentage"].as_f64(), Some(90.0));
}

#[test]
fn explicit_save_and_unsaved_changes_guard() {
    let (_child, mut stdin, mut reader) = spawn_sidecar_with_args(&["--debounce-ms", "60000"]);
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "session-guard");

    let opened = request_ok(&mut stdin, &mut reader, "1", "session.open", open_params("Q2"));
    let session_id = str_at(&opened, "/sessionId").to_string();

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "session.editScore",
        json!({ "sessionId": session_id, "studentId": "s2", "category": "qa", "itemIndex": 0, "value": 51 }),
    );
    assert_eq!(error_code(&e), "validation_failed");
    assert_eq!(e["details"]["field"], json!("scores.qa[0]"));

    let weights = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.setWeights",
        json!({ "sessionId": session_id, "ww": 25, "pt": 45, "qa": 30 }),
    );
    assert_eq!(weights["weights"], json!({ "ww": 25, "pt": 45, "qa": 30 }));
    assert_eq!(weights["sync"]["state"], json!("dirty"));
    assert_eq!(weights["sync"]["autosavePending"], json!(true));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "session.setWeights",
        json!({ "sessionId": session_id, "ww": 25, "pt": 45, "qa": 31 }),
    );
    assert_eq!(e["details"]["field"], json!("weights"));

    let hps = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "session.setHps",
        json!({ "sessionId": session_id, "category": "qa", "values": [40] }),
    );
    assert_eq!(hps["hps"]["qa"], json!([40]));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "session.close",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(error_code(&e), "unsaved_changes");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "session.save",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(saved["success"], json!(true));
    assert_eq!(saved["coalesced"], json!(false));
    assert_eq!(saved["version"], json!(1));
    assert_eq!(saved["sync"]["state"], json!("clean"));
    assert_eq!(saved["sync"]["autosavePending"], json!(false));

    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "session.close",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(closed["closed"], json!(true));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "session.state",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(error_code(&e), "not_found");

    let reloaded = request_ok(&mut stdin, &mut reader, "10", "classrecord.load", record_params("Q2"));
    assert_eq!(reloaded["classRecord"]["weights"], json!({ "ww": 25, "pt": 45, "qa": 30 }));
    assert_eq!(reloaded["classRecord"]["hps"]["qa"], json!([40]));
}

#[test]
fn forced_close_discards_pending_edits() {
    let (_child, mut stdin, mut reader) = spawn_sidecar_with_args(&["--debounce-ms", "60000"]);
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "session-force-close");

    let opened = request_ok(&mut stdin, &mut reader, "1", "session.open", open_params("Q3"));
    let session_id = str_at(&opened, "/sessionId").to_string();
    let record_id = str_at(&opened, "/classRecord/id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.editScore",
        json!({ "sessionId": session_id, "studentId": "s1", "category": "pt", "itemIndex": 0, "value": 7.5 }),
    );
    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.close",
        json!({ "sessionId": session_id, "force": true }),
    );
    assert_eq!(closed["sync"]["dirty"], json!(true));

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classrecord.history",
        json!({ "classRecordId": record_id }),
    );
    assert_eq!(history["history"], json!([]));
}
