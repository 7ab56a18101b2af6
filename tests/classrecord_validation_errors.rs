mod test_support;

use serde_json::json;
use std::io::Write;
use test_support::{
    error_code, open_seeded_workspace, read_response, record_params, request_err, request_ok,
    spawn_sidecar, str_at,
};

#[test]
fn requests_before_workspace_and_malformed_requests_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert_eq!(health["workspacePath"], json!(null));

    let e = request_err(&mut stdin, &mut reader, "2", "classrecord.load", record_params("Q1"));
    assert_eq!(error_code(&e), "no_workspace");

    let e = request_err(&mut stdin, &mut reader, "3", "grades.explode", json!({}));
    assert_eq!(error_code(&e), "not_implemented");

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    let e = request_err(&mut stdin, &mut reader, "4", "workspace.select", json!({}));
    assert_eq!(error_code(&e), "bad_params");
}

#[test]
fn malformed_identity_is_a_validation_error() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "classrecord-identity");

    let mut params = record_params("Q5");
    let e = request_err(&mut stdin, &mut reader, "1", "classrecord.load", params.clone());
    assert_eq!(error_code(&e), "validation_failed");
    assert_eq!(e["details"]["field"], json!("identity"));

    params["quarter"] = json!("Q1");
    params["schoolYear"] = json!("2025-2027");
    let e = request_err(&mut stdin, &mut reader, "2", "classrecord.load", params.clone());
    assert_eq!(error_code(&e), "validation_failed");

    params.as_object_mut().expect("object").remove("subjectId");
    let e = request_err(&mut stdin, &mut reader, "3", "classrecord.load", params);
    assert_eq!(error_code(&e), "bad_params");
}

#[test]
fn invalid_saves_report_the_field_and_change_nothing() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "classrecord-invalid-save");

    let loaded = request_ok(&mut stdin, &mut reader, "1", "classrecord.load", record_params("Q1"));
    let record_id = str_at(&loaded, "/classRecord/id").to_string();
    let grade_id = str_at(&loaded, "/students/0/gradeId").to_string();
    let base = json!({
        "classRecordId": record_id,
        "weights": { "ww": 30, "pt": 50, "qa": 20 },
        "hps": { "ww": [10, 10], "pt": [10, 10], "qa": [50] },
        "students": [ { "gradeId": grade_id, "scores": { "ww": [5, 5] } } ]
    });

    let mut bad = base.clone();
    bad["weights"] = json!({ "ww": 30, "pt": 50, "qa": 30 });
    let e = request_err(&mut stdin, &mut reader, "2", "classrecord.save", bad);
    assert_eq!(error_code(&e), "validation_failed");
    assert_eq!(e["details"]["field"], json!("weights"));

    let mut bad = base.clone();
    bad["students"][0]["scores"]["ww"] = json!([11, 5]);
    let e = request_err(&mut stdin, &mut reader, "3", "classrecord.save", bad);
    assert_eq!(e["details"]["field"], json!("scores.ww[0]"));

    let mut bad = base.clone();
    bad["students"][0]["scores"]["ww"] = json!([-1, 5]);
    let e = request_err(&mut stdin, &mut reader, "4", "classrecord.save", bad);
    assert_eq!(e["details"]["field"], json!("scores.ww[0]"));

    let mut bad = base.clone();
    bad["hps"]["pt"] = json!([10, 0]);
    let e = request_err(&mut stdin, &mut reader, "5", "classrecord.save", bad);
    assert_eq!(e["details"]["field"], json!("hps.pt[1]"));

    let mut bad = base.clone();
    bad["hps"]["ww"] = json!([10]);
    let e = request_err(&mut stdin, &mut reader, "6", "classrecord.save", bad);
    assert_eq!(e["details"]["field"], json!("hps.ww"));

    let mut bad = base.clone();
    bad["classRecordId"] = json!("no-such-record");
    let e = request_err(&mut stdin, &mut reader, "7", "classrecord.save", bad);
    assert_eq!(error_code(&e), "not_found");

    let mut bad = base.clone();
    bad["students"][0]["scores"]["ww"] = json!(["five"]);
    let e = request_err(&mut stdin, &mut reader, "8", "classrecord.save", bad);
    assert_eq!(error_code(&e), "bad_params");

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "classrecord.history",
        json!({ "classRecordId": record_id }),
    );
    assert_eq!(history["history"], json!([]));
    let again = request_ok(&mut stdin, &mut reader, "10", "classrecord.load", record_params("Q1"));
    assert_eq!(again["classRecord"]["version"], json!(0));

    let ok = request_ok(&mut stdin, &mut reader, "11", "classrecord.save", base);
    assert_eq!(ok["version"], json!(1));
}
