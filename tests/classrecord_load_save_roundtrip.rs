mod test_support;

use serde_json::json;
use test_support::{f64s, open_seeded_workspace, record_params, request_ok, spawn_sidecar, str_at};

#[test]
fn first_load_creates_record_with_defaults_and_active_roster() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "classrecord-load-defaults");

    let first = request_ok(&mut stdin, &mut reader, "1", "classrecord.load", record_params("Q1"));
    assert_eq!(first["created"], json!(true));
    assert_eq!(first["classRecord"]["weights"], json!({ "ww": 30, "pt": 50, "qa": 20 }));
    assert_eq!(first["classRecord"]["quarter"], json!("Q1"));
    assert_eq!(first["classRecord"]["version"], json!(0));
    assert_eq!(
        first["classRecord"]["hps"]["ww"].as_array().map(|a| a.len()),
        Some(10)
    );
    assert_eq!(first["classRecord"]["hps"]["qa"], json!([50]));

    let students = first["students"].as_array().expect("students");
    let names: Vec<&str> = students
        .iter()
        .map(|s| s["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["Reyes, Ben", "Santos, Ana Cruz"]);
    for s in students {
        assert_eq!(s["computed"]["initialGrade"].as_f64(), Some(0.0));
        assert_eq!(s["computed"]["quarterlyGrade"], json!(60));
        assert_eq!(s["standing"], json!("noScores"));
        assert_eq!(s["isPassing"], json!(false));
    }

    let again = request_ok(&mut stdin, &mut reader, "2", "classrecord.load", record_params("Q1"));
    assert_eq!(again["created"], json!(false));
    assert_eq!(
        str_at(&again, "/classRecord/id"),
        str_at(&first, "/classRecord/id")
    );

    let other_quarter = request_ok(&mut stdin, &mut reader, "3", "classrecord.load", record_params("Q2"));
    assert_eq!(other_quarter["created"], json!(true));
    assert_ne!(
        str_at(&other_quarter, "/classRecord/id"),
        str_at(&first, "/classRecord/id")
    );
}

#[test]
fn save_then_load_round_trips_and_every_save_is_logged() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "classrecord-roundtrip");

    let loaded = request_ok(&mut stdin, &mut reader, "1", "classrecord.load", record_params("Q1"));
    let record_id = str_at(&loaded, "/classRecord/id").to_string();
    let reyes = str_at(&loaded, "/students/0/gradeId").to_string();
    let santos = str_at(&loaded, "/students/1/gradeId").to_string();

    let save = json!({
        "classRecordId": record_id,
        "actorId": "teacher-1",
        "weights": { "ww": 30, "pt": 50, "qa": 20 },
        "hps": { "ww": [10, 10, 10], "pt": [20, 20], "qa": [50] },
        "students": [
            { "gradeId": reyes, "scores": { "ww": [8, 9, 10], "pt": [], "qa": [null] } },
            { "gradeId": santos, "scores": { "ww": [10, 10, 10], "pt": [20, 20], "qa": [40.5] } }
        ]
    });
    let first = request_ok(&mut stdin, &mut reader, "2", "classrecord.save", save.clone());
    assert_eq!(first["success"], json!(true));
    assert_eq!(first["version"], json!(1));
    let second = request_ok(&mut stdin, &mut reader, "3", "classrecord.save", save);
    assert_eq!(second["version"], json!(2));
    assert_eq!(first["contentHash"], second["contentHash"]);

    let back = request_ok(&mut stdin, &mut reader, "4", "classrecord.load", record_params("Q1"));
    assert_eq!(back["created"], json!(false));
    assert_eq!(back["classRecord"]["version"], json!(2));
    assert_eq!(back["classRecord"]["hps"], json!({ "ww": [10, 10, 10], "pt": [20, 20], "qa": [50] }));

    let r = &back["students"][0];
    assert_eq!(f64s(&r["scores"]["ww"]), vec![8.0, 9.0, 10.0]);
    assert_eq!(f64s(&r["scores"]["pt"]), vec![0.0, 0.0]);
    assert_eq!(f64s(&r["scores"]["qa"]), vec![0.0]);
    assert_eq!(r["computed"]["ww"]["percentage"].as_f64(), Some(90.0));
    assert_eq!(r["computed"]["ww"]["weightedScore"].as_f64(), Some(27.0));
    assert_eq!(r["computed"]["initialGrade"].as_f64(), Some(27.0));
    assert_eq!(r["standing"], json!("atRisk"));
    assert_eq!(r["requiredPerformance"]["targetGrade"], json!(75));
    assert_eq!(r["requiredPerformance"]["targetInitialGrade"].as_f64(), Some(60.0));
    assert_eq!(r["requiredPerformance"]["pointsNeeded"].as_f64(), Some(33.0));
    assert_eq!(r["requiredPerformance"]["qaCompleted"], json!(false));

    let s = &back["students"][1];
    assert_eq!(f64s(&s["scores"]["qa"]), vec![40.5]);
    assert_eq!(s["computed"]["initialGrade"].as_f64(), Some(96.2));
    assert_eq!(s["standing"], json!("onTrack"));
    assert_eq!(s["requiredPerformance"], json!(null));
    assert_eq!(s["isPassing"], json!(true));

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classrecord.history",
        json!({ "classRecordId": record_id }),
    );
    let entries = history["history"].as_array().expect("history");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], second["historyId"]);
    assert_eq!(entries[1]["id"], first["historyId"]);
    for e in entries {
        assert_eq!(e["action"], json!("updated"));
        assert_eq!(e["message"], json!("Updated class record"));
        assert_eq!(e["actorId"], json!("teacher-1"));
        assert_eq!(e["date"].as_str().map(|d| d.len()), Some(10));
        assert_eq!(e["time"].as_str().map(|t| t.len()), Some(8));
    }

    let by_actor = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classrecord.history",
        json!({ "actorId": "teacher-1", "limit": 1 }),
    );
    assert_eq!(by_actor["history"].as_array().map(|a| a.len()), Some(1));
}
