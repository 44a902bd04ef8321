use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn legacy_project() -> Value {
    json!({
        "objName": "Stage",
        "costumes": [{"costumeName": "backdrop1", "baseLayerMD5": "b1.png"}],
        "children": [
            {
                "objName": "Sprite1",
                "scratchX": 10,
                "scratchY": 20,
                "costumes": [{"costumeName": "costume1", "baseLayerMD5": "c1.svg"}],
                "scripts": [[0, 0, [["whenGreenFlag"], ["forward:", 10]]]]
            }
        ]
    })
}

#[test]
fn convert_writes_current_format() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let input_path = temp_dir.path().join("legacy.json");
    let output_path = temp_dir.path().join("out").join("project.json");
    fs::write(&input_path, legacy_project().to_string()).expect("write legacy project");

    let status = Command::new(locate_binary("project_tool"))
        .arg("convert")
        .arg(&input_path)
        .arg(&output_path)
        .status()
        .expect("run project_tool convert");
    assert!(status.success(), "project_tool convert did not exit successfully");

    let text = fs::read_to_string(&output_path).expect("read converted project");
    let converted: Value = serde_json::from_str(&text).expect("converted project should parse");
    assert_eq!(converted["meta"]["semver"], "3.0.0");
    let names: Vec<&str> =
        converted["targets"].as_array().expect("targets").iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(names, vec!["Stage", "Sprite1"]);
}

#[test]
fn validate_reports_dangling_block_links() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let valid_path = temp_dir.path().join("valid.json");
    let broken_path = temp_dir.path().join("broken.json");
    let valid = json!({
        "targets": [{"id": "stage", "name": "Stage", "isStage": true}],
        "meta": {"semver": "3.0.0"}
    });
    let broken = json!({
        "targets": [
            {"id": "stage", "name": "Stage", "isStage": true},
            {"id": "cat", "name": "Cat", "blocks": {
                "hat": {"id": "hat", "opcode": "event_whenflagclicked", "topLevel": true, "next": "missing"}
            }}
        ],
        "meta": {"semver": "3.0.0"}
    });
    fs::write(&valid_path, valid.to_string()).expect("write valid project");
    fs::write(&broken_path, broken.to_string()).expect("write broken project");

    let exe = locate_binary("project_tool");
    let status = Command::new(&exe).arg("validate").arg(&valid_path).status().expect("run validate");
    assert!(status.success(), "valid project should pass validation");
    let output = Command::new(&exe).arg("validate").arg(&broken_path).output().expect("run validate");
    assert!(!output.status.success(), "dangling link should fail validation");
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing block 'missing'"));
}

fn locate_binary(name: &str) -> PathBuf {
    if let Ok(path) = std::env::var(format!("CARGO_BIN_EXE_{name}")) {
        return PathBuf::from(path);
    }
    let mut path = std::env::current_exe().expect("current exe");
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(name);
    if cfg!(windows) {
        path.set_extension("exe");
    }
    assert!(path.exists(), "expected binary '{}' at {}, but it does not exist", name, path.display());
    path
}
