//! Integration tests for the clipforge CLI.
//!
//! The `run` tests talk to a local axum server that stands in for the
//! generation backend.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

/// Helper to create a clipforge Command
fn clipforge() -> Command {
    let mut cmd = cargo_bin_cmd!("clipforge");
    cmd.env_remove("CLIPFORGE_BACKEND_URL")
        .env_remove("CLIPFORGE_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn script_reply() -> String {
    let script = json!({
        "title": "Auroras",
        "scenes": [
            {"sceneId": "scene-1", "narration": "Lights over the lake.", "visual": "green aurora over a frozen lake", "durationSeconds": 9.0},
            {"sceneId": "scene-2", "narration": "The village wakes.", "visual": "a village under the aurora", "durationSeconds": 9.0}
        ]
    });
    format!("```json\n{script}\n```")
}

fn features() -> Value {
    json!({
        "colorHistogram": [0.2, 0.3, 0.5],
        "styleVector": [0.1, 0.9, 0.4],
        "composition": [0.5, 0.5],
        "texture": [0.1, 0.4, 0.2, 0.8],
        "lighting": [1.0, 2.0, 1.0],
        "contrast": 0.6,
        "edges": [0.3, 0.3, 0.4]
    })
}

/// Start a backend on its own runtime thread and return its base URL.
fn spawn_backend(fail_generation: bool) -> String {
    let app = Router::new()
        .route(
            "/hotspots",
            post(|| async { Json(json!({"hotspots": [{"title": "Auroras", "heat": 90.0}]})) }),
        )
        .route(
            "/complete",
            post(|| async {
                Json(json!({
                    "text": script_reply(),
                    "model": "stub-llm",
                    "usage": {"promptTokens": 40, "completionTokens": 60, "totalTokens": 100}
                }))
            }),
        )
        .route(
            "/generate",
            post(move |Json(shot): Json<Value>| async move {
                if fail_generation {
                    return (StatusCode::BAD_GATEWAY, Json(json!({"error": "gpu lost"})));
                }
                let id = shot["shotId"].as_str().unwrap_or("unknown").to_string();
                (
                    StatusCode::OK,
                    Json(json!({"url": format!("https://img.test/{id}.png")})),
                )
            }),
        )
        .route("/features", post(|| async { Json(features()) }))
        .route(
            "/compose",
            post(|Json(body): Json<Value>| async move {
                let name = body["outputFilename"].as_str().unwrap_or("out.mp4").to_string();
                Json(json!({"videoPath": format!("renders/{name}")}))
            }),
        );

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    format!("http://{}", rx.recv().unwrap())
}

/// Write a config with fast retries so failing runs finish quickly.
fn write_fast_config(dir: &TempDir) {
    fs::create_dir_all(dir.path().join(".clipforge")).unwrap();
    fs::write(
        dir.path().join(".clipforge/clipforge.toml"),
        "[retry]\nbackoff_unit_ms = 1\n\n[backend]\nrequest_timeout_secs = 10\n",
    )
    .unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_clipforge_help() {
        clipforge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("sessions"));
    }

    #[test]
    fn test_clipforge_version() {
        clipforge().arg("--version").assert().success();
    }

    #[test]
    fn test_run_help_lists_pipeline_flags() {
        clipforge()
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--keywords"))
            .stdout(predicate::str::contains("--no-retry-failed"));
    }

    #[test]
    fn test_unknown_command_fails() {
        clipforge().arg("render").assert().failure();
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_command {
    use super::*;

    #[test]
    fn test_config_show_without_file_uses_defaults() {
        let dir = create_temp_project();
        clipforge()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No clipforge.toml found"))
            .stdout(predicate::str::contains("threshold = 0.8"));
    }

    #[test]
    fn test_config_init_creates_file_once() {
        let dir = create_temp_project();
        clipforge()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created clipforge.toml"));
        assert!(dir.path().join(".clipforge/clipforge.toml").exists());

        clipforge()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".clipforge")).unwrap();
        fs::write(
            dir.path().join(".clipforge/clipforge.toml"),
            "[consistency]\nthreshold = 2.0\n",
        )
        .unwrap();

        clipforge()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("consistency.threshold"));
    }

    #[test]
    fn test_config_validate_rejects_malformed_toml() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".clipforge")).unwrap();
        fs::write(dir.path().join(".clipforge/clipforge.toml"), "[pipeline\n").unwrap();

        clipforge()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse clipforge.toml"));
    }
}

// =============================================================================
// Sessions Command Tests
// =============================================================================

mod sessions_command {
    use super::*;

    #[test]
    fn test_sessions_empty_project() {
        let dir = create_temp_project();
        clipforge()
            .current_dir(dir.path())
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("No tracked sessions."));
    }

    #[test]
    fn test_unknown_session_fails() {
        let dir = create_temp_project();
        clipforge()
            .current_dir(dir.path())
            .args(["sessions", "20240101_000000_deadbeef"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }
}

// =============================================================================
// End-to-end Run Tests
// =============================================================================

mod run_command {
    use super::*;

    #[test]
    fn test_run_produces_video_and_tracks_session() {
        let dir = create_temp_project();
        write_fast_config(&dir);
        let url = spawn_backend(false);

        let output = clipforge()
            .current_dir(dir.path())
            .env("CLIPFORGE_BACKEND_URL", &url)
            .args(["run", "--keywords", "aurora,night sky", "--output", "clip.mp4"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let result: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["finalVideoPath"], "renders/clip.mp4");
        assert!(result["stages"]["storyboard"]["storyboard"].is_array());

        assert!(dir.path().join(".clipforge/tracking/sessions.json").exists());
        assert!(dir.path().join(".clipforge/logs").is_dir());

        let summary = clipforge()
            .current_dir(dir.path())
            .args(["sessions", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let summary: Value = serde_json::from_slice(&summary).unwrap();
        assert_eq!(summary["totalSessions"], 1);
        assert_eq!(summary["completed"], 1);
        assert_eq!(summary["totalTokens"]["totalTokens"], 100);

        let session_id = result["sessionId"].as_str().unwrap();
        clipforge()
            .current_dir(dir.path())
            .args(["sessions", session_id])
            .assert()
            .success()
            .stdout(predicate::str::contains("keyframe_generation"));
    }

    #[test]
    fn test_run_failure_exits_nonzero_with_failed_stage() {
        let dir = create_temp_project();
        write_fast_config(&dir);
        let url = spawn_backend(true);

        let output = clipforge()
            .current_dir(dir.path())
            .env("CLIPFORGE_BACKEND_URL", &url)
            .args(["run", "--keywords", "aurora"])
            .assert()
            .failure()
            .get_output()
            .stdout
            .clone();

        let result: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["failedStage"], "keyframe_generation");
        assert!(result["error"].as_str().unwrap().contains("502"));
    }

    #[test]
    fn test_run_rejects_invalid_params_file() {
        let dir = create_temp_project();
        let params = dir.path().join("params.json");
        fs::write(&params, "not json").unwrap();

        clipforge()
            .current_dir(dir.path())
            .args(["run", "--params"])
            .arg(&params)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse params file"));
    }
}
