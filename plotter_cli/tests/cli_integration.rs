use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

// Zero waits so sim runs finish immediately
fn write_fast_config(dir: &TempDir) -> PathBuf {
    let toml = r#"
[machine]
steps_per_mm = 51.2
work_area_width_mm = 150.0
work_area_height_mm = 150.0
input_width = 600.0
input_height = 600.0

[serial]
open_settle_ms = 0
poll_ms = 1

[pacing]
step_us = 0
pen_settle_ms = 0
home_settle_ms = 0
home_before_draw = true

[calibration]
probe_x_settle_ms = 0
probe_y_settle_ms = 0
direction_test_settle_ms = 0
round_trip_steps = 10
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

// One L-shaped stroke captured before calibration
fn write_unmapped_drawing(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("art.json");
    fs::write(
        &path,
        "[[[0.0,0.0,null,null],[40.0,0.0,null,null],[40.0,40.0,null,null]]]",
    )
    .unwrap();
    path
}

fn write_mapped_drawing(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("mapped.json");
    fs::write(&path, "[[[0.0,0.0,0.0,0.0],[40.0,0.0,10.0,0.0],[40.0,40.0,10.0,10.0]]]").unwrap();
    path
}

fn plotter(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("plotter").unwrap();
    cmd.arg("--config").arg(cfg).arg("--log-level").arg("error");
    cmd
}

fn last_json_line(bytes: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(bytes);
    let line = text.lines().rev().find(|l| l.starts_with('{')).unwrap();
    serde_json::from_str(line).unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["draw"], 2, "required", "stderr")]
#[case(&["probe", "sideways"], 2, "invalid value", "stderr")]
#[case(&["--corner", "middle", "self-check"], 2, "unknown corner", "stderr")]
#[case(&["self-check"], 0, "origin: not calibrated", "stdout")]
#[case(&["--sim", "self-check"], 0, "controller ok: POS 0 0", "stdout")]
#[case(&["--sim", "probe", "position"], 0, "POS 0 0", "stdout")]
#[case(&["--sim", "probe", "telemetry"], 0, "pen=up", "stdout")]
#[case(&["--sim", "home"], 0, "HOME OK", "stdout")]
#[case(&["--sim", "ports"], 0, "sim0", "stdout")]
#[case(&["probe", "position"], 4, "no port configured", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let assert = plotter(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn plan_without_origin_exits_3() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_mapped_drawing(&dir);

    plotter(&cfg)
        .arg("plan")
        .arg("--drawing")
        .arg(&art)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("calibrat"));
}

#[rstest]
fn plan_prints_command_stream() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_unmapped_drawing(&dir);

    let out = plotter(&cfg)
        .args(["--corner", "top-left", "--remap", "plan", "--drawing"])
        .arg(&art)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let tokens: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(tokens, ["H", "B", "X512", "Y512", "U"]);
}

#[rstest]
fn unmapped_drawing_needs_remap() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_unmapped_drawing(&dir);

    plotter(&cfg)
        .args(["--corner", "top-left", "plan", "--drawing"])
        .arg(&art)
        .assert()
        .code(3);
}

#[rstest]
fn plan_json_shape() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_mapped_drawing(&dir);

    let out = plotter(&cfg)
        .args(["--json", "--corner", "top-left", "plan", "--drawing"])
        .arg(&art)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json_line(&out);
    assert_eq!(v["strokes"], 1);
    assert_eq!(v["commands"], serde_json::json!(["H", "B", "X512", "Y512", "U"]));
    assert!(v["estimated_ms"].is_u64());
}

#[rstest]
fn empty_drawing_exits_8() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = dir.path().join("empty.json");
    fs::write(&art, "[]").unwrap();

    plotter(&cfg)
        .args(["--sim", "--corner", "top-left", "draw", "--drawing"])
        .arg(&art)
        .assert()
        .code(8)
        .stderr(predicate::str::contains("no strokes"));
}

#[rstest]
fn invalid_config_exits_7() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[machine]\nsteps_per_mm = 0.0\n").unwrap();

    plotter(&cfg)
        .arg("self-check")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("steps_per_mm"));
}

#[rstest]
fn missing_explicit_config_exits_7() {
    let dir = tempdir().unwrap();
    plotter(&dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .code(7);
}

#[rstest]
fn draw_on_sim_completes() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_mapped_drawing(&dir);

    plotter(&cfg)
        .args(["--sim", "--corner", "top-left", "draw", "--drawing"])
        .arg(&art)
        .assert()
        .success()
        .stdout(predicate::str::contains("drawing completed: 1/1 strokes, 5 commands"));
}

#[rstest]
fn draw_json_reports_final_state() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_mapped_drawing(&dir);

    let out = plotter(&cfg)
        .args(["--json", "--sim", "--corner", "top-left", "draw", "--no-home", "--drawing"])
        .arg(&art)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json_line(&out);
    assert_eq!(v["outcome"], "completed");
    assert_eq!(v["commands_sent"], 4);
    assert_eq!(v["final_state"]["x_steps"], 512);
    assert_eq!(v["final_state"]["y_steps"], 512);
    assert_eq!(v["final_state"]["pen_down"], false);
}

#[rstest]
fn json_error_shape() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let out = plotter(&cfg)
        .args(["--json", "--port", "/dev/does-not-exist-plotter", "probe", "position"])
        .assert()
        .code(4)
        .get_output()
        .stderr
        .clone();
    let v = last_json_line(&out);
    assert_eq!(v["reason"], "PortUnavailable");
    assert_eq!(v["exit_code"], 4);
    assert_eq!(v["details"]["port"], "/dev/does-not-exist-plotter");
    assert!(v["message"].is_string());
}

#[rstest]
#[case("top-right")]
#[case("bottom-left")]
fn calibrate_on_sim_with_answer(#[case] corner: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    plotter(&cfg)
        .args(["--sim", "calibrate", "--corner", corner])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("corner = \"{corner}\"")));
}

#[rstest]
fn calibrate_reads_corner_from_stdin() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let out = plotter(&cfg)
        .args(["--json", "--sim", "calibrate"])
        .write_stdin("somewhere\nbottom right\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(last_json_line(&out)["corner"], "bottom-right");
}

#[rstest]
fn calibrate_without_answer_is_cancelled() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    plotter(&cfg)
        .args(["--sim", "calibrate"])
        .write_stdin("")
        .assert()
        .code(6);
}

#[rstest]
fn saved_corner_is_used_by_later_runs() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let art = write_mapped_drawing(&dir);

    plotter(&cfg)
        .args(["--sim", "calibrate", "--corner", "top-left", "--save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved [origin] corner = \"top-left\""));

    let saved = plotter_config::load_file(&cfg).unwrap();
    assert_eq!(saved.origin_corner(), Some(plotter_config::CornerCfg::TopLeft));
    assert_eq!(saved.pacing.step_us, 0);

    plotter(&cfg)
        .args(["--sim", "draw", "--drawing"])
        .arg(&art)
        .assert()
        .success()
        .stdout(predicate::str::contains("drawing completed"));
}

#[rstest]
fn saved_path_is_reported_in_json() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let out = plotter(&cfg)
        .args(["--json", "--sim", "calibrate", "--corner", "bottom-right", "--save"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json_line(&out);
    assert_eq!(v["corner"], "bottom-right");
    assert_eq!(v["saved_to"], cfg.display().to_string());
    let saved = plotter_config::load_file(&cfg).unwrap();
    assert_eq!(saved.origin_corner(), Some(plotter_config::CornerCfg::BottomRight));
}
