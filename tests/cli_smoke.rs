use assert_cmd::prelude::*;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn noise(width: u32, height: u32) -> GrayImage {
    let mut state: u32 = 0x1234_5678;
    ImageBuffer::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Luma([(state >> 24) as u8 | 0x08])
    })
}

/// Screen, template directory and config file for offline resolution
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let screen = noise(80, 60);
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();

        let corner = image::imageops::crop_imm(&screen, 5, 40, 10, 10).to_image();
        DynamicImage::ImageLuma8(corner)
            .save(templates.join("corner.png"))
            .unwrap();
        DynamicImage::ImageLuma8(screen)
            .save(dir.path().join("screen.png"))
            .unwrap();

        let config = format!(
            "sources:\n  - backend: static-frame\n    options:\n      screen: {}\ntext_detectors: []\ntemplate_matchers:\n  - backend: imageproc\n    options:\n      threshold: \"0.99\"\ntemplate_dir: {}\ntrace:\n  enabled: false\n",
            dir.path().join("screen.png").display(),
            templates.display()
        );
        std::fs::write(dir.path().join("soulheal.yaml"), config).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("soulheal.yaml")
    }
}

fn soulheal(config: &Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("soulheal");
    let mut cmd = Command::new(bin);
    cmd.env_remove("RUST_LOG")
        .env_remove("SOULHEAL_TEMPLATE_DIR")
        .env_remove("SOULHEAL_TRACE_FILE")
        .args(["--config", config.to_str().unwrap(), "--output", "json"]);
    cmd
}

fn json_stdout(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    let start = stdout.find('{').expect("json start");
    let end = stdout.rfind('}').expect("json end");
    serde_json::from_str(&stdout[start..=end]).expect("valid json")
}

#[test]
fn locate_finds_template_on_saved_screen() {
    let ws = Workspace::new();
    let assert = soulheal(&ws.config())
        .args(["locate", "--target", "corner.png"])
        .assert()
        .success();

    let value = json_stdout(assert.get_output());
    let located = value["located"].as_array().unwrap();
    assert_eq!(located.len(), 1);
    assert_eq!(located[0]["technique"], "image-template-matching");
    assert_eq!(located[0]["value"]["coordinates"]["x"], 10);
    assert_eq!(located[0]["value"]["coordinates"]["y"], 45);
    assert_eq!(value["attempts"][0]["outcome"]["status"], "success");
}

#[test]
fn locate_outside_area_of_interest_fails() {
    let ws = Workspace::new();
    let assert = soulheal(&ws.config())
        .args(["locate", "--target", "corner.png", "--aoi", "50,0,50,50"])
        .assert()
        .failure();

    let value = json_stdout(assert.get_output());
    assert!(value["located"].as_array().unwrap().is_empty());
    assert_eq!(value["attempts"][0]["outcome"]["status"], "not_found");
}

#[test]
fn strategies_reports_skipped_techniques() {
    let ws = Workspace::new();
    let assert = soulheal(&ws.config())
        .args(["strategies", "--target", "Login"])
        .assert()
        .success();

    let value = json_stdout(assert.get_output());
    assert_eq!(value["classification"], "text_label");
    let plan = value["plan"].as_array().unwrap();
    let techniques: Vec<&str> = plan.iter().map(|row| row["technique"].as_str().unwrap()).collect();
    assert_eq!(techniques, vec!["direct-text-locator", "ocr-text-detection"]);
    assert!(plan.iter().all(|row| row["active"] == false));
}

#[test]
fn plan_expands_combinations_in_order() {
    let ws = Workspace::new();
    let assert = soulheal(&ws.config())
        .args(["plan", "--param", "target=a,b,c", "--param", "index=0,1"])
        .assert()
        .success();

    let value = json_stdout(assert.get_output());
    assert_eq!(value["total"], 6);
    let combinations = value["combinations"].as_array().unwrap();
    assert_eq!(combinations.len(), 6);
    assert_eq!(combinations[0]["entries"][0], serde_json::json!(["target", "a"]));
    assert_eq!(combinations[1]["entries"][1], serde_json::json!(["index", 1]));
}

#[test]
fn info_lists_backends() {
    let ws = Workspace::new();
    let assert = soulheal(&ws.config()).arg("info").assert().success();

    let value = json_stdout(assert.get_output());
    assert_eq!(value["sources"][0]["backend"], "static-frame");
    let available = value["available"]["template_matchers"].as_array().unwrap();
    assert!(available.iter().any(|id| id == "imageproc"));
    assert_eq!(value["techniques"].as_array().unwrap().len(), 4);
    assert!(value["git_commit"].is_string());
    assert!(value["git_branch"].is_string());
}
