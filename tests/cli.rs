use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const QUAD: &str = "v -0.5 0 -0.5\nv 0.5 0 -0.5\nv 0.5 0 0.5\nv -0.5 0 0.5\n\
vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nf 1/1 2/2 3/3 4/4\n";

fn node(name: &str, position: &str) -> String {
    format!(
        "<node><name>{name}</name><mesh>quad.obj</mesh><position>{position}</position></node>"
    )
}

fn write_assets(stand_names: [&str; 2]) -> TempDir {
    let dir = TempDir::new().expect("temp asset dir");
    let nodes = [
        node("Baked", "0 0 0"),
        node("Light_Inside001", "1 1.2 0"),
        node("Light_Inside003", "-1 1.2 0.2"),
        node(stand_names[0], "1 0.5 0"),
        node(stand_names[1], "-1 0.5 0.2"),
        node("Circle", "0 0.8 -1"),
    ]
    .concat();
    fs::write(
        dir.path().join("portal.model.xml"),
        format!("<model>{nodes}</model>"),
    )
    .expect("write model");
    fs::write(dir.path().join("quad.obj"), QUAD).expect("write mesh");
    dir
}

fn summary_command(assets: &Path) -> Command {
    let mut cmd = Command::cargo_bin("portal-scene").expect("binary exists");
    cmd.arg("--summary-only")
        .arg("--assets")
        .arg(assets)
        .arg("--seed")
        .arg("7")
        .arg("--frames")
        .arg("5");
    cmd
}

#[test]
fn summary_reports_attached_model_and_placed_fires() {
    let assets = write_assets(["LightStand01", "LightStand02"]);
    summary_command(assets.path())
        .assert()
        .success()
        .stdout(contains("Ran 5 frame(s)"))
        .stdout(contains(" - model: attached"))
        .stdout(contains(" - fireflies: 30"))
        .stdout(contains(" - fire 1 pos=(1.00, 0.61, 0.00)"))
        .stdout(contains(" - fire 2 pos=(-1.00, 0.61, 0.20)"))
        .stdout(contains(" - clear color: #0d0614"))
        .stdout(contains("Baked texture: unavailable"));
}

#[test]
fn summary_fails_when_a_light_stand_is_missing() {
    let assets = write_assets(["LightStand01", "LightStandTwo"]);
    summary_command(assets.path())
        .assert()
        .failure()
        .stdout(contains(" - model: failed"))
        .stdout(contains(" - fire 2 pos=(0.00, 0.00, 0.00)"))
        .stderr(contains("LightStand02"));
}

#[test]
fn summary_fails_when_the_model_is_absent() {
    let assets = TempDir::new().expect("temp asset dir");
    summary_command(assets.path())
        .assert()
        .failure()
        .stderr(contains("portal.model.xml"));
}

#[test]
fn config_file_overrides_clear_color() {
    let assets = write_assets(["LightStand01", "LightStand02"]);
    let config = assets.path().join("scene.json");
    fs::write(&config, r##"{ "clear_color": "#102030" }"##).expect("write config");
    summary_command(assets.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(contains(" - clear color: #102030"));
}
