// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn flame() -> Command {
    Command::cargo_bin("flame").unwrap()
}

#[test]
fn renders_a_pixmap() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("sierpinski.ppm");
    flame()
        .args(&["--size", "32x24", "--pixels-per-unit", "12", "--density", "5", "--threads", "1", "--seed", "3", "-q", "-o"])
        .arg(&out)
        .assert()
        .success();
    let image = image::open(&out).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (32, 24));
    assert!(image.pixels().any(|p| p.0 != [0, 0, 0]));
}

#[test]
fn renders_png_and_hdr() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("spiral.png");
    let hdr = dir.path().join("spiral.hdr");
    flame()
        .args(&["--preset", "spiral", "--size", "20x20", "--pixels-per-unit", "8", "--density", "100"])
        .args(&["--spatial-oversample", "2", "--color-oversample", "2", "--threads", "1", "-q"])
        .arg("--hdr")
        .arg(&hdr)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(image::image_dimensions(&out).unwrap(), (20, 20));
    assert!(std::fs::metadata(&hdr).unwrap().len() > 0);
}

#[test]
fn seeded_single_thread_renders_are_identical() {
    let dir = tempdir().unwrap();
    let render = |name: &str| {
        let out = dir.path().join(name);
        flame()
            .args(&["--size", "16x16", "--density", "20", "--threads", "1", "--seed", "11", "-q", "-o"])
            .arg(&out)
            .assert()
            .success();
        std::fs::read(&out).unwrap()
    };
    assert_eq!(render("a.ppm"), render("b.ppm"));
}

#[test]
fn out_of_range_oversampling_fails() {
    let dir = tempdir().unwrap();
    flame()
        .args(&["--size", "8x8", "--spatial-oversample", "7", "-q", "-o"])
        .arg(dir.path().join("never.ppm"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("spatial oversample 7"));
    assert!(!dir.path().join("never.ppm").exists());
}

#[test]
fn bad_size_is_rejected() {
    flame()
        .args(&["--size", "big", "-o", "x.ppm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not parse output image size"));
}

#[test]
fn output_is_required() {
    flame().assert().failure();
}
