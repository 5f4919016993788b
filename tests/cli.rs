use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

fn kt_build() -> Command {
    Command::cargo_bin("kt-build").expect("binary")
}

#[test]
fn help_lists_the_catalog_flags() {
    kt_build()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--tsconfig-test-path"))
        .stdout(predicate::str::contains("--dest-app"))
        .stdout(predicate::str::contains("[COMMAND]"));
}

#[test]
fn version_is_printed() {
    kt_build()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn invalid_mode_is_a_usage_error() {
    kt_build()
        .args(["--mode", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn build_writes_an_extendscript_bundle() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/index.ts"),
        "import { add } from './math';\nexport const KT = { add: add };\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("src/math.ts"),
        "export function add(a: number, b: number): number {\n  return a + b;\n}\n",
    )
    .unwrap();

    kt_build()
        .current_dir(dir.path())
        .args(["build", "--minify"])
        .assert()
        .success();

    let bundle = fs::read_to_string(dir.path().join("dist/index.js")).unwrap();
    assert!(bundle.starts_with("(function(thisObj){"));
    assert!(bundle.contains("function add(a,b){"));
    assert!(bundle.contains("thisObj.KT=KT;"));
    assert!(!bundle.contains("number"));
}

#[test]
fn missing_entry_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();

    kt_build()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure();
}
