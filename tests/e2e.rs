use std::path::Path;
use std::process::Command;

use jvirt::model::ClassNode;

const CLASSES: &str = r#"[
  {
    "access": 1,
    "name": "demo/Calc",
    "super_name": "java/lang/Object",
    "methods": [
      {
        "access": 9, "name": "add", "desc": "(II)I", "max_stack": 2, "max_locals": 2,
        "instructions": [
          {"kind": "label", "id": 0},
          {"kind": "var", "opcode": 21, "var": 0},
          {"kind": "var", "opcode": 21, "var": 1},
          {"kind": "simple", "opcode": 96},
          {"kind": "simple", "opcode": 172}
        ]
      },
      {
        "access": 9, "name": "pick", "desc": "(I)I", "max_stack": 1, "max_locals": 1,
        "instructions": [
          {"kind": "label", "id": 0},
          {"kind": "var", "opcode": 21, "var": 0},
          {"kind": "table_switch", "min": 0, "max": 0, "default": 0, "labels": [0]}
        ]
      },
      {
        "access": 1, "name": "<init>", "desc": "()V", "max_stack": 1, "max_locals": 1,
        "instructions": [{"kind": "simple", "opcode": 177}]
      }
    ]
  }
]"#;

fn run_jvirt(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_jvirt"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to execute jvirt");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn virtualize(dir: &Path, extra: &[&str]) -> String {
    std::fs::write(dir.join("classes.json"), CLASSES).unwrap();
    let mut args = vec!["virtualize", "classes.json", "--out", "out"];
    args.extend_from_slice(extra);
    let (stdout, stderr, success) = run_jvirt(dir, &args);
    assert!(success, "virtualize should succeed, stderr:\n{}", stderr);
    stdout
}

#[test]
fn test_virtualize_writes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = virtualize(dir.path(), &["--seed", "1234"]);

    assert!(stdout.contains("demo/Calc: 1 virtualized, 1 skipped"));
    assert!(stdout.contains("pick(I)I: unsupported instruction: tableswitch"));

    let out = dir.path().join("out");
    assert!(out.join("jvirt/stubs.bin").is_file());
    assert!(out.join("artifact.toml").is_file());
    assert!(out.join("runtime/vm.rs").is_file());
    let key = std::fs::read_to_string(out.join("runtime/build_key.rs")).unwrap();
    assert!(key.contains("Some(1234)"));

    let rewritten: Vec<ClassNode> =
        serde_json::from_str(&std::fs::read_to_string(out.join("classes.json")).unwrap()).unwrap();
    let methods = &rewritten[0].methods;
    assert_eq!(methods[0].desc, "(II)I");
    assert!(methods[0].instructions.len() > 5);
    assert_eq!(methods[1].instructions.len(), 3);
    assert_eq!(methods[2].instructions.len(), 1);
}

#[test]
fn test_disasm_artifact_directory() {
    let dir = tempfile::tempdir().unwrap();
    virtualize(dir.path(), &["--seed", "99"]);

    let (stdout, stderr, success) = run_jvirt(dir.path(), &["disasm", "out"]);
    assert!(success, "disasm should succeed, stderr:\n{}", stderr);
    assert!(stdout.contains("== Stub[0]: demo/Calc.add(II)I (5 instructions) =="));
    assert!(stdout.contains(" 0001: LOAD 0"));
    assert!(stdout.contains(" 0003: ADD"));
}

#[test]
fn test_json_report_and_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("jvirt.toml"),
        "resource_name = \"data/vm.bin\"\nshuffle_opcodes = false\n",
    )
    .unwrap();
    let stdout = virtualize(dir.path(), &["--json"]);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["classes"][0]["virtualized"][0], "add(II)I");
    assert!(dir.path().join("out/data/vm.bin").is_file());

    // Unshuffled resources decode without a seed.
    let (stdout, _, success) = run_jvirt(dir.path(), &["disasm", "out/data/vm.bin"]);
    assert!(success);
    assert!(stdout.contains("== Stub[0] (5 instructions) =="));
}

#[test]
fn test_errors_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, success) = run_jvirt(dir.path(), &["virtualize", "missing.json", "--out", "out"]);
    assert!(!success);
    assert!(stderr.contains("error: failed to read missing.json"));

    std::fs::write(dir.path().join("jvirt.toml"), "compression_level = 1000\n").unwrap();
    std::fs::write(dir.path().join("classes.json"), "[]").unwrap();
    let (_, stderr, success) = run_jvirt(dir.path(), &["virtualize", "classes.json", "--out", "out"]);
    assert!(!success);
    assert!(stderr.contains("invalid configuration"));
}
