use std::{fs, path::Path};

use runtime_spec::LinuxDevice;
use specgen::{ExportOptions, Generator};
use tempfile::TempDir;
use validate::{Code, Level, Validator};

/// 写出 config.json，并创建 rootfs 与全部挂载点
fn write_bundle(g: &Generator) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let rootfs = g.spec().rootfs_path(dir.path());
    fs::create_dir_all(&rootfs).unwrap();
    for m in &g.spec().mounts {
        fs::create_dir_all(rootfs.join(m.destination.trim_start_matches('/'))).unwrap();
    }
    g.save_to_file(dir.path().join("config.json"), ExportOptions::default())
        .unwrap();
    dir
}

fn validate(bundle: &Path, host_specific: bool) -> validate::Violations {
    Validator::from_bundle(bundle, host_specific)
        .unwrap()
        .validate()
        .unwrap()
}

#[test]
fn test_generated_bundle_is_valid() {
    let g = Generator::new();
    let dir = write_bundle(&g);
    let vs = validate(dir.path(), false);
    assert!(vs.is_empty(), "unexpected violations: {:?}", vs);
}

#[test]
fn test_missing_args_single_violation() {
    let dir = write_bundle(&Generator::new());
    let config = dir.path().join("config.json");
    let mut doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config).unwrap()).unwrap();
    doc["process"].as_object_mut().unwrap().remove("args");
    fs::write(&config, doc.to_string()).unwrap();

    let vs = validate(dir.path(), false);
    assert_eq!(vs.len(), 1);
    let v = vs.iter().next().unwrap();
    assert_eq!(v.code, Code::MandatoryFieldMissing);
    assert_eq!(v.level, Level::Must);
    assert_eq!(v.subject, "process.args");
    assert_eq!(vs.at_least(Level::Must).len(), 1);
}

#[test]
fn test_null_args_reported_as_missing() {
    let dir = write_bundle(&Generator::new());
    let config = dir.path().join("config.json");
    let mut doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config).unwrap()).unwrap();
    doc["process"]["args"] = serde_json::Value::Null;
    fs::write(&config, doc.to_string()).unwrap();

    let vs = validate(dir.path(), false);
    assert_eq!(vs.len(), 1);
    let v = vs.iter().next().unwrap();
    assert_eq!(v.code, Code::MandatoryFieldMissing);
    assert_eq!(v.subject, "process.args");
}

#[test]
fn test_compliance_filter() {
    let mut g = Generator::new();
    g.add_linux_uid_mapping("1000:0:1").unwrap();
    let dir = write_bundle(&g);

    let vs = validate(dir.path(), false);
    assert_eq!(vs.len(), 1);
    assert_eq!(vs.iter().next().unwrap().code, Code::IdMappingsWithoutUserNs);
    assert_eq!(vs.at_least(Level::Should).len(), 1);
    assert!(vs.at_least(Level::Must).is_empty());
}

#[test]
fn test_host_device_matches() {
    let mut g = Generator::new();
    g.add_linux_device(LinuxDevice {
        path: "/dev/null".to_string(),
        typ: "c".to_string(),
        major: 1,
        minor: 3,
        ..Default::default()
    })
    .unwrap();
    let dir = write_bundle(&g);

    let vs = validate(dir.path(), true);
    assert!(!vs.has_code(Code::DevicesFileNotMatch));
}

#[test]
fn test_host_device_type_differs() {
    let host = tempfile::tempdir().unwrap();
    let node = host.path().join("null");
    fs::write(&node, "").unwrap();

    let mut g = Generator::new();
    g.add_linux_device(LinuxDevice {
        path: node.display().to_string(),
        typ: "c".to_string(),
        major: 1,
        minor: 3,
        ..Default::default()
    })
    .unwrap();
    let dir = write_bundle(&g);

    let vs = validate(dir.path(), true);
    let mismatched: Vec<_> = vs
        .iter()
        .filter(|v| v.code == Code::DevicesFileNotMatch)
        .collect();
    assert_eq!(mismatched.len(), 1);
    assert_eq!(mismatched[0].subject, "linux.devices[0]");

    // 非主机相关模式不访问主机设备
    let vs = validate(dir.path(), false);
    assert!(!vs.has_code(Code::DevicesFileNotMatch));
}
