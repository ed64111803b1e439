//! Tests that drive the compiled `logsift` binary

use logsift::logs::SAMPLE_LINES;
use std::fs;
use std::process::Stdio;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

fn logsift() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_logsift"));
    command.env_remove("RUST_LOG");
    command
}

#[tokio::test]
async fn test_detect_command() {
    for (line, expected) in SAMPLE_LINES
        .iter()
        .zip(["apache", "nginx", "json", "syslog"])
    {
        let output = logsift().arg("detect").arg(line).output().await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), expected);
    }

    let output = logsift()
        .args(["detect", "plain text"])
        .output()
        .await
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "unknown");
}

#[tokio::test]
async fn test_parse_file_prints_json_lines() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("sample.log");
    fs::write(&path, SAMPLE_LINES.join("\n")).unwrap();

    let output = logsift().arg("parse").arg(&path).output().await.unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["statusCode"], 200);
    assert_eq!(records[1]["sourceIp"], "192.168.1.10");
    assert_eq!(records[3]["sourceIp"], "myhost");
}

#[tokio::test]
async fn test_parse_tolerates_invalid_utf8() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("binary.log");
    let mut content = format!("{}\n", SAMPLE_LINES[0]).into_bytes();
    content.extend_from_slice(b"broken \xff\xfe line\n");
    fs::write(&path, content).unwrap();

    let output = logsift().arg("parse").arg(&path).output().await.unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["logFormat"], "apache");
    assert_eq!(records[1]["logFormat"], "unknown");
    assert!(records[1]["rawLine"].as_str().unwrap().contains('\u{FFFD}'));
}

#[tokio::test]
async fn test_parse_reads_stdin() {
    let mut child = logsift()
        .arg("parse")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    stdin
        .write_all(format!("{}\n", SAMPLE_LINES[2]).as_bytes())
        .await
        .unwrap();
    drop(stdin);

    let output = child.wait_with_output().await.unwrap();
    assert!(output.status.success());
    let record: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&output.stdout).trim()).unwrap();
    assert_eq!(record["logFormat"], "json");
    assert_eq!(record["sourceFile"], "stdin");
}

#[tokio::test]
async fn test_parse_missing_file_fails() {
    let temp_dir = tempdir().unwrap();
    let output = logsift()
        .arg("parse")
        .arg(temp_dir.path().join("missing.log"))
        .output()
        .await
        .unwrap();
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_demo_command() {
    let output = logsift().arg("demo").output().await.unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("Format: ").count(), 4);
    assert!(stdout.contains("Format: syslog"));
    assert!(stdout.contains("..."));
}
