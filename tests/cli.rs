use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn ekklesia(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ekklesia").unwrap();
    cmd.env_remove("EKKLESIA_DB")
        .env_remove("EKKLESIA_LOG_DIR")
        .env_remove("EKKLESIA_LOG_JSON")
        .env("EKKLESIA_LOG", "warn")
        .arg("--db")
        .arg(db);
    cmd
}

fn json_out(cmd: &mut Command) -> Result<Value> {
    let output = cmd.arg("--json").output()?;
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn migrate_creates_database() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("nested").join("church.sqlite3");
    ekklesia(&db)
        .args(["db", "migrate"])
        .assert()
        .success();
    assert!(db.exists());

    let out = ekklesia(&db).args(["db", "status"]).output()?;
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout)?;
    assert!(stdout.contains("0001_registry.sql"));
    assert!(!stdout.contains("pending"));
    Ok(())
}

#[test]
fn pledge_is_paid_off_in_installments() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("church.sqlite3");

    let member = json_out(ekklesia(&db).args(["member", "add", "--name", "Grace Wanjiru"]))?;
    let member_id = member["id"].as_str().unwrap().to_string();

    let pledge = json_out(ekklesia(&db).args([
        "pledge",
        "create",
        "--member",
        member_id.as_str(),
        "--category",
        "building_fund",
        "--amount",
        "10000",
    ]))?;
    let pledge_id = pledge["id"].as_str().unwrap().to_string();
    assert_eq!(pledge["status"], "pending");

    let first = json_out(ekklesia(&db).args([
        "pledge", "pay", pledge_id.as_str(), "--amount", "4000", "--method", "mpesa", "--reference",
        "QF12ABC",
    ]))?;
    assert_eq!(first["status"], "pending");
    assert_eq!(first["fulfilled_amount"], 400_000);
    assert_eq!(first["percent"], 40);

    let second = json_out(ekklesia(&db).args([
        "pledge", "pay", pledge_id.as_str(), "--amount", "6,000", "--method", "cash",
    ]))?;
    assert_eq!(second["status"], "fulfilled");
    assert_eq!(second["remaining"], 0);

    let payments = json_out(ekklesia(&db).args(["payment", "list", "--member", member_id.as_str()]))?;
    assert_eq!(payments.as_array().map(Vec::len), Some(2));

    let summary = json_out(ekklesia(&db).args(["report", "pledges"]))?;
    assert_eq!(summary[1]["status"], "fulfilled");
    assert_eq!(summary[1]["pledges"], 1);
    Ok(())
}

#[test]
fn errors_print_code_and_exit_nonzero() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("church.sqlite3");

    let out = ekklesia(&db)
        .args(["pledge", "pay", "nope", "--amount", "10", "--method", "cash"])
        .output()?;
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("Error: [PLEDGE/NOT_FOUND] Pledge not found"), "{stderr}");

    let out = ekklesia(&db)
        .args(["pledge", "pay", "nope", "--amount", "10", "--method", "barter"])
        .output()?;
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("Error: [VALIDATION/PAYMENT_METHOD]"), "{stderr}");

    let out = ekklesia(&db)
        .args(["pledge", "list", "--status", "overdue"])
        .output()?;
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8(out.stderr)?.contains("Error: [VALIDATION/STATUS]"));
    Ok(())
}

#[test]
fn attendance_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("church.sqlite3");

    let event = json_out(ekklesia(&db).args([
        "event",
        "add",
        "--title",
        "Sunday Service",
        "--on",
        "2024-03-03",
    ]))?;
    let event_id = event["id"].as_str().unwrap().to_string();
    let member = json_out(ekklesia(&db).args(["member", "add", "--name", "Alice"]))?;
    let member_id = member["id"].as_str().unwrap().to_string();

    ekklesia(&db)
        .args(["attendance", "record", event_id.as_str(), "--member", member_id.as_str()])
        .assert()
        .success();
    ekklesia(&db)
        .args(["attendance", "record", event_id.as_str(), "--headcount", "30"])
        .assert()
        .success();

    let out = ekklesia(&db)
        .args(["attendance", "list", event_id.as_str()])
        .output()?;
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout)?.contains("total 31"));

    let report = json_out(ekklesia(&db).args(["report", "attendance", "--from", "2024-03-01"]))?;
    assert_eq!(report[0]["headcount"], 31);
    assert_eq!(report[0]["members"], 1);
    Ok(())
}
