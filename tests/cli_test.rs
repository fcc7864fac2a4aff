use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::{CVV_KEY, PAN_KEY, generate_script};

fn bankcore() -> Command {
    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.env("BANK_CVV_KEY", CVV_KEY)
        .env("BANK_PAN_KEY", PAN_KEY)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = bankcore();
    cmd.arg("tests/fixtures/commands.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("id,owner,currency,balance,active"))
        .stdout(predicate::str::contains("1,alice,USD,150,true"))
        .stdout(predicate::str::contains("2,bob,USD,50.25,true"))
        .stdout(predicate::str::contains("3,carol,EUR,0,false"))
        // overdraft, currency mismatch and the unknown op
        .stderr(predicate::str::contains("command rejected").count(3));

    Ok(())
}

#[test]
fn test_keys_are_required() {
    let mut cmd = Command::new(cargo_bin!("bankcore"));
    cmd.env_remove("BANK_CVV_KEY")
        .env_remove("BANK_PAN_KEY")
        .arg("tests/fixtures/commands.csv");

    cmd.assert().failure();
}

#[test]
fn test_malformed_key_is_fatal() {
    let mut cmd = bankcore();
    cmd.env("BANK_CVV_KEY", "not-hex").arg("tests/fixtures/commands.csv");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CVV key is not valid hex"));
}

#[test]
fn test_missing_input_file() {
    let mut cmd = bankcore();
    cmd.arg("tests/fixtures/does_not_exist.csv");

    cmd.assert().failure();
}

#[test]
fn test_generated_script() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.csv");
    generate_script(&path, 25).unwrap();

    let mut cmd = bankcore();
    cmd.arg(&path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("25,user25,USD,10,true"))
        .stderr(predicate::str::contains("command rejected").not());
}
