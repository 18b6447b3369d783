// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box checks of the companiond binary's info flags.

use assert_cmd::Command;

#[test]
fn version_flag_prints_version() {
    Command::cargo_bin("companiond")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("companiond"));
}

#[test]
fn help_flag_prints_usage() {
    Command::cargo_bin("companiond")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("USAGE"));
}

#[test]
fn unexpected_argument_fails() {
    Command::cargo_bin("companiond")
        .unwrap()
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(predicates::str::contains("unexpected argument"));
}
