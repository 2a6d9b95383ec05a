mod common;

use common::TestEnv;

#[test]
fn doctor_subcommand_is_available() {
    let output = TestEnv::new().run(&["doctor", "--help"]);

    assert!(
        output.status.success(),
        "doctor --help should succeed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn doctor_command_runs() {
    let output = TestEnv::new().run(&["doctor"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "doctor should run successfully\nstdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("engine-script"));
    assert!(stdout.contains("database"));
    assert!(stdout.contains("speaker-naming"));
}

#[test]
fn doctor_json_emits_parseable_report() {
    let output = TestEnv::new().run(&["doctor", "--json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        output.status.success(),
        "doctor --json should succeed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_str(&stdout).expect("doctor --json should emit valid JSON");
    assert!(report.get("checks").is_some());
    assert!(report.get("devices").is_some());
}
