use mayhem_generator::Mayhem;
use std::{path::PathBuf, process::Command};

/// Tells a spawned copy of the test binary to arm and crash instead of
/// supervising.
const CHILD_VAR: &str = "CRASH_CAPTURE_TEST_CHILD";
/// Carries the artifact path to the spawned copy.
const ARTIFACT_VAR: &str = "CRASH_CAPTURE_TEST_ARTIFACT";

fn artifact_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("crash-capture-{tag}-{}.log", std::process::id()))
}

/// Unleashes `mayhem` in a spawned copy of this test binary with the capture
/// armed, asserts the child died from `expected`, and returns the artifact
/// lines after checking the common format invariants.
pub fn capture_artifact(mayhem: Mayhem, expected: crash_capture::Signal) -> Vec<String> {
    // The spawned copy takes this branch and never returns
    if let Ok(kind) = std::env::var(CHILD_VAR) {
        let path = std::env::var_os(ARTIFACT_VAR).expect("artifact path not set");
        crash_capture::arm(&path).expect("failed to arm");

        crash_from_nested_calls(kind.parse().expect("unknown mayhem kind"));
    }

    let path = artifact_path(&mayhem.to_string());
    let _ = std::fs::remove_file(&path);

    let exe = std::env::current_exe().expect("failed to get test exe");
    let output = Command::new(exe)
        .arg("--nocapture")
        .env(CHILD_VAR, mayhem.to_string())
        .env(ARTIFACT_VAR, &path)
        .output()
        .expect("failed to spawn test child");

    use std::os::unix::process::ExitStatusExt;
    assert_eq!(
        output.status.signal(),
        Some(expected as i32),
        "child should have died from {}\nstdout: {}\nstderr: {}",
        expected.name(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );

    let artifact = std::fs::read_to_string(&path).expect("artifact was not written");
    let _ = std::fs::remove_file(&path);

    let lines: Vec<_> = artifact.lines().map(String::from).collect();

    assert_eq!(lines[0], expected.name());
    // The walk starts inside the handler, so there is always at least one
    // frame after the fault address
    assert!(lines.len() > 2, "expected at least one frame line");
    for line in &lines[1..] {
        let hex = line.strip_prefix("0x").expect("line missing 0x prefix");
        assert!(
            u64::from_str_radix(hex, 16).is_ok(),
            "line is not a hex address: {line}"
        );
        assert!(
            !hex.bytes().any(|b| b.is_ascii_uppercase()),
            "hex should be lowercase: {line}"
        );
    }

    lines
}

#[inline(never)]
fn innermost(mayhem: Mayhem) -> ! {
    mayhem.unleash()
}

#[inline(never)]
fn middle(mayhem: Mayhem) -> ! {
    innermost(mayhem)
}

#[inline(never)]
fn crash_from_nested_calls(mayhem: Mayhem) -> ! {
    middle(mayhem)
}
