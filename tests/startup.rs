//! Startup behaviour of the binary when required settings are absent.

use std::io::Write;
use std::process::{Command, Stdio};

#[test]
fn missing_configuration_exits_before_reading_input() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_chat-gate"))
        .env_clear()
        .env("MAIL_FROM", "me@example.com")
        .env("MAIL_PASSWORD", "   ")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // The process may already have exited; a closed pipe is fine here.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(b"hello\n");
    }
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Missing required configuration: POE_API_KEY, MAIL_PASSWORD, MAIL_RECIPIENT"),
        "stderr was: {stderr}"
    );
    // No greeting was answered and no banner printed.
    assert!(output.stdout.is_empty());
    assert!(!stderr.contains("Chat Gate v"));
}
