// Drives the compiled binary through a PTY, exercising the real event loop
// and crossterm input handling.
//
// - Requires a TTY; expectrl allocates a pseudo terminal.
// - Unix-only and ignored by default.
// - Run manually via: `cargo test --test integration_min_session -- --ignored`.

#![cfg(unix)]

use std::time::Duration;

use expectrl::{spawn, Eof};

#[test]
#[ignore]
fn take_exam_submit_and_quit() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempfile::tempdir()?;
    let bin = assert_cmd::cargo::cargo_bin("tryout");
    let cmd = format!("env HOME={} {} take science", home.path().display(), bin.display());

    let mut p = spawn(cmd)?;
    std::thread::sleep(Duration::from_millis(300));

    // answer both questions, then submit without a confirmation prompt
    p.send("c")?;
    p.send("n")?;
    p.send("b")?;
    p.send("s")?;
    p.expect("Exam Completed")?;

    p.send("q")?;
    p.expect(Eof)?;

    assert!(home.path().join(".local/state/tryout/history.db").exists());
    Ok(())
}
