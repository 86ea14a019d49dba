//! End-to-end tests running the daemon binary
//!
//! Each test points the daemon at a throwaway config file so the user's
//! configuration directory is never touched.

use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn daemon(config_dir: &TempDir, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wits-daemon"));
    cmd.arg("--config")
        .arg(config_dir.path().join("config.toml"))
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

fn connect(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(20)),
            Err(e) => panic!("daemon never listened on {}: {}", port, e),
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("daemon did not exit within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_daemon_streams_blocks_until_client_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let mut child = daemon(&dir, &[&port.to_string(), "50", "2", "10"])
        .spawn()
        .unwrap();

    let stream = connect(port);
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reader = BufReader::new(stream);

    let mut lines = Vec::new();
    while lines.iter().filter(|l: &&String| l.as_str() == "!!").count() < 2 {
        let mut line = String::new();
        assert!(reader.read_line(&mut line).unwrap() > 0);
        lines.push(line.trim_end().to_string());
    }

    // 2 records x (&&, 7 header lines, channels 08-10, !!)
    assert_eq!(lines.len(), 2 * 12);
    assert_eq!(lines[0], "&&");
    assert_eq!(lines[1], "101GeneratedWell");
    assert!(lines[10].starts_with("110"));
    assert_eq!(lines[12], "&&");
    assert_eq!(lines[13], "201GeneratedWell");
    assert!(dir.path().join("config.toml").exists());

    drop(reader);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success());
}

#[test]
fn test_daemon_rejects_out_of_range_items() {
    let dir = tempfile::tempdir().unwrap();
    let output: Output = daemon(&dir, &["4000", "1000", "1", "100"]).output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Items must be between 1 and 99"),
        "unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_daemon_rejects_non_numeric_port() {
    let dir = tempfile::tempdir().unwrap();
    let output = daemon(&dir, &["not-a-port"]).output().unwrap();
    assert!(!output.status.success());
}
