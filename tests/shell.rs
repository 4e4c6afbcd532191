use labctl::errors::ErrorKind;
use labctl::machine::{
    Behavior, Fallback, MachineExt, MockMachine, Response, Shell, WriteOptions, call, get,
};

#[tokio::test]
async fn passthrough_output_is_not_captured() {
    let mock = MockMachine::new();
    mock.return_output("curl", "lots of bytes\n");
    mock.return_output("ls", "a b\n");
    let sh = Shell::new(mock.clone()).passthrough("curl");

    let live = sh.command("curl", ["https://get.k3s.io"]).run().await.unwrap();
    let buffered = sh.command("ls", Vec::<String>::new()).run().await.unwrap();

    assert!(live.stdout.is_empty());
    assert_eq!(buffered.stdout, b"a b\n");
}

#[tokio::test]
async fn explicit_capture_overrides_passthrough() {
    let mock = MockMachine::new();
    mock.return_output("kubectl", "v1.31\n");
    let sh = Shell::new(mock).passthrough("kubectl");

    let version = sh.command("kubectl", ["version"]).call().await.unwrap();

    assert_eq!(version, "v1.31");
}

#[test]
fn behaviour_table_lookup() {
    let mut sh = Shell::new(MockMachine::new());
    sh.register_passthrough("ssh");

    assert_eq!(sh.behavior("ssh"), Behavior::Passthrough);
    assert_eq!(sh.behavior("cat"), Behavior::Capture);
    assert!(!sh.is_passthrough("cat"));
}

#[tokio::test]
async fn call_trims_trailing_newlines_only() {
    let mock = MockMachine::new();
    mock.return_output("hostname", "  lab \r\n\n");

    let out = call(&mock, "hostname", Vec::<String>::new()).await.unwrap();

    assert_eq!(out, "  lab ");
}

#[tokio::test]
async fn get_reads_a_single_secret() {
    let mock = MockMachine::new();
    mock.return_output("get", "fake-token\n");

    let token = get(&mock, "get", ["infra/token"]).await.unwrap();

    assert_eq!(token, "fake-token");
    assert_eq!(mock.calls()[0].args, vec!["get", "infra/token"]);
}

#[tokio::test]
async fn nonzero_exit_is_classified_with_stderr() {
    let mock = MockMachine::new();
    mock.respond("false", Response::exit_with_stderr(2, "nope\n"));

    let err = mock.command("false", ["--secret-arg"]).exec().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Exit);
    assert_eq!(err.to_string(), "false exited with status 2: nope");
    assert!(!err.to_string().contains("--secret-arg"));
}

#[tokio::test]
async fn missing_program_is_classified_not_found() {
    let mock = MockMachine::new();
    mock.set_fallback(Fallback::NotFound);

    let err = mock.command("spkez", ["--version"]).call().await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "spkez: command not found");
}

#[tokio::test]
async fn queued_responses_come_first() {
    let mock = MockMachine::new();
    mock.respond_once("spkez", Response::not_found());
    mock.return_output("spkez", "1.0\n");

    assert!(mock.command("spkez", ["--version"]).call().await.unwrap_err().is_not_found());
    assert_eq!(mock.command("spkez", ["--version"]).call().await.unwrap(), "1.0");
}

#[tokio::test]
async fn write_file_applies_default_mode() {
    let mock = MockMachine::new();
    let sh = Shell::new(mock.clone());

    sh.write_file("/etc/motd", b"hello\n", WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(mock.file("/etc/motd"), Some((b"hello\n".to_vec(), 0o644)));
    let info = sh.stat("/etc/motd").await.unwrap();
    assert_eq!(info.perm(), 0o644);
    assert_eq!(info.size, 6);
    // One word, so a remote shell cannot split it.
    assert_eq!(mock.calls_for("stat")[0].args, vec!["stat", "-c", "%a:%s", "/etc/motd"]);
}

#[tokio::test]
async fn write_file_with_mode_and_read_back() {
    let mock = MockMachine::new();
    let sh = Shell::new(mock.clone());

    sh.write_file("/usr/local/bin/tool", b"#!/bin/sh\n", WriteOptions::mode(0o755))
        .await
        .unwrap();

    assert_eq!(sh.read_file("/usr/local/bin/tool").await.unwrap(), b"#!/bin/sh\n");
    assert_eq!(sh.stat("/usr/local/bin/tool").await.unwrap().perm(), 0o755);

    let tee = &mock.calls_for("tee")[0];
    assert_eq!(tee.args, vec!["tee", "/usr/local/bin/tool"]);
    assert_eq!(tee.got, b"#!/bin/sh\n");
    assert_eq!(mock.calls_for("chmod")[0].args, vec!["chmod", "0755", "/usr/local/bin/tool"]);
}

#[tokio::test]
async fn rewriting_a_file_replaces_content() {
    let mock = MockMachine::new();
    mock.add_file("/etc/cron.d/job", "old\n", 0o600);
    let sh = Shell::new(mock.clone());

    sh.write_file("/etc/cron.d/job", b"new\n", WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(mock.file("/etc/cron.d/job"), Some((b"new\n".to_vec(), 0o644)));
}

#[tokio::test]
async fn reading_a_missing_file_fails_with_context() {
    let sh = Shell::new(MockMachine::new());

    let err = sh.read_file("/nope").await.unwrap_err();

    assert!(format!("{err:#}").starts_with("could not read /nope"));
    assert_eq!(labctl::errors::kind(&err), Some(ErrorKind::Exit));
}

#[tokio::test]
async fn write_failure_names_the_path() {
    let mock = MockMachine::new();
    mock.respond("chmod", Response::exit_with_stderr(1, "read-only file system"));
    let sh = Shell::new(mock);

    let err = sh
        .write_file("/boot/x", b"x", WriteOptions::default())
        .await
        .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.contains("could not set mode of /boot/x"), "{msg}");
    assert!(msg.contains("read-only file system"), "{msg}");
}

#[tokio::test]
async fn garbled_stat_output_is_an_error() {
    let mock = MockMachine::new();
    mock.return_output("stat", "what\n");
    let sh = Shell::new(mock);

    assert!(sh.stat("/x").await.is_err());
}
