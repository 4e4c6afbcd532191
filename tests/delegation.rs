use proptest::prelude::*;

use labctl::machine::{MachineExt, MockMachine, Sub, delegate};

fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_./=-]{1,12}"
}

fn words(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(word(), 0..max)
}

fn prefix() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(word(), 1..5)
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

proptest! {
    #[test]
    fn delegate_prepends_prefix(p in prefix(), cmd in word(), args in words(6)) {
        let mock = MockMachine::new();
        let sub = delegate(mock.clone(), p.clone()).unwrap();

        block_on(sub.command(&cmd, args.clone()).exec()).unwrap();

        let mut want = p.clone();
        want.push(cmd);
        want.extend(args);
        let calls = mock.calls();
        prop_assert_eq!(calls.len(), 1);
        prop_assert_eq!(&calls[0].args, &want);
    }

    #[test]
    fn nested_delegation_is_associative(
        p1 in prefix(),
        p2 in prefix(),
        cmd in word(),
        args in words(6),
    ) {
        let nested_mock = MockMachine::new();
        let nested = delegate(delegate(nested_mock.clone(), p1.clone()).unwrap(), p2.clone()).unwrap();

        let flat_mock = MockMachine::new();
        let joined: Vec<String> = p1.iter().chain(p2.iter()).cloned().collect();
        let flat = delegate(flat_mock.clone(), joined).unwrap();

        block_on(async {
            nested.command(&cmd, args.clone()).exec().await.unwrap();
            flat.command(&cmd, args.clone()).exec().await.unwrap();
        });

        prop_assert_eq!(nested_mock.calls(), flat_mock.calls());
    }
}

#[test]
fn empty_prefix_is_rejected() {
    assert!(delegate(MockMachine::new(), Vec::<String>::new()).is_none());
}

#[tokio::test]
async fn delegate_with_no_args_still_forwards_command() {
    let mock = MockMachine::new();
    let sub = Sub::new(mock.clone(), "kubectl", Vec::<String>::new());

    sub.command("version", Vec::<String>::new()).exec().await.unwrap();

    assert_eq!(mock.calls()[0].args, vec!["kubectl", "version"]);
}

#[tokio::test]
async fn delegate_forwards_stdin_and_output() {
    let mock = MockMachine::new();
    mock.return_output("ssh", "ok\n");
    let sub = Sub::new(mock.clone(), "ssh", ["host", "--"]);

    let out = sub
        .command("tee", ["/tmp/x"])
        .stdin("payload")
        .call()
        .await
        .unwrap();

    assert_eq!(out, "ok");
    let calls = mock.calls_for("ssh");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, vec!["ssh", "host", "--", "tee", "/tmp/x"]);
    assert_eq!(calls[0].got, b"payload");
}

#[tokio::test]
async fn delegate_errors_name_the_outer_program() {
    let mock = MockMachine::new();
    mock.respond("ssh", labctl::machine::Response::exit(255));
    let sub = Sub::new(mock, "ssh", ["host", "--"]);

    let err = sub.command("uptime", Vec::<String>::new()).exec().await.unwrap_err();

    assert_eq!(err.program(), "ssh");
    assert_eq!(err.to_string(), "ssh exited with status 255");
}

#[test]
fn prefix_reports_program_first() {
    let sub = Sub::new(MockMachine::new(), "ssh", ["-i", "key", "host", "--"]);
    assert_eq!(sub.prefix(), vec!["ssh", "-i", "key", "host", "--"]);
}

#[tokio::test]
async fn remote_shell_prefix_quotes_forwarded_words() {
    let mock = MockMachine::new();
    let ssh = Sub::new(mock.clone(), "ssh", ["-i", "/tmp/key file", "host", "--"]).remote_shell();

    ssh.command("stat", ["-c", "%a %s", "it's"]).exec().await.unwrap();

    assert_eq!(
        mock.calls()[0].args,
        vec!["ssh", "-i", "/tmp/key file", "host", "--", "stat", "-c", "'%a %s'", r"'it'\''s'"]
    );
}

#[tokio::test]
async fn ssh_connection_failure_is_an_io_error() {
    let mock = MockMachine::new();
    mock.respond(
        "ssh",
        labctl::machine::Response::exit_with_stderr(255, "ssh: connect to host lab port 22: Connection refused"),
    );
    let ssh = Sub::new(mock, "ssh", ["lab", "--"]).remote_shell();

    let err = ssh.command("uptime", Vec::<String>::new()).exec().await.unwrap_err();

    assert_eq!(err.kind(), labctl::errors::ErrorKind::Io);
    assert_eq!(
        err.to_string(),
        "ssh: connection failed: ssh: connect to host lab port 22: Connection refused"
    );
}

#[tokio::test]
async fn remote_command_failures_keep_their_status() {
    let mock = MockMachine::new();
    mock.respond("ssh", labctl::machine::Response::exit(3));
    let ssh = Sub::new(mock, "ssh", ["lab", "--"]).remote_shell();

    let err = ssh.command("false", Vec::<String>::new()).exec().await.unwrap_err();

    assert_eq!(err.kind(), labctl::errors::ErrorKind::Exit);
}
