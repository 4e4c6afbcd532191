use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio_util::sync::CancellationToken;

use labctl::errors;
use labctl::machine::trace::{self, TraceSink};
use labctl::machine::{MockMachine, Response, Shell};
use labctl::provision::manifests::{
    AUTOPATCH_CRON, AUTOPATCH_SCRIPT, CERT_MANAGER_URL, CNPG_OPERATOR_URL, ISSUER,
    POSTGRES_CLUSTER, REGISTRY, TRAEFIK_CONFIG,
};
use labctl::provision::{Provisioner, Step};
use labctl_test_utils::builders::ConfigBuilder;
use labctl_test_utils::fixed_machines::FixedMachines;
use labctl_test_utils::{init_tracing, with_timeout};

fn buffer_text(buf: &Arc<std::sync::Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buf.lock().unwrap()).into_owned()
}

#[tokio::test]
#[serial]
async fn autopatch_is_installed_executable_with_cron_job() {
    init_tracing();
    let (machines, mocks) = FixedMachines::mocks();
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config)
        .install_autopatch()
        .await
        .unwrap();

    let sh = &machines.remote;
    let script = sh.read_file("/usr/local/bin/autopatch").await.unwrap();
    assert_eq!(script, AUTOPATCH_SCRIPT.as_bytes());
    let info = sh.stat("/usr/local/bin/autopatch").await.unwrap();
    assert_eq!(info.perm(), 0o755);

    let cron = sh.read_file("/etc/cron.d/autopatch").await.unwrap();
    assert_eq!(String::from_utf8(cron).unwrap(), AUTOPATCH_CRON);
    assert_eq!(mocks.remote.file("/etc/cron.d/autopatch").unwrap().1, 0o644);
}

#[tokio::test]
#[serial]
async fn k3s_installer_is_piped_into_sh() {
    let (machines, mocks) = FixedMachines::mocks();
    let machines = machines.with_remote(
        Shell::new(mocks.remote.clone())
            .passthrough("curl")
            .passthrough("sh"),
    );
    mocks.remote.return_output("curl", "#!/bin/sh\necho installing k3s\n");
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config).update_k3s().await.unwrap();

    let curl = mocks.remote.calls_for("curl");
    assert_eq!(curl.len(), 1);
    assert_eq!(curl[0].args, vec!["curl", "-sfL", "https://get.k3s.io"]);

    let sh = mocks.remote.calls_for("sh");
    assert_eq!(sh.len(), 1);
    assert_eq!(sh[0].args, vec!["sh", "-s", "-"]);
    assert_eq!(sh[0].got_lossy(), "#!/bin/sh\necho installing k3s\n");
}

#[tokio::test]
#[serial]
async fn k3s_download_failure_fails_the_step() {
    let (machines, mocks) = FixedMachines::mocks();
    mocks.remote.respond("curl", Response::exit(22));
    let config = ConfigBuilder::new().build();

    let err = Provisioner::new(&machines, &config)
        .run_step(Step::K3s)
        .await
        .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.starts_with("failed to install or update k3s: could not update k3s"), "{msg}");
    assert!(msg.contains("curl exited with status 22"), "{msg}");
}

#[tokio::test]
#[serial]
async fn traefik_config_is_applied_from_stdin() {
    let (machines, mocks) = FixedMachines::mocks();
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config).setup_traefik().await.unwrap();

    let apply = mocks.control.calls_for("apply");
    assert_eq!(apply.len(), 1);
    assert_eq!(apply[0].args, vec!["apply", "-f", "-"]);
    assert_eq!(apply[0].got_lossy(), TRAEFIK_CONFIG);
}

#[tokio::test]
#[serial]
async fn postgres_operator_then_cluster() {
    let (machines, mocks) = FixedMachines::mocks();
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config).setup_postgres().await.unwrap();

    let apply = mocks.control.calls_for("apply");
    assert_eq!(apply.len(), 2);
    assert_eq!(
        apply[0].args,
        vec!["apply", "--server-side", "--force-conflicts", "-f", CNPG_OPERATOR_URL]
    );
    assert_eq!(apply[1].args, vec!["apply", "-f", "-"]);
    assert_eq!(apply[1].got_lossy(), POSTGRES_CLUSTER);
}

#[tokio::test]
#[serial]
async fn cert_manager_stores_cloudflare_token() {
    let (machines, mocks) = FixedMachines::mocks();
    mocks.secrets.return_output("get", "fake-cloudflare-token\n");
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config)
        .setup_cert_manager()
        .await
        .unwrap();

    let apply = mocks.control.calls_for("apply");
    assert_eq!(apply.len(), 3);
    assert_eq!(apply[0].args, vec!["apply", "-f", CERT_MANAGER_URL]);

    let get = mocks.secrets.calls_for("get");
    assert_eq!(get.len(), 1);
    assert_eq!(get[0].args, vec!["get", "k8s/cert-manager/cloudflare"]);

    let secret = apply[1].got_lossy();
    assert!(secret.contains("cert-manager-cloudflare-token"), "{secret}");
    assert!(secret.contains("\"fake-cloudflare-token\""), "{secret}");

    assert_eq!(apply[2].args, vec!["apply", "-f", "-"]);
    assert_eq!(apply[2].got_lossy(), ISSUER);
}

#[tokio::test]
#[serial]
async fn registry_pull_secret_is_created_without_tracing() {
    let (machines, mocks) = FixedMachines::mocks();
    let machines = FixedMachines {
        control: Arc::new(Shell::new(mocks.control.clone())),
        ..machines
    };
    mocks.secrets.return_output("get", "fake-registry-password\n");
    mocks
        .control
        .respond("get", Response::exit_with_stderr(1, "secrets \"regcred\" not found"));
    let config = ConfigBuilder::new().build();

    let (sink, buf) = TraceSink::buffer();
    let _trace = trace::scoped(sink);
    Provisioner::new(&machines, &config)
        .setup_container_registry()
        .await
        .unwrap();

    let get = mocks.secrets.calls_for("get");
    assert_eq!(get[0].args, vec!["get", "ctr.lesiw.dev/auth"]);

    let apply = mocks.control.calls_for("apply");
    assert_eq!(apply.len(), 2);
    let auth = apply[0].got_lossy();
    assert!(auth.contains("registry-auth-secret"), "{auth}");
    assert!(auth.contains("fake-registry-password"), "{auth}");
    assert_eq!(apply[1].got_lossy(), REGISTRY);

    let check = mocks.control.calls_for("get");
    assert_eq!(check.len(), 1);
    assert_eq!(check[0].args, vec!["get", "secret", "regcred"]);

    let create = mocks.control.calls_for("create");
    assert_eq!(create.len(), 1);
    assert_eq!(
        create[0].args,
        vec![
            "create",
            "secret",
            "docker-registry",
            "regcred",
            "--docker-server=ctr.lesiw.dev",
            "--docker-username=ll",
            "--docker-password=fake-registry-password",
        ]
    );

    let traced = buffer_text(&buf);
    assert!(traced.contains("+ get secret regcred"), "{traced}");
    assert!(!traced.contains("create"), "{traced}");
    assert!(!traced.contains("fake-registry-password"), "{traced}");
    // Tracing resumes after the create.
    assert!(matches!(trace::current(), TraceSink::Buffer(_)));
}

#[tokio::test]
#[serial]
async fn existing_pull_secret_is_left_alone() {
    let (machines, mocks) = FixedMachines::mocks();
    mocks.secrets.return_output("get", "fake-registry-password\n");
    let config = ConfigBuilder::new().registry_username("bob").build();

    Provisioner::new(&machines, &config)
        .setup_container_registry()
        .await
        .unwrap();

    assert_eq!(mocks.control.calls_for("get").len(), 1);
    assert!(mocks.control.calls_for("create").is_empty());
    assert!(mocks.control.calls_for("apply")[0].got_lossy().contains("\"bob\""));
}

#[tokio::test]
#[serial]
async fn registry_errors_do_not_leak_the_password() {
    let (machines, mocks) = FixedMachines::mocks();
    mocks.secrets.return_output("get", "fake-registry-password\n");
    mocks.control.respond("get", Response::exit(1));
    mocks
        .control
        .respond("create", Response::exit_with_stderr(1, "forbidden"));
    let config = ConfigBuilder::new().build();

    let err = Provisioner::new(&machines, &config)
        .run_step(Step::Registry)
        .await
        .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.contains("could not store registry secret"), "{msg}");
    assert!(msg.contains("forbidden"), "{msg}");
    assert!(!msg.contains("fake-registry-password"), "{msg}");
    assert!(trace::current().is_discard());
}

#[tokio::test]
#[serial]
async fn cancelled_existence_check_is_not_treated_as_missing() {
    let token = CancellationToken::new();
    let (machines, mocks) = FixedMachines::mocks();
    let control = MockMachine::new().with_cancel(token.clone());
    control.respond("get", Response::pending());
    let machines = FixedMachines {
        control: Arc::new(control.clone()),
        ..machines
    };
    mocks.secrets.return_output("get", "pw\n");
    let config = ConfigBuilder::new().build();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let err = with_timeout(Provisioner::new(&machines, &config).setup_container_registry())
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(errors::is_cancelled(&err));
    assert!(control.calls_for("create").is_empty());
}

#[tokio::test]
#[serial]
async fn full_run_executes_every_step_in_order() {
    let (machines, mocks) = FixedMachines::mocks();
    mocks.secrets.return_output("get", "secret\n");
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config).run(&[]).await.unwrap();

    let remote: Vec<String> = mocks.remote.calls().iter().map(|c| c.program().to_string()).collect();
    assert_eq!(remote, ["tee", "chmod", "tee", "chmod", "curl", "sh"]);
    // traefik 1, postgres 2, cert-manager 3, registry 2
    assert_eq!(mocks.control.calls_for("apply").len(), 8);
    assert_eq!(mocks.secrets.calls_for("get").len(), 2);
}

#[tokio::test]
#[serial]
async fn selected_steps_only() {
    let (machines, mocks) = FixedMachines::mocks();
    let config = ConfigBuilder::new().build();

    Provisioner::new(&machines, &config)
        .run(&[Step::Traefik])
        .await
        .unwrap();

    assert!(mocks.remote.calls().is_empty());
    assert!(mocks.secrets.calls().is_empty());
    assert_eq!(mocks.control.calls().len(), 1);
}

#[tokio::test]
#[serial]
async fn first_failure_stops_the_run() {
    let (machines, mocks) = FixedMachines::mocks();
    mocks.control.respond("apply", Response::exit(1));
    let config = ConfigBuilder::new().build();

    let err = Provisioner::new(&machines, &config)
        .run(&[])
        .await
        .unwrap_err();

    assert!(format!("{err:#}").starts_with("failed to set up traefik"));
    assert_eq!(mocks.control.calls_for("apply").len(), 1);
    assert!(mocks.secrets.calls().is_empty());
}
