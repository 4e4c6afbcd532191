// src/provision/manifests.rs

//! Static payloads shipped to the host. Manifests are opaque bytes: nothing
//! here parses YAML, the secret templates only fill in quoted scalars.

pub const AUTOPATCH_SCRIPT: &str = include_str!("../../manifests/autopatch.sh");
pub const AUTOPATCH_PATH: &str = "/usr/local/bin/autopatch";
pub const AUTOPATCH_CRON_PATH: &str = "/etc/cron.d/autopatch";
pub const AUTOPATCH_CRON: &str =
    "0 2 * * 6 root /usr/local/bin/autopatch >> /var/log/autopatch.log 2>&1\n";

pub const K3S_INSTALL_URL: &str = "https://get.k3s.io";

pub const TRAEFIK_CONFIG: &str = include_str!("../../manifests/traefik.yml");

pub const CNPG_OPERATOR_URL: &str = "https://raw.githubusercontent.com/cloudnative-pg/\
                                     cloudnative-pg/release-1.25/releases/cnpg-1.25.0.yaml";
pub const POSTGRES_CLUSTER: &str = include_str!("../../manifests/cluster.yml");

pub const CERT_MANAGER_URL: &str =
    "https://github.com/cert-manager/cert-manager/releases/download/v1.17.1/cert-manager.yaml";
pub const CLOUDFLARE_SECRET_NAME: &str = "cert-manager-cloudflare-token";
pub const CLOUDFLARE_SECRET_KEY: &str = "api-token";
pub const ISSUER: &str = include_str!("../../manifests/issuer.yml");

pub const REGISTRY: &str = include_str!("../../manifests/registry.yml");
pub const REGISTRY_AUTH_SECRET_NAME: &str = "registry-auth-secret";
pub const REGISTRY_PULL_SECRET_NAME: &str = "regcred";

/// An `Opaque` secret holding one string value.
pub fn opaque_secret(name: &str, key: &str, value: &str) -> String {
    format!(
        "apiVersion: v1\n\
         kind: Secret\n\
         metadata:\n  name: {name}\n\
         type: Opaque\n\
         stringData:\n  {key}: {}\n",
        quote(value)
    )
}

/// A `kubernetes.io/basic-auth` secret.
pub fn basic_auth_secret(name: &str, username: &str, password: &str) -> String {
    format!(
        "apiVersion: v1\n\
         kind: Secret\n\
         metadata:\n  name: {name}\n\
         type: kubernetes.io/basic-auth\n\
         stringData:\n  username: {}\n  password: {}\n",
        quote(username),
        quote(password)
    )
}

/// Double-quoted YAML scalar.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
