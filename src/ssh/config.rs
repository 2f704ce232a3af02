//! OpenSSH client configuration for the provisioned hosts.

use camino::Utf8Path;

use super::session::{SSH_PORT, SSH_USER};
use crate::terraform::InfrastructureSnapshot;

/// Alias of the bastion stanza; the other hosts jump through it.
pub const BASTION_ALIAS: &str = "bastion";

/// Renders stanzas for the bastion, each master (`master-N`), and each
/// cluster node (`node-N`). Private hosts are reached with `ProxyJump`.
#[must_use]
pub fn render_ssh_config(
    snapshot: &InfrastructureSnapshot,
    identity_file: &Utf8Path,
    known_hosts_file: &Utf8Path,
) -> String {
    let mut config = String::new();
    push_stanza(
        &mut config,
        BASTION_ALIAS,
        &snapshot.bastion_public_ip,
        identity_file,
        known_hosts_file,
        None,
    );

    let masters = snapshot
        .master_nodes_private_ips
        .iter()
        .enumerate()
        .map(|(index, ip)| (format!("master-{index}"), ip));
    let nodes = snapshot
        .cluster_nodes_private_ips
        .iter()
        .enumerate()
        .map(|(index, ip)| (format!("node-{index}"), ip));
    for (alias, ip) in masters.chain(nodes) {
        config.push('\n');
        push_stanza(
            &mut config,
            &alias,
            ip,
            identity_file,
            known_hosts_file,
            Some(BASTION_ALIAS),
        );
    }
    config
}

fn push_stanza(
    config: &mut String,
    alias: &str,
    host: &str,
    identity_file: &Utf8Path,
    known_hosts_file: &Utf8Path,
    jump: Option<&str>,
) {
    let mut lines = vec![
        format!("Host {alias}"),
        format!("  HostName {host}"),
        format!("  Port {SSH_PORT}"),
        format!("  User {SSH_USER}"),
        format!("  IdentityFile {identity_file}"),
        String::from("  IdentitiesOnly yes"),
        format!("  UserKnownHostsFile {known_hosts_file}"),
    ];
    if let Some(jump) = jump {
        lines.push(format!("  ProxyJump {jump}"));
        lines.push(String::from("  StrictHostKeyChecking accept-new"));
    }
    for line in lines {
        config.push_str(&line);
        config.push('\n');
    }
}
