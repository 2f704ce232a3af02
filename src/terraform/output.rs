//! Parsing of `terraform output -json` into an infrastructure snapshot.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Addresses of the provisioned hosts, as reported by one `terraform output`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InfrastructureSnapshot {
    /// Public address of the bastion; empty when not provisioned.
    pub bastion_public_ip: String,
    /// Private addresses of the master nodes, in output order.
    pub master_nodes_private_ips: Vec<String>,
    /// Private addresses of the cluster nodes, in output order.
    pub cluster_nodes_private_ips: Vec<String>,
}

impl InfrastructureSnapshot {
    /// Returns `true` when the bastion has an address, at least one master
    /// exists, and at least two cluster nodes exist.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.bastion_public_ip.is_empty()
            && !self.master_nodes_private_ips.is_empty()
            && self.cluster_nodes_private_ips.len() >= 2
    }
}

impl fmt::Display for InfrastructureSnapshot {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bastion = if self.bastion_public_ip.is_empty() {
            "<none>"
        } else {
            self.bastion_public_ip.as_str()
        };
        writeln!(formatter, "bastion: {bastion}")?;
        writeln!(
            formatter,
            "masters: [{}]",
            self.master_nodes_private_ips.join(", ")
        )?;
        writeln!(
            formatter,
            "nodes:   [{}]",
            self.cluster_nodes_private_ips.join(", ")
        )?;
        write!(
            formatter,
            "usable:  {}",
            if self.is_usable() { "yes" } else { "no" }
        )
    }
}

/// Raised when `terraform output` is not the expected JSON document.
#[derive(Debug, Error)]
#[error("failed to parse terraform output: {source}")]
pub struct OutputParseError {
    #[source]
    source: serde_json::Error,
}

#[derive(Debug, Default, Deserialize)]
struct OutputValue<T> {
    #[serde(default)]
    value: T,
}

#[derive(Debug, Deserialize)]
struct RawOutputs {
    #[serde(default)]
    bastion_public_ip: OutputValue<String>,
    #[serde(default)]
    master_nodes_private_ip: OutputValue<Vec<String>>,
    #[serde(default)]
    cluster_nodes_private_ip: OutputValue<Vec<String>>,
}

/// Decodes the JSON printed by `terraform output -json`.
///
/// Outputs that are absent decode as empty values; unrelated outputs are
/// ignored.
///
/// # Errors
///
/// Returns [`OutputParseError`] when the document is not valid JSON or an
/// expected output has the wrong shape.
pub fn parse_output(json: &str) -> Result<InfrastructureSnapshot, OutputParseError> {
    let raw: RawOutputs =
        serde_json::from_str(json).map_err(|source| OutputParseError { source })?;
    Ok(InfrastructureSnapshot {
        bastion_public_ip: raw.bastion_public_ip.value,
        master_nodes_private_ips: raw.master_nodes_private_ip.value,
        cluster_nodes_private_ips: raw.cluster_nodes_private_ip.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const VALID_OUTPUT: &str = r#"{
        "bastion_public_ip": {"sensitive": false, "type": "string", "value": "34.244.109.234"},
        "cluster_nodes_private_ip": {"sensitive": false, "type": ["tuple", ["string"]], "value": ["172.31.2.19"]},
        "master_nodes_private_ip": {"sensitive": false, "type": ["tuple", ["string"]], "value": ["172.31.2.167"]}
    }"#;

    fn snapshot(bastion: &str, masters: &[&str], nodes: &[&str]) -> InfrastructureSnapshot {
        InfrastructureSnapshot {
            bastion_public_ip: bastion.to_owned(),
            master_nodes_private_ips: masters.iter().map(|ip| (*ip).to_owned()).collect(),
            cluster_nodes_private_ips: nodes.iter().map(|ip| (*ip).to_owned()).collect(),
        }
    }

    #[test]
    fn empty_snapshot_is_not_usable() {
        assert!(!InfrastructureSnapshot::default().is_usable());
    }

    #[rstest]
    #[case::bastion_only(snapshot("127.0.0.1", &[], &[]), false)]
    #[case::no_bastion(snapshot("", &["10.0.0.1"], &["10.0.0.2", "10.0.0.3"]), false)]
    #[case::no_master(snapshot("127.0.0.1", &[], &["10.0.0.2", "10.0.0.3"]), false)]
    #[case::one_node(snapshot("127.0.0.1", &["10.0.0.1"], &["10.0.0.2"]), false)]
    #[case::two_nodes(snapshot("127.0.0.1", &["10.0.0.1"], &["10.0.0.2", "10.0.0.3"]), true)]
    #[case::three_nodes(
        snapshot("127.0.0.1", &["10.0.0.1"], &["10.0.0.2", "10.0.0.3", "10.0.0.4"]),
        true
    )]
    fn usability_requires_bastion_master_and_two_nodes(
        #[case] input: InfrastructureSnapshot,
        #[case] expected: bool,
    ) {
        assert_eq!(input.is_usable(), expected);
    }

    #[test]
    fn parse_output_extracts_named_values() {
        let parsed = parse_output(VALID_OUTPUT).expect("valid output should parse");

        assert_eq!(
            parsed,
            snapshot("34.244.109.234", &["172.31.2.167"], &["172.31.2.19"])
        );
        assert!(!parsed.is_usable());
    }

    #[test]
    fn parse_output_preserves_array_order() {
        let json = r#"{"cluster_nodes_private_ip": {"value": ["10.0.0.9", "10.0.0.3", "10.0.0.5"]}}"#;
        let parsed = parse_output(json).expect("parse");
        assert_eq!(
            parsed.cluster_nodes_private_ips,
            vec!["10.0.0.9", "10.0.0.3", "10.0.0.5"]
        );
    }

    #[rstest]
    #[case::empty_object("{}")]
    #[case::unrelated_outputs(r#"{"vpc_id": {"value": "vpc-123"}}"#)]
    #[case::missing_value(r#"{"bastion_public_ip": {"sensitive": false}}"#)]
    fn parse_output_treats_missing_outputs_as_empty(#[case] json: &str) {
        let parsed = parse_output(json).expect("parse");
        assert_eq!(parsed, InfrastructureSnapshot::default());
    }

    #[rstest]
    #[case::not_json("Error: no state")]
    #[case::empty("")]
    #[case::wrong_shape(r#"{"master_nodes_private_ip": {"value": "10.0.0.1"}}"#)]
    fn parse_output_rejects_malformed_documents(#[case] json: &str) {
        let err = parse_output(json).expect_err("malformed output should fail");
        assert!(err.to_string().starts_with("failed to parse terraform output"));
    }

    #[test]
    fn display_marks_usability() {
        let rendered = snapshot("1.2.3.4", &["10.0.0.1"], &["10.0.0.2", "10.0.0.3"]).to_string();
        assert!(rendered.contains("bastion: 1.2.3.4"));
        assert!(rendered.ends_with("usable:  yes"));
    }
}
