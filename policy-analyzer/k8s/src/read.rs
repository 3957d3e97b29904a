use anyhow::{bail, Context, Result};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::{debug, trace};

/// Reads network policies from a file, or from every file under a
/// directory tree.
///
/// Each file is parsed through a fallback chain: a `---`-separated stream
/// of policy documents, then a `NetworkPolicyList`, then a single policy.
/// A policy missing `spec.policyTypes` fails the whole read rather than
/// being silently dropped.
pub fn network_policies_from_path(path: impl AsRef<Path>) -> Result<Vec<NetworkPolicy>> {
    let mut policies = Vec::new();
    collect_from_path(path.as_ref(), &mut policies)?;

    for policy in &policies {
        let policy_types = policy
            .spec
            .as_ref()
            .and_then(|spec| spec.policy_types.as_deref())
            .unwrap_or_default();
        if policy_types.is_empty() {
            bail!(
                "missing spec.policyTypes from network policy {}/{}",
                policy.metadata.namespace.as_deref().unwrap_or_default(),
                policy.metadata.name.as_deref().unwrap_or_default(),
            );
        }
    }

    Ok(policies)
}

fn collect_from_path(path: &Path, policies: &mut Vec<NetworkPolicy>) -> Result<()> {
    if path.is_dir() {
        trace!(path = %path.display(), "walking directory");
        let entries = fs::read_dir(path)
            .with_context(|| format!("unable to walk path {}", path.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("unable to walk path {}", path.display()))?;
            collect_from_path(&entry.path(), policies)?;
        }
        return Ok(());
    }

    debug!(path = %path.display(), "reading policy file");
    let text = fs::read_to_string(path)
        .with_context(|| format!("unable to read file {}", path.display()))?;
    let parsed = parse_policies(&text)
        .with_context(|| format!("unable to parse policies from {}", path.display()))?;
    debug!(count = parsed.len(), path = %path.display(), "parsed policies");
    policies.extend(parsed);
    Ok(())
}

/// When every format fails, the error reports each attempted format's
/// failure rather than only the last one.
fn parse_policies(text: &str) -> Result<Vec<NetworkPolicy>> {
    let stream_err = match parse_document_stream(text) {
        Ok(policies) => return Ok(policies),
        Err(e) => e,
    };
    trace!(error = %stream_err, "not a policy document stream");

    let list_err = match serde_yaml::from_str::<k8s_openapi::List<NetworkPolicy>>(text) {
        Ok(list) => return Ok(list.items),
        Err(e) => e,
    };
    trace!(error = %list_err, "not a policy list");

    let single_err = match serde_yaml::from_str::<NetworkPolicy>(text) {
        Ok(policy) => return Ok(vec![policy]),
        Err(e) => e,
    };

    bail!(
        "not a policy document stream ({stream_err}), a policy list ({list_err}), or a single policy ({single_err})"
    );
}

fn parse_document_stream(text: &str) -> Result<Vec<NetworkPolicy>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_str(text)
        .map(NetworkPolicy::deserialize)
        .collect()
}
