use anyhow::{anyhow, bail, Context, Result};
use k8s_openapi::{
    api::{
        core::v1::{Namespace, Pod},
        networking::v1::NetworkPolicyPeer,
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use netpol_analyzer_core::{
    labels,
    selector::{self, NameLabelsSelector, TargetPod},
};

/// Converts an API label selector into a matchable one.
///
/// This is the validation boundary: an unknown operator or an empty value
/// set for `In`/`NotIn` fails here, so evaluation never encounters a
/// malformed requirement.
pub fn selector(sel: LabelSelector) -> Result<labels::Selector> {
    let match_expressions = sel
        .match_expressions
        .map(|reqs| {
            reqs.into_iter()
                .map(|req| {
                    let operator = req
                        .operator
                        .parse::<labels::Operator>()
                        .with_context(|| format!("invalid requirement on key {}", req.key))?;
                    labels::Expression::new(req.key, operator, req.values.into_iter().flatten())
                })
                .collect::<Result<labels::Expressions>>()
        })
        .transpose()?;

    Ok(labels::Selector::new(sel.match_labels, match_expressions))
}

/// Builds a workload selector from a policy rule's peer.
///
/// A peer without a namespace selector is scoped to the policy's own
/// namespace by exact name; a missing pod selector selects all pods in
/// whatever namespaces matched.
pub fn peer_selector(policy_namespace: &str, peer: NetworkPolicyPeer) -> Result<selector::Selector> {
    if peer.ip_block.is_some() {
        bail!("ipBlock peers select networks, not workloads");
    }

    let namespaces = match peer.namespace_selector {
        Some(sel) => NameLabelsSelector::labels(
            selector(sel).context("invalid namespace selector")?,
        ),
        None => NameLabelsSelector::name(policy_namespace),
    };

    let pods = match peer.pod_selector {
        Some(sel) => {
            NameLabelsSelector::labels(selector(sel).context("invalid pod selector")?)
        }
        None => NameLabelsSelector::default(),
    };

    Ok(selector::Selector::new(namespaces, pods))
}

/// Snapshots a pod and its namespace into an evaluation target.
pub fn target_pod(ns: &Namespace, pod: &Pod) -> Result<TargetPod> {
    let namespace = ns
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow!("namespace has no name"))?;
    let name = pod
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow!("pod has no name"))?;

    Ok(TargetPod {
        namespace,
        namespace_labels: ns.metadata.labels.clone().unwrap_or_default().into(),
        name,
        labels: pod.metadata.labels.clone().unwrap_or_default().into(),
    })
}
