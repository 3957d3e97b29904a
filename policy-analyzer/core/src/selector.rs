use crate::labels::{self, Labels};
use serde::{Deserialize, Serialize};

/// Selects entities of one scope (namespaces or pods) by exact name and/or
/// labels.
///
/// Either constraint may be absent; an absent constraint restricts nothing,
/// so the default value matches everything.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameLabelsSelector {
    name: Option<String>,
    labels: Option<labels::Selector>,
}

/// Selects workloads: the namespace half and the pod half must both match.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    pub namespaces: NameLabelsSelector,
    pub pods: NameLabelsSelector,
}

/// The names and labels of a pod, as evaluated against a [`Selector`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetPod {
    pub namespace: String,
    pub namespace_labels: Labels,
    pub name: String,
    pub labels: Labels,
}

// === NameLabelsSelector ===

impl NameLabelsSelector {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            labels: None,
        }
    }

    pub fn labels(labels: labels::Selector) -> Self {
        Self {
            name: None,
            labels: Some(labels),
        }
    }

    pub fn name_and_labels(name: impl Into<String>, labels: labels::Selector) -> Self {
        Self {
            name: Some(name.into()),
            labels: Some(labels),
        }
    }

    pub fn matches(&self, name: &str, labels: &Labels) -> bool {
        if self.name.as_deref().is_some_and(|n| n != name) {
            return false;
        }
        if let Some(selector) = self.labels.as_ref() {
            if !selector.matches(labels) {
                return false;
            }
        }
        true
    }

    /// A deterministic key identifying the constraint content; structurally
    /// identical selectors render byte-identical keys.
    ///
    /// An absent name renders as the empty string and an absent label
    /// selector as `null`, keeping "no constraint" distinct from "an empty
    /// constraint".
    pub fn primary_key(&self) -> String {
        let name = self.name.as_deref().unwrap_or("");
        let labels = self
            .labels
            .as_ref()
            .map(labels::Selector::canonical_key)
            .unwrap_or_else(|| "null".to_string());
        format!(r#"{{"Name":"{name}","Labels":{labels}}}"#)
    }
}

// === Selector ===

impl Selector {
    pub fn new(namespaces: NameLabelsSelector, pods: NameLabelsSelector) -> Self {
        Self { namespaces, pods }
    }

    /// The namespace half is evaluated first; the pod half is not consulted
    /// when it fails.
    pub fn matches(&self, pod: &TargetPod) -> bool {
        self.namespaces.matches(&pod.namespace, &pod.namespace_labels)
            && self.pods.matches(&pod.name, &pod.labels)
    }

    pub fn primary_key(&self) -> String {
        format!(
            r#"{{"Namespaces":{},"Pods":{}}}"#,
            self.namespaces.primary_key(),
            self.pods.primary_key()
        )
    }
}
