#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The ingestion boundary: Kubernetes API objects come in, validated
//! matcher types go out.

mod convert;
mod read;

pub use self::{
    convert::{peer_selector, selector, target_pod},
    read::network_policies_from_path,
};
pub use k8s_openapi::api::{
    core::v1::{Namespace, Pod},
    networking::v1::{NetworkPolicy, NetworkPolicyPeer},
};
