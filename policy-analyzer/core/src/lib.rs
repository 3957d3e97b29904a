#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod selector;

pub use self::{
    labels::Labels,
    selector::{NameLabelsSelector, Selector, TargetPod},
};
