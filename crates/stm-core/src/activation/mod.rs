//! Activation pipeline (spec §4.5, §4.6): turns free text into a ranked,
//! bounded-latency set of memories worth surfacing to an assistant.

pub mod index;
pub mod service;

pub use index::{build_activation_graph, ActivationGraph};
pub use service::ActivationService;
