//! Reconciliation services bridging the provider inventory and the
//! snapshot cache.

pub mod node_assembler;
pub mod transform;
pub mod updater;

pub use node_assembler::MeshNode;
pub use transform::{transform, EGRESS_ROUTE, INGRESS_NODE_ID, INGRESS_ROUTE};
pub use updater::Updater;
