pub mod error;
pub mod persist;
pub mod store;

pub use error::StoreError;
pub use store::{Edge, EdgeUpsert, GraphStats, GraphStore, Node, NodeUpsert};
