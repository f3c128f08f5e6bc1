//! Node Graph
//!
//! Typed node graph: nodes, ports, the link table, stream selections,
//! execution order, serialization, merge and layout.

mod layout;
mod models;
mod properties;
mod selector;
mod serialize;
mod store;
mod topology;

pub use layout::*;
pub use models::*;
pub use properties::*;
pub use selector::*;
pub use serialize::*;
pub use store::*;
