//! Hierarchy node and edge storage

pub mod store;

pub use store::{Edge, GraphMutation, GraphStore, MaintenanceEvent};
