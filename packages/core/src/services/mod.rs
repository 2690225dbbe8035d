//! Business Services
//!
//! This module contains the service layer callers talk to:
//!
//! - `HierarchyService` - Entity-type façade dispatching to the configured strategy
//! - `mapper` - Conversion of stored nodes into `NodeView` transfer records,
//!   including sub-tree assembly
//!
//! Services coordinate between the strategies and application code; they
//! hold no tree state of their own.

pub mod hierarchy_service;
pub mod mapper;

pub use hierarchy_service::HierarchyService;
pub use mapper::{build_tree, NodeView};
