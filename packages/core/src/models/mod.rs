//! Data Models
//!
//! This module contains the data structures shared by every strategy:
//!
//! - `Node` - The tree element (id, entity type, name, parent id)
//! - `EntityType` - Entity family tag (department, job, project, team)
//! - `NameRules` - Name constraints applied on create and update
//! - `PageRequest` / `Page` - Pagination and sorting of traversals

mod node;
mod page;

pub use node::{EntityType, NameRules, Node, ValidationError, DEFAULT_MAX_NAME_LENGTH};
pub use page::{Page, PageRequest, SortDirection, SortField, SortOrder};
