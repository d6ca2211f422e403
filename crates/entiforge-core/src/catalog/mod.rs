//! Self-referential entity catalog.
//!
//! Entities, fields and pages are rows of a single table. Root entities own a
//! physical table; their field children become its columns.

mod node;
pub mod schema;
mod store;
mod types;
mod validate;

pub use node::{column_name, EntityNode, NewNode, NodeKind};
pub use store::{EntityDescriptor, EntityStore};
pub use types::{FieldType, PhysicalType, TypeMapper};
pub use validate::{check_table_name, ValidationError};

pub(crate) use store::{delete_all_except, insert_node, lookup_by_name};
