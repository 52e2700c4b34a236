pub mod dump;
pub mod node;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use dump::{ClassDump, ClassEntry, ContainerEntry, PropertyEntry};
pub use node::{TREE_CALL_PATTERN, collect_nodes, root_holder_address, type_map};
pub use types::{ContainerDef, HashNode, PropertyDef, PropertyListDef, TypeDef};
