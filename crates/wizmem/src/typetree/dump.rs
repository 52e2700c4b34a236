//! Class/property dump for offline regeneration of offset tables.
//!
//! The dump is the bridge between a live walk and the modeled accessors:
//! when the client updates, a fresh dump is diffed against the declared
//! `(offset, type)` pairs instead of re-reversing every class by hand.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::hook::registry::HookRegistry;
use crate::memory::process::ProcessAccess;
use crate::typetree::node::collect_nodes;
use crate::typetree::types::{PropertyDef, TypeDef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub name: String,
    pub is_dynamic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub index: i32,
    pub offset: i32,
    pub hash: i32,
    pub flags: i32,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub container: Option<ContainerEntry>,
    pub enum_options: Option<BTreeMap<String, i32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    pub size: i32,
    pub hash: i32,
    pub is_pointer: bool,
    pub is_ref: bool,
    pub singleton: Option<bool>,
    pub offset: Option<i32>,
    /// Base-class chain, most-derived first.
    pub bases: Vec<String>,
    pub properties: BTreeMap<String, PropertyEntry>,
}

/// A full dump of the target's class registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDump {
    pub module: String,
    pub generated_at: DateTime<Utc>,
    pub classes: BTreeMap<String, ClassEntry>,
}

impl ClassDump {
    /// Walk the whole tree and dump every class descriptor.
    pub fn generate<A: ProcessAccess + Sync>(
        registry: &HookRegistry<'_, A>,
        module: &str,
    ) -> Result<Self> {
        let mut classes = BTreeMap::new();

        for node in collect_nodes(registry, module)? {
            if node.is_leaf()? {
                continue;
            }
            let Some(data) = node.node_data()? else {
                continue;
            };

            let name = data.name()?;
            if name.is_empty() {
                continue;
            }

            match class_entry(&data) {
                Ok(entry) => {
                    classes.insert(name, entry);
                }
                Err(e) => {
                    // One unreadable descriptor should not sink the dump.
                    warn!("skipping class {name}: {e}");
                }
            }
        }

        debug!("dumped {} classes from {module}", classes.len());
        Ok(Self {
            module: module.to_string(),
            generated_at: Utc::now(),
            classes,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn class_entry<A: ProcessAccess + Sync>(data: &TypeDef<'_, A>) -> Result<ClassEntry> {
    let mut entry = ClassEntry {
        size: data.size()?,
        hash: data.hash()?,
        is_pointer: data.is_pointer()?,
        is_ref: data.is_ref()?,
        singleton: None,
        offset: None,
        bases: Vec::new(),
        properties: BTreeMap::new(),
    };

    for base in data.bases()? {
        if let Some(base_type) = base.owner_type()? {
            entry.bases.push(base_type.name()?);
        }
    }

    let Some(list) = data.property_list()? else {
        return Ok(entry);
    };

    entry.singleton = Some(list.is_singleton()?);
    entry.offset = Some(list.offset()?);

    for property in list.properties()? {
        let Some(name) = property.name()? else {
            continue;
        };
        entry.properties.insert(name, property_entry(&property)?);
    }

    Ok(entry)
}

fn property_entry<A: ProcessAccess + Sync>(property: &PropertyDef<'_, A>) -> Result<PropertyEntry> {
    let type_name = match property.type_def()? {
        Some(type_def) => Some(type_def.name()?),
        None => None,
    };

    let container = match property.container()? {
        Some(container) => Some(ContainerEntry {
            name: container.name()?,
            is_dynamic: container.is_dynamic()?,
        }),
        None => None,
    };

    Ok(PropertyEntry {
        index: property.index()?,
        offset: property.offset()?,
        hash: property.full_hash()?,
        flags: property.flags()?,
        type_name,
        container,
        enum_options: property.enum_options()?,
    })
}
