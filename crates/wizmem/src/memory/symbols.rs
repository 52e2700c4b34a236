//! Export-table symbol resolution.
//!
//! Parses a module's on-disk PE image once, caches the export map per file
//! path, and resolves names to absolute addresses via the live module base.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use goblin::pe::PE;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::process::ProcessAccess;

/// Cached export tables, keyed by image path.
#[derive(Default)]
pub struct SymbolCache {
    tables: Mutex<HashMap<PathBuf, HashMap<String, u32>>>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `symbol` exported by `module` to an absolute address in the
    /// target: live module base plus the export's RVA.
    pub fn address_of<A: ProcessAccess>(
        &self,
        access: &A,
        module: &str,
        symbol: &str,
    ) -> Result<u64> {
        let info = access.module(module)?;
        let path = info
            .path
            .as_deref()
            .ok_or_else(|| Error::ModuleNotFound(format!("{module} (no on-disk path)")))?;

        let rva = self.export_rva(path, module, symbol)?;
        Ok(info.base + rva as u64)
    }

    fn export_rva(&self, path: &Path, module: &str, symbol: &str) -> Result<u32> {
        let mut tables = self.tables.lock();

        if !tables.contains_key(path) {
            let table = load_exports(path)?;
            debug!(module, exports = table.len(), "parsed export table");
            tables.insert(path.to_path_buf(), table);
        }

        let table = &tables[path];
        table
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::SymbolNotFound {
                module: module.to_string(),
                symbol: symbol.to_string(),
            })
    }
}

fn load_exports(path: &Path) -> Result<HashMap<String, u32>> {
    let image = std::fs::read(path)?;
    let pe = PE::parse(&image).map_err(|e| Error::Pe(e.to_string()))?;

    let mut exports = HashMap::new();
    for export in &pe.exports {
        let Some(rva) = u32::try_from(export.rva).ok() else {
            continue;
        };
        match export.name {
            Some(name) => {
                exports.insert(name.to_string(), rva);
            }
            None => {
                exports.insert(format!("Ordinal {}", export.offset.unwrap_or(0)), rva);
            }
        }
    }

    Ok(exports)
}
