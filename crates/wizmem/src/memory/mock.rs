//! In-memory stand-in for a target process, used by tests.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::memory::process::{ModuleInfo, ProcessAccess, Region, check_address};

const ALLOC_BASE: u64 = 0x5000_0000;

/// Fake target process: a sparse set of regions plus a recording allocator.
pub struct MockMemory {
    regions: Mutex<BTreeMap<u64, Vec<u8>>>,
    modules: HashMap<String, ModuleInfo>,
    main_module: Option<String>,
    allocations: Mutex<HashMap<u64, usize>>,
    next_alloc: Mutex<u64>,
    running: AtomicBool,
}

pub struct MockMemoryBuilder {
    regions: BTreeMap<u64, Vec<u8>>,
    modules: HashMap<String, ModuleInfo>,
    main_module: Option<String>,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            modules: HashMap::new(),
            main_module: None,
        }
    }

    pub fn region(mut self, base: u64, bytes: Vec<u8>) -> Self {
        self.regions.insert(base, bytes);
        self
    }

    /// Add a region and register it as a module spanning those bytes.
    pub fn module(mut self, name: &str, base: u64, bytes: Vec<u8>) -> Self {
        self.modules.insert(
            name.to_string(),
            ModuleInfo {
                name: name.to_string(),
                base,
                size: bytes.len() as u64,
                path: None,
            },
        );
        if self.main_module.is_none() {
            self.main_module = Some(name.to_string());
        }
        self.regions.insert(base, bytes);
        self
    }

    pub fn build(self) -> MockMemory {
        MockMemory {
            regions: Mutex::new(self.regions),
            modules: self.modules,
            main_module: self.main_module,
            allocations: Mutex::new(HashMap::new()),
            next_alloc: Mutex::new(ALLOC_BASE),
            running: AtomicBool::new(true),
        }
    }
}

impl MockMemory {
    pub fn builder() -> MockMemoryBuilder {
        MockMemoryBuilder::new()
    }

    /// Simulate the target going away.
    pub fn kill(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Addresses allocated through [`ProcessAccess::allocate`] that were
    /// never freed.
    pub fn live_allocations(&self) -> Vec<u64> {
        let mut addrs: Vec<u64> = self.allocations.lock().keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    fn locate(&self, address: u64, size: usize) -> Option<(u64, usize)> {
        let regions = self.regions.lock();
        let (&base, bytes) = regions.range(..=address).next_back()?;
        let offset = (address - base) as usize;
        if offset + size <= bytes.len() {
            Some((base, offset))
        } else {
            None
        }
    }
}

impl ProcessAccess for MockMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        check_address(address)?;
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::ProcessClosed);
        }

        let (base, offset) = self
            .locate(address, size)
            .ok_or(Error::MemoryRead { address, size })?;
        let regions = self.regions.lock();
        Ok(regions[&base][offset..offset + size].to_vec())
    }

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        check_address(address)?;
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::ProcessClosed);
        }

        let (base, offset) = self.locate(address, bytes.len()).ok_or(Error::MemoryWrite {
            address,
            size: bytes.len(),
        })?;
        let mut regions = self.regions.lock();
        let region = regions.get_mut(&base).expect("located region exists");
        region[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn allocate(&self, size: usize) -> Result<u64> {
        let mut next = self.next_alloc.lock();
        let address = *next;
        // Keep allocations page-separated so an overrun is caught.
        *next += ((size as u64).max(8)).next_multiple_of(0x1000);

        self.regions.lock().insert(address, vec![0u8; size]);
        self.allocations.lock().insert(address, size);
        Ok(address)
    }

    fn free(&self, address: u64) -> Result<()> {
        if self.allocations.lock().remove(&address).is_none() {
            return Err(Error::MemoryWrite { address, size: 0 });
        }
        self.regions.lock().remove(&address);
        Ok(())
    }

    fn regions(&self) -> Result<Vec<Region>> {
        Ok(self
            .regions
            .lock()
            .iter()
            .map(|(&base, bytes)| Region {
                base,
                size: bytes.len() as u64,
            })
            .collect())
    }

    fn module(&self, name: &str) -> Result<ModuleInfo> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    fn base_module(&self) -> Result<ModuleInfo> {
        let name = self
            .main_module
            .as_deref()
            .ok_or_else(|| Error::ModuleNotFound("<main module>".to_string()))?;
        self.module(name)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_roundtrip() {
        let mock = MockMemory::builder().region(0x1000, vec![0u8; 64]).build();

        mock.write_bytes(0x1010, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mock.read_bytes(0x1010, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unmapped_read_fails() {
        let mock = MockMemory::builder().region(0x1000, vec![0u8; 16]).build();

        assert!(matches!(
            mock.read_bytes(0x2000, 4),
            Err(Error::MemoryRead { .. })
        ));
        // Reads crossing the end of a region fail too.
        assert!(mock.read_bytes(0x100E, 4).is_err());
    }

    #[test]
    fn killed_process_reports_closed() {
        let mock = MockMemory::builder().region(0x1000, vec![0u8; 16]).build();
        mock.kill();

        assert!(matches!(
            mock.read_bytes(0x1000, 4),
            Err(Error::ProcessClosed)
        ));
        assert!(!mock.is_running());
    }

    #[test]
    fn allocator_records_and_frees() {
        let mock = MockMemory::builder().build();

        let a = mock.allocate(16).unwrap();
        let b = mock.allocate(16).unwrap();
        assert_ne!(a, b);
        assert_eq!(mock.live_allocations(), vec![a, b]);

        mock.free(a).unwrap();
        assert_eq!(mock.live_allocations(), vec![b]);
        assert!(mock.free(a).is_err());
    }
}
