//! Shared cave region carved from an existing client function.
//!
//! Instead of one remote allocation per hook cave, all hooks share a single
//! region inside a function the client never runs during play (located by
//! pattern, like everything else). The region is zeroed on first use, handed
//! out as sequential slices, and its original bytes are written back once
//! the last hook releases it.

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::process::ProcessAccess;
use crate::memory::scan::{Pattern, ScanScope, pattern_scan};

/// Pattern over the donor function's prologue.
pub const AUTOBOT_PATTERN: &str = "48 8B C4 55 41 54 41 55 41 56 41 57 ?? ?? ?? ?? ?? ?? ?? \
     48 ?? ?? ?? ?? ?? ?? 48 ?? ?? ?? ?? ?? ?? ?? 48 89 58 10 48 89 70 18 48 89 78 20 \
     ?? ?? ?? ?? ?? ?? ?? 48 33 C4 ?? ?? ?? ?? ?? ?? ?? 4C 8B E9 ?? ?? ?? ?? ?? ?? ?? 80";

/// Usable bytes of the donor function, rounded down.
pub const AUTOBOT_SIZE: usize = 3_900;

/// The shared region while at least one hook is using it.
#[derive(Debug)]
pub struct AutobotRegion {
    address: u64,
    original: Vec<u8>,
    position: usize,
    users: usize,
}

impl AutobotRegion {
    /// Locate the donor function, record its bytes, and zero it so stale
    /// instructions cannot collide with freshly written caves.
    pub fn prepare<A: ProcessAccess + Sync>(access: &A, module: &str) -> Result<Self> {
        let pattern = Pattern::parse(AUTOBOT_PATTERN)?;
        let address = pattern_scan(access, &pattern, ScanScope::Module(module))?;

        let original = access.read_bytes(address, AUTOBOT_SIZE)?;
        access.write_bytes(address, &vec![0u8; AUTOBOT_SIZE])?;

        debug!("prepared shared cave region at {address:#x}");

        Ok(Self {
            address,
            original,
            position: 0,
            users: 0,
        })
    }

    /// Claim the next `size` bytes for a cave.
    pub fn claim(&mut self, size: usize) -> Result<u64> {
        if self.position + size > AUTOBOT_SIZE {
            return Err(Error::CaveExhausted {
                requested: size,
                remaining: AUTOBOT_SIZE - self.position,
            });
        }

        let address = self.address + self.position as u64;
        self.position += size;
        self.users += 1;

        debug!("claimed cave slice at {address:#x}; position is now {}", self.position);
        Ok(address)
    }

    /// Release one claim. Returns true when this was the last user and the
    /// donor function's bytes were restored.
    pub fn release<A: ProcessAccess>(&mut self, access: &A) -> Result<bool> {
        self.users = self.users.saturating_sub(1);
        if self.users > 0 {
            return Ok(false);
        }

        access.write_bytes(self.address, &self.original)?;
        self.position = 0;
        debug!("restored shared cave region");
        Ok(true)
    }

    pub fn users(&self) -> usize {
        self.users
    }
}
