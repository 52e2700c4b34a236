//! The hook controller: one instance owns every active hook.
//!
//! Activation is observably atomic: the jump-site write is the last mutation
//! of code the target executes, so any failure earlier in the protocol
//! leaves the target running unmodified. Deactivation restores the exact
//! bytes recorded at install time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hook::autobot::AutobotRegion;
use crate::hook::descriptor::{
    BytePatch, DescriptorSet, HookDescriptor, HookName, SiteLocator, builtin_descriptors,
};
use crate::hook::relocate::{self, Prologue};
use crate::memory::process::ProcessAccess;
use crate::memory::read::MemoryExt;
use crate::memory::scan::{ScanScope, pattern_scan};
use crate::memory::symbols::SymbolCache;

/// Fixed size of a cave slice; generously above any built-in cave.
const CAVE_SIZE: usize = 128;

/// Poll interval of [`HookRegistry::wait_for_ready`].
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on a readiness wait.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

fn claim_cave(autobot: &mut Option<AutobotRegion>) -> Result<u64> {
    match autobot {
        Some(region) => region.claim(CAVE_SIZE),
        None => Err(Error::CaveExhausted {
            requested: CAVE_SIZE,
            remaining: 0,
        }),
    }
}

/// One installed hook, with everything needed to reverse it.
#[derive(Debug)]
struct InstalledHook {
    site_address: u64,
    original_bytes: Vec<u8>,
    slot_address: u64,
    /// (address, original byte) for every toggled patch.
    patched_bytes: Vec<(u64, u8)>,
}

/// Process-wide hook table and cave allocator. Create exactly one per
/// target process and pass it by reference; dropping it without calling
/// [`close`](Self::close) leaves hooks installed.
pub struct HookRegistry<'a, A: ProcessAccess> {
    access: &'a A,
    descriptors: DescriptorSet,
    symbols: SymbolCache,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    autobot: Option<AutobotRegion>,
    active: HashMap<HookName, InstalledHook>,
}

impl<'a, A: ProcessAccess + Sync> HookRegistry<'a, A> {
    pub fn new(access: &'a A) -> Self {
        Self::with_descriptors(access, builtin_descriptors())
    }

    pub fn with_descriptors(access: &'a A, descriptors: DescriptorSet) -> Self {
        Self {
            access,
            descriptors,
            symbols: SymbolCache::new(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn access(&self) -> &'a A {
        self.access
    }

    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    fn lock_state(&self) -> parking_lot::MutexGuard<'_, RegistryState> {
        self.state.lock()
    }

    pub fn is_active(&self, name: HookName) -> bool {
        self.lock_state().active.contains_key(&name)
    }

    /// Install the named hook.
    ///
    /// Re-activating an active hook is a misuse error: a second install
    /// would overwrite the saved original bytes and make clean removal
    /// impossible.
    pub fn activate(&self, name: HookName) -> Result<()> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| Error::DescriptorMissing(name.to_string()))?
            .clone();

        let mut state = self.lock_state();
        if state.active.contains_key(&name) {
            return Err(Error::HookAlreadyActive(name.to_string()));
        }

        // Everything that can fail without touching the target comes first.
        let site_address = self.resolve_site(&descriptor.site)?;

        let prologue = if descriptor.relocate_originals {
            let window = self.access.read_bytes(site_address, relocate::decode_window())?;
            Some(relocate::decode_prologue(&window, site_address)?)
        } else {
            None
        };
        let consumed = prologue
            .as_ref()
            .map(|p| p.consumed)
            .unwrap_or(relocate::JUMP_SIZE);

        let original_bytes = self.access.read_bytes(site_address, consumed)?;

        // Shared cave region, prepared on the first hook that needs it.
        if state.autobot.is_none() {
            let module = self.client_module_of(&descriptor);
            state.autobot = Some(AutobotRegion::prepare(self.access, &module)?);
        }
        let cave_address = claim_cave(&mut state.autobot)?;

        match self.install(
            &descriptor,
            site_address,
            cave_address,
            prologue.as_ref(),
            &original_bytes,
        ) {
            Ok(installed) => {
                debug!(
                    "{name} hook active: site {site_address:#x}, cave {cave_address:#x}"
                );
                state.active.insert(name, installed);
                Ok(())
            }
            Err(e) => {
                // The site was never written, so the target is untouched;
                // give the cave slice back.
                let restored = match state.autobot.as_mut() {
                    Some(region) => region.release(self.access).unwrap_or(false),
                    None => false,
                };
                if restored {
                    state.autobot = None;
                }
                Err(e)
            }
        }
    }

    /// Build the cave and patch the site, in that order. Failure before the
    /// final site write leaves the target unmodified.
    fn install(
        &self,
        descriptor: &HookDescriptor,
        site_address: u64,
        cave_address: u64,
        prologue: Option<&Prologue>,
        original_bytes: &[u8],
    ) -> Result<InstalledHook> {
        let slot_address = self.access.allocate(descriptor.slot_size)?;

        let result = self.write_hook(
            descriptor,
            site_address,
            cave_address,
            prologue,
            slot_address,
        );

        match result {
            Ok(patched_bytes) => Ok(InstalledHook {
                site_address,
                original_bytes: original_bytes.to_vec(),
                slot_address,
                patched_bytes,
            }),
            Err(e) => {
                let _ = self.access.free(slot_address);
                Err(e)
            }
        }
    }

    fn write_hook(
        &self,
        descriptor: &HookDescriptor,
        site_address: u64,
        cave_address: u64,
        prologue: Option<&Prologue>,
        slot_address: u64,
    ) -> Result<Vec<(u64, u8)>> {
        let mut payload = descriptor.payload_bytes()?;
        payload[descriptor.slot_offset..descriptor.slot_offset + 8]
            .copy_from_slice(&slot_address.to_le_bytes());

        let (cave_bytes, consumed) = match prologue {
            Some(prologue) => (
                relocate::build_cave(&payload, prologue, cave_address, site_address)?,
                prologue.consumed,
            ),
            None => (payload, relocate::JUMP_SIZE),
        };

        if cave_bytes.len() > CAVE_SIZE {
            return Err(Error::CaveExhausted {
                requested: cave_bytes.len(),
                remaining: CAVE_SIZE,
            });
        }

        let site_patch = relocate::build_site_patch(site_address, cave_address, consumed)?;

        // Toggle bytes and cave first; the site jump is the last write, so
        // a failure anywhere earlier never leaves a dangling jump.
        let patched_bytes = self.apply_patches(&descriptor.patches)?;

        let written = self
            .access
            .write_bytes(cave_address, &cave_bytes)
            .and_then(|_| self.access.write_bytes(site_address, &site_patch));

        if let Err(e) = written {
            for &(address, original) in &patched_bytes {
                let _ = self.access.write_bytes(address, &[original]);
            }
            return Err(e);
        }

        Ok(patched_bytes)
    }

    fn apply_patches(&self, patches: &[BytePatch]) -> Result<Vec<(u64, u8)>> {
        let mut applied = Vec::with_capacity(patches.len());
        for patch in patches {
            let scope = match patch.module.as_deref() {
                Some(module) => ScanScope::Module(module),
                None => ScanScope::Process,
            };
            let address = pattern_scan(self.access, &patch.pattern, scope)?
                .wrapping_add_signed(patch.offset);

            let original = self.access.read_bytes(address, 1)?[0];
            self.access.write_bytes(address, &[patch.enabled])?;
            applied.push((address, original));
        }
        Ok(applied)
    }

    fn resolve_site(&self, site: &SiteLocator) -> Result<u64> {
        match site {
            SiteLocator::Pattern { pattern, module } => {
                let scope = match module.as_deref() {
                    Some(module) => ScanScope::Module(module),
                    None => ScanScope::Process,
                };
                pattern_scan(self.access, pattern, scope)
            }
            SiteLocator::Export { module, symbol } => {
                self.symbols.address_of(self.access, module, symbol)
            }
        }
    }

    /// The module whose body donates the shared cave region: the pattern
    /// module of this descriptor, falling back to the main executable.
    fn client_module_of(&self, descriptor: &HookDescriptor) -> String {
        match &descriptor.site {
            SiteLocator::Pattern {
                module: Some(module),
                ..
            } => module.clone(),
            _ => self
                .access
                .base_module()
                .map(|m| m.name)
                .unwrap_or_else(|_| crate::hook::descriptor::CLIENT_MODULE.to_string()),
        }
    }

    /// Remove the named hook, restoring the exact pre-activation bytes.
    pub fn deactivate(&self, name: HookName) -> Result<()> {
        let mut state = self.lock_state();
        let installed = state
            .active
            .remove(&name)
            .ok_or_else(|| Error::HookNotActive(name.to_string()))?;

        self.access
            .write_bytes(installed.site_address, &installed.original_bytes)?;

        for &(address, original) in &installed.patched_bytes {
            if let Err(e) = self.access.write_bytes(address, &[original]) {
                warn!("{name}: failed to restore toggled byte at {address:#x}: {e}");
            }
        }

        self.access.free(installed.slot_address)?;

        let restored = match state.autobot.as_mut() {
            Some(region) => region.release(self.access)?,
            None => false,
        };
        if restored {
            state.autobot = None;
        }

        debug!("{name} hook removed");
        Ok(())
    }

    /// The singleton address the named hook has captured.
    ///
    /// [`Error::HookNotActive`] if the hook was never installed;
    /// [`Error::HookNotReady`] if it is installed but the target has not
    /// executed the patched code path yet.
    pub fn base_address(&self, name: HookName) -> Result<u64> {
        let slot_address = self
            .lock_state()
            .active
            .get(&name)
            .map(|hook| hook.slot_address)
            .ok_or_else(|| Error::HookNotActive(name.to_string()))?;

        let value = self.access.read_value::<u64>(slot_address)?;
        if value == 0 {
            return Err(Error::HookNotReady(name.to_string()));
        }
        Ok(value)
    }

    /// Poll until the hook's slot is populated. Timing out does not roll
    /// back the hook; removal stays an explicit call.
    pub fn wait_for_ready(&self, name: HookName, timeout: Option<Duration>) -> Result<u64> {
        let deadline = Instant::now() + timeout.unwrap_or(DEFAULT_READY_TIMEOUT);

        loop {
            match self.base_address(name) {
                Err(Error::HookNotReady(_)) if Instant::now() < deadline => {
                    std::thread::sleep(READY_POLL_INTERVAL);
                }
                other => return other,
            }
        }
    }

    /// Feed the synthetic cursor position read by the mouseless hook.
    pub fn write_mouse_position(&self, x: i32, y: i32) -> Result<()> {
        let slot_address = self
            .lock_state()
            .active
            .get(&HookName::MouselessCursor)
            .map(|hook| hook.slot_address)
            .ok_or_else(|| Error::HookNotActive(HookName::MouselessCursor.to_string()))?;

        let mut packed = [0u8; 8];
        packed[..4].copy_from_slice(&x.to_le_bytes());
        packed[4..].copy_from_slice(&y.to_le_bytes());
        self.access.write_bytes(slot_address, &packed)
    }

    /// Deactivate everything and restore the shared cave region.
    pub fn close(&self) -> Result<()> {
        let names: Vec<HookName> = self.lock_state().active.keys().copied().collect();

        for name in names {
            if let Err(e) = self.deactivate(name) {
                warn!("failed to remove {name} hook during close: {e}");
            }
        }
        Ok(())
    }

    pub fn active_hooks(&self) -> Vec<HookName> {
        self.lock_state().active.keys().copied().collect()
    }
}
