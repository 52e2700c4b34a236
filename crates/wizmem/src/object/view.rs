//! Offset-addressed views over structures in the target.
//!
//! An [`ObjectView`] is a cheap, stateless handle: a base-address resolution
//! strategy plus the hook registry it resolves through. Field access is
//! always `(offset, type)` against the freshly resolved base, mirroring the
//! reverse-engineered struct layouts — if the client's layout drifts, the
//! offsets here read garbage, which is why [`maybe_read_type_name`] exists
//! as a sanity check before trusting a raw address.
//!
//! [`maybe_read_type_name`]: ObjectView::maybe_read_type_name

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hook::descriptor::HookName;
use crate::hook::registry::HookRegistry;
use crate::memory::process::ProcessAccess;
use crate::memory::read::{EnumRepr, MAX_SHARED_VECTOR, MemoryExt};
use crate::memory::scan::{Pattern, ScanScope, pattern_scan_all};
use crate::memory::value::MemValue;

/// A position or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Xyz {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// How an object finds its base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseResolver {
    /// A fixed address supplied at construction; never zero.
    Static(u64),
    /// The current singleton captured by the named hook, re-read on every
    /// access so the view tracks the live object.
    Singleton(HookName),
}

/// A typed window onto one object in the target.
pub struct ObjectView<'a, A: ProcessAccess> {
    registry: &'a HookRegistry<'a, A>,
    resolver: BaseResolver,
}

impl<'a, A: ProcessAccess> Clone for ObjectView<'a, A> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry,
            resolver: self.resolver,
        }
    }
}

impl<'a, A: ProcessAccess + Sync> ObjectView<'a, A> {
    /// View over a known address. A zero address is a programming error and
    /// fails here, not at first read.
    pub fn new_static(registry: &'a HookRegistry<'a, A>, address: u64) -> Result<Self> {
        if address == 0 {
            return Err(Error::ZeroBaseAddress);
        }
        Ok(Self {
            registry,
            resolver: BaseResolver::Static(address),
        })
    }

    /// View over the singleton captured by `name`.
    pub fn singleton(registry: &'a HookRegistry<'a, A>, name: HookName) -> Self {
        Self {
            registry,
            resolver: BaseResolver::Singleton(name),
        }
    }

    pub fn registry(&self) -> &'a HookRegistry<'a, A> {
        self.registry
    }

    pub fn resolver(&self) -> BaseResolver {
        self.resolver
    }

    /// The object's current base address.
    pub fn base_address(&self) -> Result<u64> {
        match self.resolver {
            BaseResolver::Static(address) => Ok(address),
            BaseResolver::Singleton(name) => self.registry.base_address(name),
        }
    }

    /// Identity: same resolved base address.
    pub fn same_object(&self, other: &Self) -> Result<bool> {
        Ok(self.base_address()? == other.base_address()?)
    }

    fn access(&self) -> &'a A {
        self.registry.access()
    }

    pub fn read_at<T: MemValue>(&self, offset: u64) -> Result<T> {
        let base = self.base_address()?;
        self.access().read_value(base + offset)
    }

    pub fn write_at<T: MemValue>(&self, offset: u64, value: T) -> Result<()> {
        let base = self.base_address()?;
        self.access().write_value(base + offset, value)
    }

    pub fn read_vector_at<T: MemValue>(&self, offset: u64, count: usize) -> Result<Vec<T>> {
        let base = self.base_address()?;
        self.access().read_vector(base + offset, count)
    }

    pub fn write_vector_at<T: MemValue>(&self, offset: u64, values: &[T]) -> Result<()> {
        let base = self.base_address()?;
        self.access().write_vector(base + offset, values)
    }

    pub fn read_xyz_at(&self, offset: u64) -> Result<Xyz> {
        let v = self.read_vector_at::<f32>(offset, 3)?;
        Ok(Xyz::new(v[0], v[1], v[2]))
    }

    pub fn write_xyz_at(&self, offset: u64, value: Xyz) -> Result<()> {
        self.write_vector_at(offset, &[value.x, value.y, value.z])
    }

    pub fn read_enum_at<E: EnumRepr>(&self, offset: u64) -> Result<E> {
        let base = self.base_address()?;
        self.access().read_enum(base + offset)
    }

    pub fn write_enum_at<E: EnumRepr>(&self, offset: u64, value: E) -> Result<()> {
        let base = self.base_address()?;
        self.access().write_enum(base + offset, value)
    }

    pub fn read_string_at(&self, offset: u64) -> Result<String> {
        let base = self.base_address()?;
        self.access().read_string(base + offset)
    }

    pub fn read_string_at_with_sso(&self, offset: u64, sso_size: usize) -> Result<String> {
        let base = self.base_address()?;
        self.access().read_string_with_sso(base + offset, sso_size)
    }

    pub fn write_string_at(&self, offset: u64, value: &str) -> Result<()> {
        let base = self.base_address()?;
        self.access().write_string(base + offset, value)
    }

    pub fn read_wide_string_at(&self, offset: u64) -> Result<String> {
        let base = self.base_address()?;
        self.access().read_wide_string(base + offset)
    }

    pub fn write_wide_string_at(&self, offset: u64, value: &str) -> Result<()> {
        let base = self.base_address()?;
        self.access().write_wide_string(base + offset, value)
    }

    pub fn read_shared_vector_at(&self, offset: u64) -> Result<Vec<u64>> {
        let base = self.base_address()?;
        self.access()
            .read_shared_vector(base + offset, MAX_SHARED_VECTOR)
    }

    pub fn read_dynamic_vector_at<T: MemValue>(&self, offset: u64) -> Result<Vec<T>> {
        let base = self.base_address()?;
        self.access().read_dynamic_vector(base + offset)
    }

    pub fn read_linked_list_at(&self, offset: u64) -> Result<Vec<u64>> {
        let base = self.base_address()?;
        self.access().read_linked_list(base + offset)
    }

    pub fn read_shared_linked_list_at(&self, offset: u64) -> Result<Vec<u64>> {
        let base = self.base_address()?;
        self.access().read_shared_linked_list(base + offset)
    }

    /// Every other instance sharing this object's vtable: reads the first
    /// machine word and scans the whole process for that exact value.
    pub fn find_other_instances(&self) -> Result<Vec<ObjectView<'a, A>>> {
        let vtable = self.read_at::<u64>(0)?;
        let pattern = Pattern::exact(&vtable.to_le_bytes());

        let hits = match pattern_scan_all(self.access(), &pattern, ScanScope::Process) {
            Ok(hits) => hits,
            Err(Error::PatternFailed(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        hits.into_iter()
            .map(|address| ObjectView::new_static(self.registry, address))
            .collect()
    }

    /// Best-effort read of the object's dynamic type name, used to verify
    /// that an address really has the expected layout. Follows the vtable to
    /// the first virtual function (through one indirecting `jmp` if
    /// present), then reads the class-name string literal referenced by the
    /// `lea` at a fixed offset inside that function. Returns `None` when any
    /// step fails; a missing name is expected for foreign layouts.
    pub fn maybe_read_type_name(&self) -> Option<String> {
        self.read_type_name().ok().filter(|name| !name.is_empty())
    }

    fn read_type_name(&self) -> Result<String> {
        let access = self.access();
        let vtable = self.read_at::<u64>(0)?;
        let get_class_name = access.read_value::<u64>(vtable)?;

        // Sometimes a thunk with a jmp, sometimes the function body itself.
        let maybe_jmp = access.read_bytes(get_class_name, 5)?;
        let function = if maybe_jmp[0] == 0xE9 {
            let offset = i32::from_le_bytes([maybe_jmp[1], maybe_jmp[2], maybe_jmp[3], maybe_jmp[4]]);
            // 5 is the length of the jmp itself.
            get_class_name.wrapping_add_signed(offset as i64 + 5)
        } else {
            get_class_name
        };

        // The lea sits 63 bytes into the function: 48 8D 0D <disp32>, with
        // rip taken at the following instruction (+7).
        let lea_instruction = function + 63;
        let rip_offset = access.read_value::<i32>(lea_instruction + 3)?;
        let name_address = lea_instruction.wrapping_add_signed(rip_offset as i64 + 7);

        // Class names run long (ClientShadowCreatureLevelTransition...).
        access.read_null_terminated_string(name_address, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::MockMemory;

    fn empty_registry(mock: &MockMemory) -> HookRegistry<'_, MockMemory> {
        HookRegistry::new(mock)
    }

    #[test]
    fn zero_base_address_fails_at_construction() {
        let mock = MockMemory::builder().build();
        let registry = empty_registry(&mock);

        assert!(matches!(
            ObjectView::new_static(&registry, 0),
            Err(Error::ZeroBaseAddress)
        ));
    }

    #[test]
    fn static_view_reads_fields() {
        let mock = MockMemory::builder().region(0x2000, vec![0u8; 0x100]).build();
        let registry = empty_registry(&mock);

        mock.write_value::<i32>(0x2000 + 0x58, 1234).unwrap();

        let view = ObjectView::new_static(&registry, 0x2000).unwrap();
        assert_eq!(view.read_at::<i32>(0x58).unwrap(), 1234);

        view.write_at::<i32>(0x58, 4321).unwrap();
        assert_eq!(mock.read_value::<i32>(0x2058).unwrap(), 4321);
    }

    #[test]
    fn singleton_view_without_hook_reports_not_active() {
        let mock = MockMemory::builder().build();
        let registry = empty_registry(&mock);

        let view = ObjectView::singleton(&registry, HookName::Player);
        assert!(matches!(
            view.base_address(),
            Err(Error::HookNotActive(_))
        ));
    }

    #[test]
    fn identity_is_resolved_base_equality() {
        let mock = MockMemory::builder().region(0x2000, vec![0u8; 0x40]).build();
        let registry = empty_registry(&mock);

        let a = ObjectView::new_static(&registry, 0x2000).unwrap();
        let b = ObjectView::new_static(&registry, 0x2000).unwrap();
        let c = ObjectView::new_static(&registry, 0x2020).unwrap();

        assert!(a.same_object(&b).unwrap());
        assert!(!a.same_object(&c).unwrap());
    }

    #[test]
    fn find_other_instances_scans_for_vtable() {
        let mut heap = vec![0u8; 0x200];
        let vtable = 0x1_4040_0000u64;
        heap[0x00..0x08].copy_from_slice(&vtable.to_le_bytes());
        heap[0x80..0x88].copy_from_slice(&vtable.to_le_bytes());
        heap[0x100..0x108].copy_from_slice(&(vtable + 8).to_le_bytes());

        let mock = MockMemory::builder().region(0x3000, heap).build();
        let registry = empty_registry(&mock);

        let known = ObjectView::new_static(&registry, 0x3000).unwrap();
        let instances = known.find_other_instances().unwrap();

        let addresses: Vec<u64> = instances
            .iter()
            .map(|view| view.base_address().unwrap())
            .collect();
        assert_eq!(addresses, vec![0x3000, 0x3080]);
    }

    #[test]
    fn type_name_resolves_through_vtable() {
        // Object at 0x6000 -> vtable at 0x7000 -> function at 0x8000 with a
        // jmp thunk to 0x8100; lea at 0x8100+63 references the name string.
        let mock = MockMemory::builder()
            .region(0x6000, vec![0u8; 0x40])
            .region(0x7000, vec![0u8; 0x40])
            .region(0x8000, vec![0u8; 0x400])
            .build();
        let registry = empty_registry(&mock);

        mock.write_value::<u64>(0x6000, 0x7000).unwrap();
        mock.write_value::<u64>(0x7000, 0x8000).unwrap();

        // jmp +0xFB: 0x8000 + 5 + 0xFB = 0x8100.
        mock.write_bytes(0x8000, &[0xE9, 0xFB, 0x00, 0x00, 0x00]).unwrap();

        // lea rcx, [rip + disp] at 0x8100+63; name at 0x8200.
        let lea = 0x8100u64 + 63;
        let disp = (0x8200 - (lea + 7)) as i32;
        mock.write_bytes(lea, &[0x48, 0x8D, 0x0D]).unwrap();
        mock.write_value::<i32>(lea + 3, disp).unwrap();
        mock.write_bytes(0x8200, b"ClientObject\0").unwrap();

        let view = ObjectView::new_static(&registry, 0x6000).unwrap();
        assert_eq!(view.maybe_read_type_name().as_deref(), Some("ClientObject"));
    }

    #[test]
    fn type_name_is_none_on_unreadable_vtable() {
        let mock = MockMemory::builder().region(0x6000, vec![0u8; 0x40]).build();
        let registry = empty_registry(&mock);

        // First word points nowhere readable.
        mock.write_value::<u64>(0x6000, 0x77_0000).unwrap();
        let view = ObjectView::new_static(&registry, 0x6000).unwrap();
        assert_eq!(view.maybe_read_type_name(), None);
    }
}
