//! Views over the client's own runtime type descriptors.
//!
//! The client registers every reflected class in a binary hash tree of
//! descriptor nodes. These views expose the descriptors at their real
//! offsets; they are read-only and exist to validate and regenerate the
//! offset tables the object model is built from.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::hook::registry::HookRegistry;
use crate::memory::process::ProcessAccess;
use crate::memory::read::MemoryExt;
use crate::object::view::ObjectView;

/// Longest property name the bounded reads will follow.
const MAX_PROPERTY_NAME: usize = 100;

/// Longest container name.
const MAX_CONTAINER_NAME: usize = 50;

/// Stride of one enum-option record.
const ENUM_OPTION_SIZE: u64 = 0x48;

macro_rules! child_view {
    ($self:ident, $offset:expr, $ty:ident) => {{
        let addr = $self.view.read_at::<u64>($offset)?;
        if addr == 0 {
            Ok(None)
        } else {
            Ok(Some($ty {
                view: ObjectView::new_static($self.view.registry(), addr)?,
            }))
        }
    }};
}

/// One node of the descriptor hash tree.
pub struct HashNode<'a, A: ProcessAccess> {
    view: ObjectView<'a, A>,
}

impl<'a, A: ProcessAccess + Sync> HashNode<'a, A> {
    pub fn new(registry: &'a HookRegistry<'a, A>, address: u64) -> Result<Self> {
        Ok(Self {
            view: ObjectView::new_static(registry, address)?,
        })
    }

    pub fn address(&self) -> Result<u64> {
        self.view.base_address()
    }

    pub fn left(&self) -> Result<Option<HashNode<'a, A>>> {
        child_view!(self, 0x0, HashNode)
    }

    pub fn parent(&self) -> Result<Option<HashNode<'a, A>>> {
        child_view!(self, 0x8, HashNode)
    }

    pub fn right(&self) -> Result<Option<HashNode<'a, A>>> {
        child_view!(self, 0x10, HashNode)
    }

    pub fn is_leaf(&self) -> Result<bool> {
        self.view.read_at::<bool>(0x19)
    }

    pub fn hash(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x20)
    }

    /// The type this node owns, absent on leaves.
    pub fn node_data(&self) -> Result<Option<TypeDef<'a, A>>> {
        child_view!(self, 0x28, TypeDef)
    }
}

/// A class descriptor.
pub struct TypeDef<'a, A: ProcessAccess> {
    view: ObjectView<'a, A>,
}

impl<'a, A: ProcessAccess + Sync> TypeDef<'a, A> {
    pub fn new(registry: &'a HookRegistry<'a, A>, address: u64) -> Result<Self> {
        Ok(Self {
            view: ObjectView::new_static(registry, address)?,
        })
    }

    pub fn address(&self) -> Result<u64> {
        self.view.base_address()
    }

    pub fn name(&self) -> Result<String> {
        self.view.read_string_at(0x38)
    }

    pub fn hash(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x58)
    }

    pub fn size(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x60)
    }

    /// The mangled secondary name.
    pub fn name_2(&self) -> Result<String> {
        self.view.read_string_at(0x68)
    }

    pub fn is_pointer(&self) -> Result<bool> {
        self.view.read_at::<bool>(0x88)
    }

    pub fn is_ref(&self) -> Result<bool> {
        self.view.read_at::<bool>(0x89)
    }

    pub fn property_list(&self) -> Result<Option<PropertyListDef<'a, A>>> {
        child_view!(self, 0x90, PropertyListDef)
    }

    /// The inheritance chain, most-derived first, recovered by walking the
    /// base-class pointers to null.
    pub fn bases(&self) -> Result<Vec<PropertyListDef<'a, A>>> {
        let Some(list) = self.property_list()? else {
            return Ok(Vec::new());
        };

        let mut bases = Vec::new();
        let mut current = list;
        while let Some(base) = current.base_class_list()? {
            bases.push(PropertyListDef {
                view: base.view.clone(),
            });
            current = base;
        }
        Ok(bases)
    }
}

/// The field table of one class.
pub struct PropertyListDef<'a, A: ProcessAccess> {
    view: ObjectView<'a, A>,
}

impl<'a, A: ProcessAccess + Sync> PropertyListDef<'a, A> {
    pub fn is_singleton(&self) -> Result<bool> {
        self.view.read_at::<bool>(0x9)
    }

    /// Declared offset of this class's fields within the full object.
    pub fn offset(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x10)
    }

    pub fn base_class_list(&self) -> Result<Option<PropertyListDef<'a, A>>> {
        child_view!(self, 0x18, PropertyListDef)
    }

    pub fn owner_type(&self) -> Result<Option<TypeDef<'a, A>>> {
        child_view!(self, 0x20, TypeDef)
    }

    pub fn pointer_version(&self) -> Result<Option<TypeDef<'a, A>>> {
        child_view!(self, 0x30, TypeDef)
    }

    pub fn properties(&self) -> Result<Vec<PropertyDef<'a, A>>> {
        let mut properties = Vec::new();
        for address in self.view.read_shared_vector_at(0x58)? {
            properties.push(PropertyDef {
                view: ObjectView::new_static(self.view.registry(), address)?,
            });
        }
        Ok(properties)
    }

    pub fn name(&self) -> Result<String> {
        self.view.read_string_at_with_sso(0xB8, 10)
    }
}

/// One reflected field.
pub struct PropertyDef<'a, A: ProcessAccess> {
    view: ObjectView<'a, A>,
}

impl<'a, A: ProcessAccess + Sync> PropertyDef<'a, A> {
    pub fn parent_list(&self) -> Result<Option<PropertyListDef<'a, A>>> {
        child_view!(self, 0x38, PropertyListDef)
    }

    pub fn container(&self) -> Result<Option<ContainerDef<'a, A>>> {
        child_view!(self, 0x40, ContainerDef)
    }

    pub fn index(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x50)
    }

    /// The field name, read through a pointer with a bounded scan.
    pub fn name(&self) -> Result<Option<String>> {
        let address = self.view.read_at::<u64>(0x58)?;
        if address == 0 {
            return Ok(None);
        }
        self.view
            .registry()
            .access()
            .read_null_terminated_string(address, MAX_PROPERTY_NAME)
            .map(Some)
    }

    pub fn name_hash(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x60)
    }

    pub fn full_hash(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x64)
    }

    /// Byte offset of the field within its class.
    pub fn offset(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x68)
    }

    pub fn type_def(&self) -> Result<Option<TypeDef<'a, A>>> {
        child_view!(self, 0x70, TypeDef)
    }

    pub fn flags(&self) -> Result<i32> {
        self.view.read_at::<i32>(0x80)
    }

    pub fn note(&self) -> Result<String> {
        self.view.read_string_at(0x88)
    }

    pub fn ps_info(&self) -> Result<String> {
        self.view.read_string_at(0x90)
    }

    /// The name → value table of an enum-typed field: fixed-size records
    /// between two bounding pointers. `None` when the field is not an enum.
    pub fn enum_options(&self) -> Result<Option<BTreeMap<String, i32>>> {
        let start = self.view.read_at::<u64>(0x98)?;
        if start == 0 {
            return Ok(None);
        }
        let end = self.view.read_at::<u64>(0xA0)?;
        if end <= start {
            return Ok(None);
        }

        let access = self.view.registry().access();
        let mut options = BTreeMap::new();
        let mut current = start;
        for _ in 0..(end - start) / ENUM_OPTION_SIZE {
            let value = access.read_value::<i32>(current + 0x20)?;
            let name = access.read_string(current + 0x28)?;
            options.insert(name, value);
            current += ENUM_OPTION_SIZE;
        }

        Ok(Some(options))
    }
}

/// A field's container descriptor (value, pointer, growable vector...).
///
/// The container object carries no data fields; both its name and its
/// dynamic flag are recovered from the bodies of its virtual functions.
pub struct ContainerDef<'a, A: ProcessAccess> {
    view: ObjectView<'a, A>,
}

impl<'a, A: ProcessAccess + Sync> ContainerDef<'a, A> {
    /// Container name, from the `lea` at the start of the second virtual
    /// function's body.
    pub fn name(&self) -> Result<String> {
        let access = self.view.registry().access();
        let vtable = self.view.read_at::<u64>(0x0)?;
        let name_fn = access.read_value::<u64>(vtable + 0x8)?;

        // 48 8D 05 <disp32>: rip-relative lea, 7 bytes total.
        let disp = access.read_value::<i32>(name_fn + 3)?;
        let name_address = name_fn.wrapping_add_signed(disp as i64 + 7);

        access.read_null_terminated_string(name_address, MAX_CONTAINER_NAME)
    }

    /// Whether the container grows (vector-like rather than fixed).
    pub fn is_dynamic(&self) -> Result<bool> {
        let access = self.view.registry().access();
        let vtable = self.view.read_at::<u64>(0x0)?;
        let dynamic_fn = access.read_value::<u64>(vtable + 0x20)?;

        // The getter body is `mov al, imm8; ret`; the immediate is the flag.
        let flag = access.read_bytes(dynamic_fn + 1, 1)?;
        Ok(flag[0] == 1)
    }
}
