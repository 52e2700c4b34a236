//! Synthetic type tree used across the typetree tests.

use crate::hook::descriptor::CLIENT_MODULE;
use crate::hook::registry::HookRegistry;
use crate::memory::mock::MockMemory;
use crate::memory::process::ProcessAccess;

const BASE: u64 = 0x1_4000_0000;

// Module-relative layout.
const CALL_SITE: u64 = 0x100;
const ROUTINE: u64 = 0x200;
const SLOT: u64 = 0x300;
const HOLDER: u64 = 0x310;
const NODE_ROOT: u64 = 0x400;
const NODE_A: u64 = 0x440;
const NODE_B: u64 = 0x480;
const NODE_C: u64 = 0x4C0;
const NODE_D: u64 = 0x500;
const TYPE_A: u64 = 0x800;
const TYPE_BASE: u64 = 0x900;
const PLIST_A: u64 = 0xA00;
const PLIST_BASE: u64 = 0xB00;
const PROP_BLOCKS: u64 = 0xC00;
const CONTAINER: u64 = 0xE00;
const CONTAINER_VTABLE: u64 = 0xE40;
const CONTAINER_NAME_FN: u64 = 0xE80;
const CONTAINER_DYNAMIC_FN: u64 = 0xEA0;
const CONTAINER_NAME: u64 = 0xEC0;
const NAME_LOCATION: u64 = 0xF00;
const NAME_STATE: u64 = 0xF20;
const PROP_LOCATION: u64 = 0x1000;
const PROP_STATE: u64 = 0x1100;
const ENUM_RECORDS: u64 = 0x1200;

/// A fake client image holding a four-node tree:
///
/// ```text
///   sentinel.parent -> A { ClientObject }
///   A.left  = B { CoreObject },  A.right = C { no data }
///   B.right = D (leaf),          C.left  = D (second path to D)
///   D.left  = A, D.right = B     (threaded back-pointers)
/// ```
///
/// `ClientObject` carries a property list with two fields: `m_location`
/// (offset 88, shared-pointer container) and `m_state` (enum with options
/// idle=0, active=2), and a base-class chain to `CoreObject`.
pub struct TreeFixture {
    pub mock: MockMemory,
    pub root_holder: u64,
}

impl TreeFixture {
    pub const MODULE: &'static str = CLIENT_MODULE;

    pub fn registry(&self) -> HookRegistry<'_, MockMemory> {
        HookRegistry::new(&self.mock)
    }

    pub fn node_addresses(&self) -> Vec<u64> {
        vec![BASE + NODE_A, BASE + NODE_B, BASE + NODE_C, BASE + NODE_D]
    }

    pub fn build() -> Self {
        let mock = MockMemory::builder()
            .module(Self::MODULE, BASE, vec![0u8; 0x4000])
            .build();

        let w64 = |rel: u64, value: u64| {
            mock.write_bytes(BASE + rel, &value.to_le_bytes()).unwrap();
        };
        let w32 = |rel: u64, value: i32| {
            mock.write_bytes(BASE + rel, &value.to_le_bytes()).unwrap();
        };
        let w8 = |rel: u64, value: u8| {
            mock.write_bytes(BASE + rel, &[value]).unwrap();
        };
        let wbytes = |rel: u64, bytes: &[u8]| {
            mock.write_bytes(BASE + rel, bytes).unwrap();
        };
        // An inline std::string: data in the buffer, length at +0x10.
        let wstring = |rel: u64, text: &str| {
            mock.write_bytes(BASE + rel, text.as_bytes()).unwrap();
            mock.write_bytes(BASE + rel + 0x10, &(text.len() as i32).to_le_bytes())
                .unwrap();
        };

        // Call site: E8 <disp> 48 3B 18 74 12, landing on ROUTINE.
        wbytes(CALL_SITE, &[0xE8]);
        w32(CALL_SITE + 1, (ROUTINE - (CALL_SITE + 5)) as i32);
        wbytes(CALL_SITE + 5, &[0x48, 0x3B, 0x18, 0x74, 0x12]);

        // Displacement at ROUTINE+53 leads to SLOT.
        w32(ROUTINE + 53, (SLOT as i64 - (ROUTINE + 57) as i64) as i32);
        w64(SLOT, BASE + HOLDER);
        w64(HOLDER, BASE + NODE_ROOT);

        // Nodes: left +0x00, parent +0x08, right +0x10, leaf +0x19,
        // hash +0x20, data +0x28.
        w64(NODE_ROOT + 0x08, BASE + NODE_A);

        w64(NODE_A, BASE + NODE_B);
        w64(NODE_A + 0x10, BASE + NODE_C);
        w32(NODE_A + 0x20, 1);
        w64(NODE_A + 0x28, BASE + TYPE_A);

        w64(NODE_B + 0x10, BASE + NODE_D);
        w32(NODE_B + 0x20, 2);
        w64(NODE_B + 0x28, BASE + TYPE_BASE);

        w64(NODE_C, BASE + NODE_D);
        w32(NODE_C + 0x20, 3);

        // D is a leaf whose child pointers thread back into the tree.
        w64(NODE_D, BASE + NODE_A);
        w64(NODE_D + 0x10, BASE + NODE_B);
        w8(NODE_D + 0x19, 1);
        w32(NODE_D + 0x20, 4);

        // ClientObject type descriptor.
        wstring(TYPE_A + 0x38, "ClientObject");
        w32(TYPE_A + 0x58, 0x1234);
        w32(TYPE_A + 0x60, 0x2A8);
        w64(TYPE_A + 0x90, BASE + PLIST_A);

        // CoreObject type descriptor, no property list.
        wstring(TYPE_BASE + 0x38, "CoreObject");
        w32(TYPE_BASE + 0x58, 0x99);
        w32(TYPE_BASE + 0x60, 0x58);

        // ClientObject's property list.
        w8(PLIST_A + 0x09, 1); // singleton
        w64(PLIST_A + 0x18, BASE + PLIST_BASE);
        w64(PLIST_A + 0x20, BASE + TYPE_A);
        w64(PLIST_A + 0x58, BASE + PROP_BLOCKS);
        w64(PLIST_A + 0x60, BASE + PROP_BLOCKS + 0x20);
        wstring(PLIST_A + 0xB8, "Props");

        // Base property list pointing at CoreObject.
        w64(PLIST_BASE + 0x20, BASE + TYPE_BASE);

        // Two shared-pointer control blocks.
        w64(PROP_BLOCKS, BASE + PROP_LOCATION);
        w64(PROP_BLOCKS + 0x10, BASE + PROP_STATE);

        // m_location: offset 88, shared-pointer container.
        w64(PROP_LOCATION + 0x38, BASE + PLIST_A);
        w64(PROP_LOCATION + 0x40, BASE + CONTAINER);
        w32(PROP_LOCATION + 0x50, 0);
        w64(PROP_LOCATION + 0x58, BASE + NAME_LOCATION);
        w32(PROP_LOCATION + 0x60, 0x111);
        w32(PROP_LOCATION + 0x64, 0x222);
        w32(PROP_LOCATION + 0x68, 88);
        w64(PROP_LOCATION + 0x70, BASE + TYPE_BASE);
        w32(PROP_LOCATION + 0x80, 7);

        // m_state: enum options idle=0, active=2.
        w64(PROP_STATE + 0x38, BASE + PLIST_A);
        w32(PROP_STATE + 0x50, 1);
        w64(PROP_STATE + 0x58, BASE + NAME_STATE);
        w32(PROP_STATE + 0x68, 0x120);
        w32(PROP_STATE + 0x80, 3);
        w64(PROP_STATE + 0x98, BASE + ENUM_RECORDS);
        w64(PROP_STATE + 0xA0, BASE + ENUM_RECORDS + 2 * 0x48);

        w32(ENUM_RECORDS + 0x20, 0);
        wstring(ENUM_RECORDS + 0x28, "idle");
        w32(ENUM_RECORDS + 0x48 + 0x20, 2);
        wstring(ENUM_RECORDS + 0x48 + 0x28, "active");

        wbytes(NAME_LOCATION, b"m_location\0");
        wbytes(NAME_STATE, b"m_state\0");

        // Container vtable: slot 1 = name getter, slot 4 = dynamic getter.
        w64(CONTAINER, BASE + CONTAINER_VTABLE);
        w64(CONTAINER_VTABLE + 0x08, BASE + CONTAINER_NAME_FN);
        w64(CONTAINER_VTABLE + 0x20, BASE + CONTAINER_DYNAMIC_FN);

        // lea rax, [rip + disp]; name literal behind it.
        wbytes(CONTAINER_NAME_FN, &[0x48, 0x8D, 0x05]);
        w32(
            CONTAINER_NAME_FN + 3,
            (CONTAINER_NAME as i64 - (CONTAINER_NAME_FN + 7) as i64) as i32,
        );
        wbytes(CONTAINER_NAME, b"SharedPointer\0");

        // mov al, 1; ret.
        wbytes(CONTAINER_DYNAMIC_FN, &[0xB0, 0x01, 0xC3]);

        Self {
            mock,
            root_holder: BASE + HOLDER,
        }
    }
}
