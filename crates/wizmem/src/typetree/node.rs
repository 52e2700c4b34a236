//! Locating and walking the descriptor hash tree.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::Result;
use crate::hook::registry::HookRegistry;
use crate::memory::process::ProcessAccess;
use crate::memory::read::MemoryExt;
use crate::memory::scan::{Pattern, ScanScope, pattern_scan};
use crate::typetree::types::HashNode;

/// The call into the tree-lookup routine; its displacement chain leads to
/// the slot holding the tree root.
pub const TREE_CALL_PATTERN: &str = "E8 ?? ?? ?? ?? 48 3B 18 74 12";

/// Resolve the address of the tree's root holder.
///
/// Two chained relative displacements: the `call` at the pattern match
/// gives the lookup routine; 50 bytes into that routine a rip-relative
/// `mov` (7 bytes, displacement at +53) gives the storage slot.
pub fn root_holder_address<A: ProcessAccess + Sync>(access: &A, module: &str) -> Result<u64> {
    let pattern = Pattern::parse(TREE_CALL_PATTERN)?;
    let call_site = pattern_scan(access, &pattern, ScanScope::Module(module))?;

    let call_disp = access.read_value::<i32>(call_site + 1)?;
    // 5 is the length of the call instruction.
    let routine = call_site.wrapping_add_signed(call_disp as i64 + 5);

    let slot_disp = access.read_value::<i32>(routine + 53)?;
    // The mov starts 50 bytes into the routine and is 7 bytes long.
    let slot = routine.wrapping_add_signed(50 + slot_disp as i64 + 7);

    let holder = access.read_value::<u64>(slot)?;
    debug!("type tree root holder at {holder:#x} (slot {slot:#x})");
    Ok(holder)
}

/// Every node of the tree, each exactly once.
///
/// The tree is threaded (leaf child pointers point back into the tree), so
/// traversal descends only below non-leaf nodes and keeps a visited set
/// keyed by node address; it terminates on any shape, cycles included.
pub fn collect_nodes<'a, A: ProcessAccess + Sync>(
    registry: &'a HookRegistry<'a, A>,
    module: &str,
) -> Result<Vec<HashNode<'a, A>>> {
    let access = registry.access();
    let holder = root_holder_address(access, module)?;

    let root_address = access.read_value::<u64>(holder)?;
    let root = HashNode::new(registry, root_address)?;

    // The holder's node is a sentinel; its parent is the real tree top.
    let Some(start) = root.parent()? else {
        return Ok(Vec::new());
    };

    let mut visited: HashSet<u64> = HashSet::new();
    let mut stack = vec![start];
    let mut nodes = Vec::new();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.address()?) {
            continue;
        }

        if !node.is_leaf()? {
            if let Some(left) = node.left()? {
                stack.push(left);
            }
            if let Some(right) = node.right()? {
                stack.push(right);
            }
        }

        nodes.push(node);
    }

    debug!("collected {} type tree nodes", nodes.len());
    Ok(nodes)
}

/// Class name → owning node, for every non-leaf node with a descriptor.
pub fn type_map<'a, A: ProcessAccess + Sync>(
    registry: &'a HookRegistry<'a, A>,
    module: &str,
) -> Result<HashMap<String, HashNode<'a, A>>> {
    let mut map = HashMap::new();

    for node in collect_nodes(registry, module)? {
        if node.is_leaf()? {
            continue;
        }
        if let Some(data) = node.node_data()? {
            map.insert(data.name()?, node);
        }
    }

    Ok(map)
}
