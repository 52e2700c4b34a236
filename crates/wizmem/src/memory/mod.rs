pub mod process;
pub mod read;
pub mod scan;
pub mod symbols;
pub mod value;

#[cfg(test)]
pub mod mock;

pub use process::{MAX_USER_ADDRESS, ModuleInfo, ProcessAccess, ProcessHandle, Region};
pub use read::{EnumRepr, MAX_SHARED_VECTOR, MAX_STRING, MemoryExt, STRING_SSO_SIZE};
pub use scan::{Pattern, ScanScope, pattern_scan, pattern_scan_all};
pub use symbols::SymbolCache;
pub use value::MemValue;

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};
