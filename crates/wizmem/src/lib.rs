//! # wizmem
//!
//! Live-memory toolkit for the Wizard101 game client.
//!
//! This crate provides:
//! - Raw and typed memory access over an external process, with pattern
//!   scanning and export-table symbol resolution
//! - An inline-hook engine driven by data-only descriptors, with byte-exact
//!   removal
//! - A dynamic object model exposing the client's C++ structures as
//!   offset-addressed fields
//! - A walker for the client's own runtime type tree, with a class/property
//!   dump for offline regeneration of offset tables
//!
//! The target process can exit at any moment; every operation returns a
//! typed [`Error`] and nothing is retried automatically except the bounded
//! hook readiness poll.

pub mod error;
pub mod hook;
pub mod memory;
pub mod object;
pub mod typetree;

pub use error::{Error, Result};
pub use hook::{
    AutobotRegion, BytePatch, CLIENT_MODULE, DescriptorSet, HookDescriptor, HookName,
    HookRegistry, SiteLocator, builtin_descriptors, load_descriptors, save_descriptors,
};
pub use memory::{
    MemValue, MemoryExt, ModuleInfo, Pattern, ProcessAccess, ProcessHandle, Region, ScanScope,
    SymbolCache, pattern_scan, pattern_scan_all,
};
pub use object::{
    ActorBody, BaseResolver, DuelPhase, EnumField, Field, ObjectView, StrField, Xyz, XyzField,
};
pub use typetree::{ClassDump, collect_nodes, type_map};
