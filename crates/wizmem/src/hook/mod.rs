pub mod autobot;
pub mod descriptor;
pub mod registry;
pub mod relocate;

pub use autobot::{AUTOBOT_SIZE, AutobotRegion};
pub use descriptor::{
    BytePatch, CLIENT_MODULE, DescriptorSet, HookDescriptor, HookName, SiteLocator,
    builtin_descriptors, load_descriptors, save_descriptors,
};
pub use registry::{DEFAULT_READY_TIMEOUT, HookRegistry};
pub use relocate::JUMP_SIZE;
