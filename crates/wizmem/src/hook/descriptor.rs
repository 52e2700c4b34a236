//! Data-only hook descriptors.
//!
//! A descriptor says *what bytes* make up a hook — the pattern locating its
//! jump site, the capture payload, the singleton slot — while the generic
//! installer in [`crate::hook::registry`] decides *how to patch*. Descriptors
//! are serializable so a new client build only needs a new descriptor set.
//!
//! Payload convention: the cave is entered through an indirect jump that has
//! pushed the original `rax`, so the stack top holds the pre-hook `rax` and
//! the register itself is clobbered. Payloads that need the original value
//! load it with `mov rax, [rsp]`; payloads that clobber `rax` for the
//! capture restore it the same way before falling through to the relocated
//! instructions.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{Error, Result};
use crate::memory::scan::Pattern;

/// The module every built-in pattern is scoped to.
pub const CLIENT_MODULE: &str = "WizardGraphicalClient.exe";

/// Logical hook names, keyed by what singleton they capture.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HookName {
    Player,
    Duel,
    Quest,
    Client,
    RootWindow,
    RenderContext,
    MouselessCursor,
}

/// How a hook finds its jump site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteLocator {
    /// Pattern scan, optionally narrowed to one module.
    Pattern {
        pattern: Pattern,
        module: Option<String>,
    },
    /// A named export; used when the site is a known API entry point.
    Export { module: String, symbol: String },
}

/// A single byte toggled while the hook is active; the pre-patch byte is
/// recorded at install time and restored on removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytePatch {
    pub pattern: Pattern,
    pub module: Option<String>,
    /// Offset from the pattern match to the byte.
    pub offset: i64,
    /// Value written while active.
    pub enabled: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDescriptor {
    pub name: HookName,
    pub site: SiteLocator,
    /// Capture payload as space-separated hex; the 8 bytes at
    /// `slot_offset` are replaced with the slot address at install time.
    pub payload: String,
    pub slot_offset: usize,
    /// Bytes allocated for the hook's output slot.
    pub slot_size: usize,
    /// Whether the displaced site instructions are relocated into the cave
    /// and control returns to the site. The cursor hook replaces its
    /// function outright (the payload ends in `ret`) and sets this false.
    pub relocate_originals: bool,
    #[serde(default)]
    pub patches: Vec<BytePatch>,
}

impl HookDescriptor {
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        let bytes = parse_hex_bytes(&self.payload)?;
        if self.slot_offset + 8 > bytes.len() {
            return Err(Error::InvalidPattern(format!(
                "slot offset {} does not fit payload of {} bytes",
                self.slot_offset,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// A versioned set of descriptors for one client build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSet {
    pub version: String,
    pub hooks: Vec<HookDescriptor>,
}

impl DescriptorSet {
    pub fn get(&self, name: HookName) -> Option<&HookDescriptor> {
        self.hooks.iter().find(|hook| hook.name == name)
    }
}

pub fn load_descriptors<P: AsRef<std::path::Path>>(path: P) -> Result<DescriptorSet> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_descriptors<P: AsRef<std::path::Path>>(
    path: P,
    descriptors: &DescriptorSet,
) -> Result<()> {
    let content = serde_json::to_string_pretty(descriptors)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub(crate) fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    text.split_whitespace()
        .map(|token| {
            u8::from_str_radix(token, 16)
                .map_err(|e| Error::InvalidPattern(format!("invalid byte '{token}': {e}")))
        })
        .collect()
}

fn pattern_site(pattern: &str) -> SiteLocator {
    SiteLocator::Pattern {
        pattern: Pattern::parse(pattern).expect("builtin pattern is well-formed"),
        module: Some(CLIENT_MODULE.to_string()),
    }
}

/// Descriptors for the current client build.
pub fn builtin_descriptors() -> DescriptorSet {
    DescriptorSet {
        version: "1.0.0".to_string(),
        hooks: vec![
            // Captures the player actor pointer out of rax, but only when
            // the behavior id at [rax+0x474] marks an actual player.
            HookDescriptor {
                name: HookName::Player,
                site: pattern_site("F2 0F 10 40 58 F2"),
                payload: "48 8B 04 24 51 8B 88 74 04 00 00 83 F9 08 59 0F 85 0A 00 00 00 \
                          48 A3 00 00 00 00 00 00 00 00"
                    .to_string(),
                slot_offset: 23,
                slot_size: 8,
                relocate_originals: true,
                patches: Vec::new(),
            },
            // Captures the current duel out of [r15].
            HookDescriptor {
                name: HookName::Duel,
                site: pattern_site(
                    "48 89 ?? ?? ?? 48 89 ?? ?? ?? 48 89 ?? ?? ?? 89 4C",
                ),
                payload: "49 8B 07 48 A3 00 00 00 00 00 00 00 00 48 8B 04 24".to_string(),
                slot_offset: 5,
                slot_size: 8,
                relocate_originals: true,
                patches: Vec::new(),
            },
            // Captures the quest helper coordinate block at [r14+0xCAC].
            HookDescriptor {
                name: HookName::Quest,
                site: pattern_site(
                    "?? ?? ?? ?? ?? ?? ?? ?? ?? F3 0F 11 45 E0 ?? ?? ?? ?? ?? ?? ?? ?? ?? \
                     F3 0F 11 4D E4 ?? ?? ?? ?? ?? ?? ?? ?? ?? F3 0F 11 45 E8 48",
                ),
                payload: "49 8D 86 AC 0C 00 00 48 A3 00 00 00 00 00 00 00 00 48 8B 04 24"
                    .to_string(),
                slot_offset: 9,
                slot_size: 8,
                relocate_originals: true,
                patches: Vec::new(),
            },
            // Captures the game client out of rdi.
            HookDescriptor {
                name: HookName::Client,
                site: pattern_site(
                    "48 ?? ?? ?? ?? ?? ?? 48 8B 7C 24 40 48 85 FF 74 29 8B C6 F0 0F C1 47 08 \
                     83 F8 01 75 1D 48 8B 07 48 8B CF FF 50 08 F0 0F C1 77 0C",
                ),
                payload: "48 8B C7 48 A3 00 00 00 00 00 00 00 00 48 8B 04 24".to_string(),
                slot_offset: 5,
                slot_size: 8,
                relocate_originals: true,
                patches: Vec::new(),
            },
            // Captures the root window out of [r15+0xD8].
            HookDescriptor {
                name: HookName::RootWindow,
                site: pattern_site("?? ?? ?? ?? ?? ?? ?? 48 8B 01 ?? ?? ?? ?? ?? ?? ?? FF 50 70 84"),
                payload: "49 8B 87 D8 00 00 00 48 A3 00 00 00 00 00 00 00 00 48 8B 04 24"
                    .to_string(),
                slot_offset: 9,
                slot_size: 8,
                relocate_originals: true,
                patches: Vec::new(),
            },
            // Captures the render context out of rbx.
            HookDescriptor {
                name: HookName::RenderContext,
                site: pattern_site(
                    "?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? ?? \
                     F3 41 0F 10 28 F3 0F 10 56 04 48 63 C1",
                ),
                payload: "48 89 D8 48 A3 00 00 00 00 00 00 00 00 48 8B 04 24".to_string(),
                slot_offset: 5,
                slot_size: 8,
                relocate_originals: true,
                patches: Vec::new(),
            },
            // Replaces user32!GetCursorPos so the client reads cursor
            // coordinates from our slot; two client-side checks are toggled
            // on so the synthetic cursor is honored.
            HookDescriptor {
                name: HookName::MouselessCursor,
                site: SiteLocator::Export {
                    module: "user32.dll".to_string(),
                    symbol: "GetCursorPos".to_string(),
                },
                payload: "48 A1 00 00 00 00 00 00 00 00 48 89 01 58 C3".to_string(),
                slot_offset: 2,
                slot_size: 8,
                relocate_originals: false,
                patches: vec![
                    BytePatch {
                        pattern: Pattern::parse("00 FF 50 18 66 C7")
                            .expect("builtin pattern is well-formed"),
                        module: Some(CLIENT_MODULE.to_string()),
                        offset: 0,
                        enabled: 0x01,
                    },
                    BytePatch {
                        pattern: Pattern::parse("C6 86 ?? ?? ?? 00 ?? 33 FF")
                            .expect("builtin pattern is well-formed"),
                        module: Some(CLIENT_MODULE.to_string()),
                        offset: 6,
                        enabled: 0x01,
                    },
                ],
            },
        ],
    }
}
