//! Byte-pattern scanning over the target's address space.
//!
//! Patterns are written as space-separated hex bytes with `??` wildcards,
//! e.g. `"48 8B ?? ?? 05"`. A scan walks every committed readable region (or
//! one module's image) and runs on its own worker thread so long page walks
//! never stall a cooperating scheduler; the caller blocks until the worker
//! finishes. There is no mid-scan cancellation.

use std::fmt;
use std::thread;

use memchr::memchr_iter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::process::{ProcessAccess, Region};

/// A byte pattern with wildcard positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    bytes: Vec<Option<u8>>,
}

impl Pattern {
    /// Parse the textual form. `??` (or `?`) marks a wildcard byte.
    pub fn parse(text: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        for token in text.split_whitespace() {
            if token == "??" || token == "?" {
                bytes.push(None);
                continue;
            }

            let value = u8::from_str_radix(token, 16).map_err(|e| {
                Error::InvalidPattern(format!("invalid token '{token}': {e}"))
            })?;
            bytes.push(Some(value));
        }

        if bytes.is_empty() {
            return Err(Error::InvalidPattern("pattern is empty".to_string()));
        }

        Ok(Self { bytes })
    }

    /// An exact pattern with no wildcards, e.g. a known pointer value.
    pub fn exact(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offsets of every match within `buffer`.
    pub fn matches_in(&self, buffer: &[u8]) -> Vec<usize> {
        if self.bytes.is_empty() || buffer.len() < self.bytes.len() {
            return Vec::new();
        }

        // Anchor on the first concrete byte so memchr does the bulk of the
        // work; fully-wildcarded patterns fall back to a plain walk.
        let anchor = self
            .bytes
            .iter()
            .enumerate()
            .find_map(|(i, b)| b.map(|byte| (i, byte)));

        match anchor {
            Some((anchor, anchor_byte)) => {
                let last = buffer.len() - self.bytes.len();

                memchr_iter(anchor_byte, buffer)
                    .filter_map(|pos| pos.checked_sub(anchor))
                    .filter(|&start| start <= last)
                    .filter(|&start| self.matches_at(buffer, start))
                    .collect()
            }
            None => (0..=buffer.len() - self.bytes.len()).collect(),
        }
    }

    fn matches_at(&self, buffer: &[u8], start: usize) -> bool {
        self.bytes
            .iter()
            .zip(&buffer[start..])
            .all(|(pattern, byte)| pattern.is_none_or(|p| p == *byte))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .bytes
            .iter()
            .map(|b| match b {
                Some(value) => format!("{value:02X}"),
                None => "??".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&text)
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Pattern::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.to_string()
    }
}

/// Where a scan looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanScope<'a> {
    /// Every committed readable region up to the maximum user address.
    Process,
    /// One module's image bounds.
    Module(&'a str),
}

/// Find exactly one occurrence of `pattern`.
///
/// Zero matches is [`Error::PatternFailed`]; more than one is
/// [`Error::PatternMultipleResults`] — ambiguity is never auto-resolved,
/// callers narrow by module or a stricter pattern instead.
pub fn pattern_scan<A>(access: &A, pattern: &Pattern, scope: ScanScope<'_>) -> Result<u64>
where
    A: ProcessAccess + Sync,
{
    let matches = pattern_scan_all(access, pattern, scope)?;
    if matches.len() > 1 {
        return Err(Error::PatternMultipleResults {
            pattern: pattern.to_string(),
            count: matches.len(),
        });
    }
    Ok(matches[0])
}

/// Find every occurrence of `pattern`, in ascending address order.
/// Zero matches is still [`Error::PatternFailed`].
pub fn pattern_scan_all<A>(
    access: &A,
    pattern: &Pattern,
    scope: ScanScope<'_>,
) -> Result<Vec<u64>>
where
    A: ProcessAccess + Sync,
{
    // The page walk is slow on a big target; keep it off the calling
    // scheduler by running it on its own worker and parking here until it
    // finishes.
    let found = thread::scope(|s| {
        let worker = s.spawn(|| match scope {
            ScanScope::Process => scan_regions(access, pattern),
            ScanScope::Module(name) => scan_module(access, pattern, name),
        });
        match worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    })?;

    debug!(pattern = %pattern, matches = found.len(), "pattern scan finished");

    if found.is_empty() {
        return Err(Error::PatternFailed(pattern.to_string()));
    }
    Ok(found)
}

fn scan_regions<A: ProcessAccess>(access: &A, pattern: &Pattern) -> Result<Vec<u64>> {
    let regions = access.regions()?;
    let mut found = Vec::new();

    for region in regions {
        scan_one_region(access, pattern, region, &mut found);
    }

    Ok(found)
}

fn scan_module<A: ProcessAccess>(access: &A, pattern: &Pattern, name: &str) -> Result<Vec<u64>> {
    let module = access.module(name)?;
    let mut found = Vec::new();

    // Walk the regions overlapping the module image; the image is usually a
    // handful of differently-protected regions.
    for region in access.regions()? {
        let start = region.base.max(module.base);
        let end = (region.base + region.size).min(module.end());
        if start >= end {
            continue;
        }
        scan_one_region(
            access,
            pattern,
            Region {
                base: start,
                size: end - start,
            },
            &mut found,
        );
    }

    Ok(found)
}

fn scan_one_region<A: ProcessAccess>(
    access: &A,
    pattern: &Pattern,
    region: Region,
    found: &mut Vec<u64>,
) {
    // A region can disappear between enumeration and the read; skip it.
    let Ok(bytes) = access.read_bytes(region.base, region.size as usize) else {
        return;
    };

    found.extend(
        pattern
            .matches_in(&bytes)
            .into_iter()
            .map(|offset| region.base + offset as u64),
    );
}
