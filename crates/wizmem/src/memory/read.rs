//! Typed read/write surface over [`ProcessAccess`].
//!
//! The container and string layouts here mirror the client's MSVC standard
//! library shapes and must stay bit-exact: `std::string` keeps its length at
//! `+0x10` and spills to a heap pointer at the 16-byte small-string
//! threshold; shared-pointer vectors are a begin/end pointer pair over
//! 16-byte control blocks; linked lists carry their size next to the head
//! pointer and their payload 16 bytes into each node.

use crate::error::{Error, Result};
use crate::memory::process::ProcessAccess;
use crate::memory::value::MemValue;

/// Longest string the reader will follow; anything bigger is garbage.
pub const MAX_STRING: usize = 5_000;

/// Small-string buffer size of the client's narrow strings.
pub const STRING_SSO_SIZE: usize = 16;

/// Byte length at which a wide string becomes a heap pointer.
const WIDE_STRING_POINTER_SIZE: usize = 8;

/// Largest shared vector accepted by default.
pub const MAX_SHARED_VECTOR: usize = 1_000;

/// Stride of one shared-pointer control block.
const SHARED_POINTER_SIZE: u64 = 16;

/// An enum with a stable integer representation in the target.
///
/// `strum::FromRepr` generates an inherent function rather than a trait
/// impl, so modeled enums forward to it through this trait.
pub trait EnumRepr: Sized + Copy {
    fn from_i32(value: i32) -> Option<Self>;

    fn as_i32(self) -> i32;
}

/// Typed access helpers, available on every [`ProcessAccess`] implementor.
pub trait MemoryExt: ProcessAccess {
    fn read_value<T: MemValue>(&self, address: u64) -> Result<T> {
        let bytes = self.read_bytes(address, T::SIZE)?;
        Ok(T::decode(&bytes))
    }

    fn write_value<T: MemValue>(&self, address: u64, value: T) -> Result<()> {
        self.write_bytes(address, &value.encode())
    }

    /// `count` consecutive scalars starting at `address`.
    fn read_vector<T: MemValue>(&self, address: u64, count: usize) -> Result<Vec<T>> {
        let bytes = self.read_bytes(address, T::SIZE * count)?;
        Ok(bytes.chunks_exact(T::SIZE).map(T::decode).collect())
    }

    fn write_vector<T: MemValue>(&self, address: u64, values: &[T]) -> Result<()> {
        let mut bytes = Vec::with_capacity(T::SIZE * values.len());
        for value in values {
            bytes.extend_from_slice(&value.encode());
        }
        self.write_bytes(address, &bytes)
    }

    /// Decode an i32 discriminant into `E`. An unmatched value is an error,
    /// never a default: it means either genuinely bad state or a stale
    /// layout assumption, and both should be loud.
    fn read_enum<E: EnumRepr>(&self, address: u64) -> Result<E> {
        let value = self.read_value::<i32>(address)?;
        E::from_i32(value).ok_or(Error::InvalidEnumValue {
            type_name: std::any::type_name::<E>(),
            value,
        })
    }

    fn write_enum<E: EnumRepr>(&self, address: u64, value: E) -> Result<()> {
        self.write_value(address, value.as_i32())
    }

    /// Bounded read of a C string through `address`; a missing terminator
    /// within `max_size` is a read error.
    fn read_null_terminated_string(&self, address: u64, max_size: usize) -> Result<String> {
        let bytes = self.read_bytes(address, max_size)?;
        match bytes.iter().position(|&b| b == 0) {
            Some(0) => Ok(String::new()),
            Some(end) => Ok(String::from_utf8_lossy(&bytes[..end]).into_owned()),
            None => Err(Error::MemoryRead {
                address,
                size: max_size,
            }),
        }
    }

    /// Read a `std::string` at `address` with the given small-string
    /// threshold. Lengths outside `1..=MAX_STRING` read as empty.
    fn read_string_with_sso(&self, address: u64, sso_size: usize) -> Result<String> {
        let len = self.read_value::<i32>(address + 0x10)?;
        if len < 1 || len as usize > MAX_STRING {
            return Ok(String::new());
        }
        let len = len as usize;

        let data_address = if len >= sso_size {
            self.read_value::<u64>(address)?
        } else {
            address
        };

        let bytes = self.read_bytes(data_address, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_string(&self, address: u64) -> Result<String> {
        self.read_string_with_sso(address, STRING_SSO_SIZE)
    }

    /// Write a `std::string`, allocating a heap buffer in the target when
    /// the value outgrows the inline one.
    fn write_string(&self, address: u64, value: &str) -> Result<()> {
        let encoded = value.as_bytes();
        let len = encoded.len();
        let current_len = self.read_value::<i32>(address + 0x10)?;

        if len >= STRING_SSO_SIZE - 1 && current_len < STRING_SSO_SIZE as i32 - 1 {
            // Inline buffer too small: point the string at a fresh buffer.
            let pointer = self.allocate(len + 1)?;
            self.write_bytes(pointer, &[encoded, &[0]].concat())?;
            self.write_value::<u64>(address, pointer)?;
        } else if len >= STRING_SSO_SIZE - 1 {
            // Already heap-backed; reuse the existing buffer.
            let pointer = self.read_value::<u64>(address)?;
            self.write_bytes(pointer, &[encoded, &[0]].concat())?;
        } else {
            self.write_bytes(address, &[encoded, &[0]].concat())?;
        }

        self.write_value::<i32>(address + 0x10, len as i32)
    }

    /// Read a `std::wstring` (UTF-16). Wide strings of 8 bytes or more are
    /// heap pointers.
    fn read_wide_string(&self, address: u64) -> Result<String> {
        let len = self.read_value::<i32>(address + 0x10)?;
        if len < 1 || len as usize > MAX_STRING {
            return Ok(String::new());
        }
        let byte_len = len as usize * 2;

        let data_address = if byte_len >= WIDE_STRING_POINTER_SIZE {
            self.read_value::<u64>(address)?
        } else {
            address
        };

        let bytes = self.read_bytes(data_address, byte_len)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    fn write_wide_string(&self, address: u64, value: &str) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let mut encoded = Vec::with_capacity(units.len() * 2 + 2);
        for unit in &units {
            encoded.extend_from_slice(&unit.to_le_bytes());
        }
        encoded.extend_from_slice(&[0, 0]);

        let byte_len = units.len() * 2;
        let current_len = self.read_value::<i32>(address + 0x10)?;

        if byte_len >= WIDE_STRING_POINTER_SIZE - 1
            && (current_len.max(0) as usize * 2) < WIDE_STRING_POINTER_SIZE
        {
            let pointer = self.allocate(encoded.len())?;
            self.write_bytes(pointer, &encoded)?;
            self.write_value::<u64>(address, pointer)?;
        } else if byte_len >= WIDE_STRING_POINTER_SIZE - 1 {
            let pointer = self.read_value::<u64>(address)?;
            self.write_bytes(pointer, &encoded)?;
        } else {
            self.write_bytes(address, &encoded)?;
        }

        self.write_value::<i32>(address + 0x10, units.len() as i32)
    }

    /// Read a vector of shared pointers framed by a begin/end pointer pair
    /// at `address`/`address + 8`. Each element is a 16-byte control block
    /// whose first 8 bytes are the payload pointer. `begin == end` is empty;
    /// `begin > end` is the deallocation sentinel and also reads as empty.
    fn read_shared_vector(&self, address: u64, max_size: usize) -> Result<Vec<u64>> {
        let start = self.read_value::<u64>(address)?;
        let end = self.read_value::<u64>(address + 8)?;

        if end <= start {
            return Ok(Vec::new());
        }

        let size = end - start;
        let count = (size / SHARED_POINTER_SIZE) as usize;
        if count > max_size {
            return Err(Error::SharedVectorTooLarge {
                len: count,
                max: max_size,
            });
        }

        let bytes = match self.read_bytes(start, size as usize) {
            Ok(bytes) => bytes,
            // The vector can be torn down between the header read and the
            // element read; treat that as empty rather than an error.
            Err(Error::AddressOutOfRange(_)) | Err(Error::MemoryRead { .. }) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(bytes
            .chunks_exact(SHARED_POINTER_SIZE as usize)
            .map(|chunk| <u64 as MemValue>::decode(&chunk[..8]))
            .collect())
    }

    /// Read a plain begin/end framed vector of scalars.
    fn read_dynamic_vector<T: MemValue>(&self, address: u64) -> Result<Vec<T>> {
        let start = self.read_value::<u64>(address)?;
        let end = self.read_value::<u64>(address + 8)?;

        if end <= start {
            return Ok(Vec::new());
        }

        let count = ((end - start) as usize) / T::SIZE;
        self.read_vector(start, count)
    }

    /// Traverse a linked list whose head pointer sits at `address` and whose
    /// stored size sits at `address + 8`; returns each node's payload
    /// address (payload starts 16 bytes into the node).
    fn read_linked_list(&self, address: u64) -> Result<Vec<u64>> {
        let list_address = self.read_value::<u64>(address)?;
        let list_size = self.read_value::<i32>(address + 8)?;

        if list_size < 1 {
            return Ok(Vec::new());
        }

        let mut addresses = Vec::with_capacity(list_size as usize);
        let mut node = self.read_value::<u64>(list_address)?;
        addresses.push(node + 16);

        // One node was already consumed reading the head.
        for _ in 0..list_size - 1 {
            node = self.read_value::<u64>(node)?;
            addresses.push(node + 16);
        }

        Ok(addresses)
    }

    /// Shared-pointer variant of [`read_linked_list`]: each node holds a
    /// shared pointer to the payload at `+16`.
    fn read_shared_linked_list(&self, address: u64) -> Result<Vec<u64>> {
        let list_address = self.read_value::<u64>(address)?;
        let list_size = self.read_value::<i32>(address + 8)?;

        let mut addresses = Vec::new();
        let mut next_node = list_address;
        for _ in 0..list_size.max(0) {
            let node = self.read_value::<u64>(next_node)?;
            next_node = self.read_value::<u64>(node)?;
            addresses.push(self.read_value::<u64>(node + 16)?);
        }

        Ok(addresses)
    }
}

impl<A: ProcessAccess + ?Sized> MemoryExt for A {}
