//! Typed accessor builders.
//!
//! A modeled struct declares each field once, as a const `(offset, type)`
//! pair, instead of hand-writing a read and a write method per field. The
//! declarations can be diffed against a type-tree dump when the client
//! updates.

use std::marker::PhantomData;

use crate::error::Result;
use crate::memory::process::ProcessAccess;
use crate::memory::read::EnumRepr;
use crate::memory::value::MemValue;
use crate::object::view::{ObjectView, Xyz};

/// A scalar field at a fixed offset.
pub struct Field<T: MemValue> {
    offset: u64,
    _type: PhantomData<T>,
}

impl<T: MemValue> Field<T> {
    pub const fn at(offset: u64) -> Self {
        Self {
            offset,
            _type: PhantomData,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn read<A: ProcessAccess + Sync>(&self, view: &ObjectView<'_, A>) -> Result<T> {
        view.read_at(self.offset)
    }

    pub fn write<A: ProcessAccess + Sync>(&self, view: &ObjectView<'_, A>, value: T) -> Result<()> {
        view.write_at(self.offset, value)
    }
}

/// An integer-backed enum field.
pub struct EnumField<E: EnumRepr> {
    offset: u64,
    _type: PhantomData<E>,
}

impl<E: EnumRepr> EnumField<E> {
    pub const fn at(offset: u64) -> Self {
        Self {
            offset,
            _type: PhantomData,
        }
    }

    pub fn read<A: ProcessAccess + Sync>(&self, view: &ObjectView<'_, A>) -> Result<E> {
        view.read_enum_at(self.offset)
    }

    pub fn write<A: ProcessAccess + Sync>(&self, view: &ObjectView<'_, A>, value: E) -> Result<()> {
        view.write_enum_at(self.offset, value)
    }
}

/// A three-float vector field.
pub struct XyzField {
    offset: u64,
}

impl XyzField {
    pub const fn at(offset: u64) -> Self {
        Self { offset }
    }

    pub fn read<A: ProcessAccess + Sync>(&self, view: &ObjectView<'_, A>) -> Result<Xyz> {
        view.read_xyz_at(self.offset)
    }

    pub fn write<A: ProcessAccess + Sync>(
        &self,
        view: &ObjectView<'_, A>,
        value: Xyz,
    ) -> Result<()> {
        view.write_xyz_at(self.offset, value)
    }
}

/// A `std::string` field.
pub struct StrField {
    offset: u64,
    sso_size: usize,
}

impl StrField {
    pub const fn at(offset: u64) -> Self {
        Self {
            offset,
            sso_size: crate::memory::read::STRING_SSO_SIZE,
        }
    }

    pub const fn with_sso(offset: u64, sso_size: usize) -> Self {
        Self { offset, sso_size }
    }

    pub fn read<A: ProcessAccess + Sync>(&self, view: &ObjectView<'_, A>) -> Result<String> {
        view.read_string_at_with_sso(self.offset, self.sso_size)
    }

    pub fn write<A: ProcessAccess + Sync>(
        &self,
        view: &ObjectView<'_, A>,
        value: &str,
    ) -> Result<()> {
        view.write_string_at(self.offset, value)
    }
}
