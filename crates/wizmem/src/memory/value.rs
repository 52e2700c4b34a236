//! Fixed-width little-endian scalar codecs.
//!
//! Every field in the target is read and written through one of these; the
//! encoding is the target's own in-memory representation, so it must stay
//! bit-exact.

/// A scalar that can be decoded from / encoded to the target's memory.
pub trait MemValue: Sized + Copy {
    const SIZE: usize;

    /// Decode from little-endian bytes; `bytes` must hold at least `SIZE`.
    fn decode(bytes: &[u8]) -> Self;

    fn encode(self) -> Vec<u8>;
}

macro_rules! impl_mem_value {
    ($($ty:ty),*) => {
        $(
            impl MemValue for $ty {
                const SIZE: usize = size_of::<$ty>();

                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..size_of::<$ty>()]);
                    <$ty>::from_le_bytes(buf)
                }

                fn encode(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )*
    };
}

impl_mem_value!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl MemValue for bool {
    const SIZE: usize = 1;

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn encode(self) -> Vec<u8> {
        vec![self as u8]
    }
}
