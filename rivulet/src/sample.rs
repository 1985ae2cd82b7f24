//! Element types that can be stored in a [`Store`](crate::store::Store).
//!
//! Every element has a fixed on-disk width so that sample `n` always lives
//! at byte offset `n * WIDTH` in the backing file. Encoding uses host byte
//! order; backing files are session-local and never shipped between hosts.

use std::fmt::Debug;

/// Dense, zero-based key addressing one sample in a store.
pub type SampleNumber = u32;

/// A fixed-width, copyable element of a store.
///
/// Ordering is only partial so that `f32` qualifies. Values that do not
/// compare with themselves (NaN) are reported by [`Sample::is_unordered`]
/// and left out of min/max summaries.
pub trait Sample: Copy + Default + PartialOrd + Debug + Send + Sync + 'static {
    /// Encoded size in bytes.
    const WIDTH: usize;

    /// Short type name used in logs and by the CLI.
    const NAME: &'static str;

    /// Encodes `self` into `out`, which is exactly `WIDTH` bytes.
    fn encode(self, out: &mut [u8]);

    /// Decodes a value from exactly `WIDTH` bytes.
    fn decode(bytes: &[u8]) -> Self;

    /// Whether the value has no place in the ordering (NaN).
    #[inline]
    fn is_unordered(self) -> bool {
        self.partial_cmp(&self).is_none()
    }

    /// Returns the smaller of the two values.
    #[inline]
    fn min_of(self, other: Self) -> Self {
        if other < self { other } else { self }
    }

    /// Returns the larger of the two values.
    #[inline]
    fn max_of(self, other: Self) -> Self {
        if other > self { other } else { self }
    }
}

macro_rules! impl_sample {
    ($ty:ty, $name:literal) => {
        impl Sample for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const NAME: &'static str = $name;

            #[inline]
            fn encode(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            #[inline]
            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }
        }
    };
}

impl_sample!(f32, "f32");
impl_sample!(f64, "f64");
impl_sample!(i64, "i64");
impl_sample!(u64, "u64");

/// Encodes a slice of samples into a freshly allocated byte buffer.
pub(crate) fn encode_slice<T: Sample>(values: &[T]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * T::WIDTH];
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(T::WIDTH)) {
        value.encode(chunk);
    }
    bytes
}

/// Decodes `bytes` into `out`; `bytes.len()` must equal `out.len() * WIDTH`.
pub(crate) fn decode_into<T: Sample>(bytes: &[u8], out: &mut [T]) {
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(T::WIDTH)) {
        *slot = T::decode(chunk);
    }
}
