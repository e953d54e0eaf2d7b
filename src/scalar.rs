use dry::macro_for;
use half::{bf16, f16};
use num_traits::{Float, NumCast, ToPrimitive};
use std::fmt::{Debug, Display};

mod sealed {
    use half::{bf16, f16};

    #[doc(hidden)]
    pub trait Sealed {}

    macro_rules! impl_sealed {
        ($($t:ty),+) => {
            $(
                impl Sealed for $t {}
            )+
        };
    }

    impl_sealed! {f16, bf16, f32, f64}
}
use sealed::Sealed;

/// Floating point types a [`Blob`](crate::blob::Blob) may hold.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display)]
pub enum ScalarType {
    F16,
    BF16,
    F32,
    F64,
}

impl ScalarType {
    /// The size of the type in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::F16 | Self::BF16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Element type of blobs.
///
/// Half precision types are computed through [`Float`], which widens to f32 internally.
pub trait Scalar: Float + Default + Debug + Display + Send + Sync + 'static + Sealed {
    /// The [`ScalarType`] of the scalar.
    fn scalar_type() -> ScalarType;
    /// Casts from f64, rounding to the nearest representable value.
    fn from_f64_lossy(x: f64) -> Self {
        <Self as NumCast>::from(x).unwrap_or_else(Self::nan)
    }
    /// Casts to f64.
    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
    /// Reads an integer class label stored as a float.
    ///
    /// Truncates toward zero. Non finite values map to [`i64::MIN`], which never matches a
    /// valid class.
    fn label(self) -> i64 {
        self.to_i64().unwrap_or(i64::MIN)
    }
}

macro_for!($T in [f16, bf16, f32, f64] {
    impl Scalar for $T {
        fn scalar_type() -> ScalarType {
            paste::paste! {
                ScalarType::[<$T:upper>]
            }
        }
    }
});
