use std::fmt::Debug;

use num_traits::{Bounded, NumCast, ToPrimitive, Zero};

/// Runtime tag for the pixel data type of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixelType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    /// Width of one pixel in bytes.
    pub fn bytes(&self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, PixelType::F32 | PixelType::F64)
    }

    pub const ALL: [PixelType; 7] = [
        PixelType::U8,
        PixelType::U16,
        PixelType::I16,
        PixelType::U32,
        PixelType::I32,
        PixelType::F32,
        PixelType::F64,
    ];
}

/// Static pixel types a band buffer can be read into or written from.
///
/// Binds the Rust type to its [PixelType] tag and to the native-endian
/// byte codec used by the block cache.
pub trait Pixel:
    Copy + PartialEq + PartialOrd + Send + Sync + Debug + Zero + NumCast + ToPrimitive + Bounded + 'static
{
    const TYPE: PixelType;

    fn decode(bytes: &[u8]) -> Self;
    fn encode(self, out: &mut [u8]);

    /// Lossy conversion used by the resampling kernels. Integer types
    /// round and saturate, floats cast.
    fn from_f64_lossy(value: f64) -> Self;
}

macro_rules! impl_pixel_int {
    ($($t:ty => $tag:ident),* $(,)?) => {$(
        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$tag;

            fn decode(bytes: &[u8]) -> Self {
                Self::from_ne_bytes(bytes.try_into().expect("pixel slice width"))
            }

            fn encode(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            fn from_f64_lossy(value: f64) -> Self {
                if value.is_nan() {
                    return Self::zero();
                }
                let rounded = value.round();
                NumCast::from(rounded).unwrap_or(if rounded < 0.0 {
                    Self::min_value()
                } else {
                    Self::max_value()
                })
            }
        }
    )*};
}

macro_rules! impl_pixel_float {
    ($($t:ty => $tag:ident),* $(,)?) => {$(
        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$tag;

            fn decode(bytes: &[u8]) -> Self {
                Self::from_ne_bytes(bytes.try_into().expect("pixel slice width"))
            }

            fn encode(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            fn from_f64_lossy(value: f64) -> Self {
                value as $t
            }
        }
    )*};
}

impl_pixel_int!(u8 => U8, u16 => U16, i16 => I16, u32 => U32, i32 => I32);
impl_pixel_float!(f32 => F32, f64 => F64);

/// Dispatches a runtime [PixelType] tag to a block generic over the
/// matching [Pixel] type.
macro_rules! for_pixel_type {
    ($tag:expr, $T:ident => $body:expr) => {
        match $tag {
            $crate::components::pixel::PixelType::U8 => {
                type $T = u8;
                $body
            }
            $crate::components::pixel::PixelType::U16 => {
                type $T = u16;
                $body
            }
            $crate::components::pixel::PixelType::I16 => {
                type $T = i16;
                $body
            }
            $crate::components::pixel::PixelType::U32 => {
                type $T = u32;
                $body
            }
            $crate::components::pixel::PixelType::I32 => {
                type $T = i32;
                $body
            }
            $crate::components::pixel::PixelType::F32 => {
                type $T = f32;
                $body
            }
            $crate::components::pixel::PixelType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

pub(crate) use for_pixel_type;
