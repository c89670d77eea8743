//! Pixel cells and their on-disk encoding
//!
//! A pixel is a fixed-size plain value. Node files are raw dumps of encoded
//! pixels with no per-pixel metadata, so `SIZE` must be exact and the codec
//! must be a pure function of the value.

/// A fixed-size image cell
pub trait Pixel: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Write the little-endian encoding into `out[..SIZE]`
    fn encode(&self, out: &mut [u8]);

    /// Read a pixel from `bytes[..SIZE]`
    fn decode(bytes: &[u8]) -> Self;

    /// 8-bit RGB approximation for previews
    fn to_rgb8(&self) -> [u8; 3];
}

/// A single channel value usable inside [`Rgb`]
pub trait Channel: Pixel {
    /// Most significant 8 bits of the channel
    fn to_u8(self) -> u8;
}

macro_rules! impl_int_channel {
    ($($ty:ty),*) => {
        $(
            impl Pixel for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn encode(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }

                fn to_rgb8(&self) -> [u8; 3] {
                    let v = self.to_u8();
                    [v, v, v]
                }
            }

            impl Channel for $ty {
                #[inline]
                fn to_u8(self) -> u8 {
                    (self >> (Self::SIZE * 8 - 8)) as u8
                }
            }
        )*
    };
}

impl_int_channel!(u8, u16, u32);

impl Pixel for f32 {
    const SIZE: usize = 4;

    #[inline]
    fn encode(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn to_rgb8(&self) -> [u8; 3] {
        let v = self.to_u8();
        [v, v, v]
    }
}

impl Channel for f32 {
    fn to_u8(self) -> u8 {
        (self.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// Three equal-width channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb<C> {
    /// Red
    pub r: C,
    /// Green
    pub g: C,
    /// Blue
    pub b: C,
}

/// 8-bit RGB
pub type Rgb8 = Rgb<u8>;

/// 16-bit RGB
pub type Rgb16 = Rgb<u16>;

impl<C> Rgb<C> {
    /// Create a pixel from its channels
    pub const fn new(r: C, g: C, b: C) -> Self {
        Self { r, g, b }
    }
}

impl<C: Channel> Pixel for Rgb<C> {
    const SIZE: usize = 3 * C::SIZE;

    #[inline]
    fn encode(&self, out: &mut [u8]) {
        self.r.encode(&mut out[..C::SIZE]);
        self.g.encode(&mut out[C::SIZE..2 * C::SIZE]);
        self.b.encode(&mut out[2 * C::SIZE..3 * C::SIZE]);
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        Self {
            r: C::decode(&bytes[..C::SIZE]),
            g: C::decode(&bytes[C::SIZE..2 * C::SIZE]),
            b: C::decode(&bytes[2 * C::SIZE..3 * C::SIZE]),
        }
    }

    fn to_rgb8(&self) -> [u8; 3] {
        [self.r.to_u8(), self.g.to_u8(), self.b.to_u8()]
    }
}

/// Encode a slice of pixels, appending to `out`
pub fn encode_slice<P: Pixel>(pixels: &[P], out: &mut Vec<u8>) {
    let start = out.len();
    out.resize(start + pixels.len() * P::SIZE, 0);
    for (pixel, chunk) in pixels.iter().zip(out[start..].chunks_exact_mut(P::SIZE)) {
        pixel.encode(chunk);
    }
}

/// Decode every whole pixel in `bytes` into `out[..]`, returning how many were decoded
pub fn decode_into<P: Pixel>(bytes: &[u8], out: &mut [P]) -> usize {
    let mut count = 0;
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(P::SIZE)) {
        *slot = P::decode(chunk);
        count += 1;
    }
    count
}
