//! Field element types
use int_enum::IntEnum;

/// Type tag of one message field, as carried in the packed 4-bit tag table
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
#[repr(u8)]
pub enum FormatSpecifier {
    /// No type. Never valid on the wire.
    Unset = 0,
    /// Bytes of a text string, one element per byte
    Text = 1,
    /// Unsigned 8-bit
    U8 = 2,
    /// Signed 8-bit
    S8 = 3,
    /// Unsigned 16-bit
    U16 = 4,
    /// Signed 16-bit
    S16 = 5,
    /// Unsigned 32-bit
    U32 = 6,
    /// Signed 32-bit
    S32 = 7,
    /// IEEE-754 single precision
    Float = 8,
}

impl FormatSpecifier {
    /// Width of one element in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::Unset | Self::Text | Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::Float => 4,
        }
    }

    /// Parse a type code from a topic specification
    pub const fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"u8" => Some(Self::U8),
            b"s8" => Some(Self::S8),
            b"u16" => Some(Self::U16),
            b"s16" => Some(Self::S16),
            b"u32" => Some(Self::U32),
            b"s32" => Some(Self::S32),
            b"f" => Some(Self::Float),
            b"st" => Some(Self::Text),
            _ => None,
        }
    }

    /// The type code used in topic specifications
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Text => "st",
            Self::U8 => "u8",
            Self::S8 => "s8",
            Self::U16 => "u16",
            Self::S16 => "s16",
            Self::U32 => "u32",
            Self::S32 => "s32",
            Self::Float => "f",
        }
    }

    /// Decode a 4-bit tag from the wire
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match Self::try_from(nibble & 0x0F) {
            Ok(Self::Unset) | Err(_) => None,
            Ok(format) => Some(format),
        }
    }
}

/// A fixed-width element type which can be carried in a message field
pub trait Element: Copy + Default {
    /// The tag for fields of this type
    const FORMAT: FormatSpecifier;

    /// Write the element little-endian into the first `FORMAT.width()` bytes of `out`
    fn write_le(&self, out: &mut [u8]);

    /// Read an element from the first `FORMAT.width()` bytes of `bytes`
    fn read_le(bytes: &[u8]) -> Self;

    /// Returns true if a field tagged `format` can be read as this type
    fn accepts(format: FormatSpecifier) -> bool {
        format == Self::FORMAT
    }
}

macro_rules! impl_element {
    ($t:ty, $format:ident) => {
        impl Element for $t {
            const FORMAT: FormatSpecifier = FormatSpecifier::$format;

            fn write_le(&self, out: &mut [u8]) {
                out[..core::mem::size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..core::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(raw)
            }
        }
    };
}

impl_element!(i8, S8);
impl_element!(u16, U16);
impl_element!(i16, S16);
impl_element!(u32, U32);
impl_element!(i32, S32);
impl_element!(f32, Float);

impl Element for u8 {
    const FORMAT: FormatSpecifier = FormatSpecifier::U8;

    fn write_le(&self, out: &mut [u8]) {
        out[0] = *self;
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0]
    }

    // Text fields are byte arrays too
    fn accepts(format: FormatSpecifier) -> bool {
        matches!(format, FormatSpecifier::U8 | FormatSpecifier::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(1, u8::from(FormatSpecifier::Text));
        assert_eq!(5, u8::from(FormatSpecifier::S16));
        assert_eq!(8, u8::from(FormatSpecifier::Float));
        assert_eq!(Ok(FormatSpecifier::U32), FormatSpecifier::try_from(6));
        assert!(FormatSpecifier::try_from(9).is_err());
    }

    #[test]
    fn test_codes_round_trip() {
        for format in [
            FormatSpecifier::Text,
            FormatSpecifier::U8,
            FormatSpecifier::S8,
            FormatSpecifier::U16,
            FormatSpecifier::S16,
            FormatSpecifier::U32,
            FormatSpecifier::S32,
            FormatSpecifier::Float,
        ] {
            assert_eq!(Some(format), FormatSpecifier::from_code(format.code().as_bytes()));
        }
        assert_eq!(None, FormatSpecifier::from_code(b"u64"));
    }

    #[test]
    fn test_from_nibble_rejects_unset() {
        assert_eq!(None, FormatSpecifier::from_nibble(0));
        assert_eq!(None, FormatSpecifier::from_nibble(0x0F));
        assert_eq!(Some(FormatSpecifier::S8), FormatSpecifier::from_nibble(0x33));
    }

    #[test]
    fn test_signed_elements() {
        let mut buf = [0u8; 4];
        (-5i16).write_le(&mut buf);
        assert_eq!([0xFB, 0xFF], buf[..2]);
        assert_eq!(-5, i16::read_le(&buf));

        (-2i32).write_le(&mut buf);
        assert_eq!([0xFE, 0xFF, 0xFF, 0xFF], buf);
        assert_eq!(-2, i32::read_le(&buf));
    }

    #[test]
    fn test_float_element() {
        let mut buf = [0u8; 4];
        1.5f32.write_le(&mut buf);
        assert_eq!(1.5f32.to_le_bytes(), buf);
        assert_eq!(1.5, f32::read_le(&buf));
    }

    #[test]
    fn test_u8_accepts_text() {
        assert!(u8::accepts(FormatSpecifier::Text));
        assert!(!i8::accepts(FormatSpecifier::Text));
    }
}
