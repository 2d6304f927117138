//! Typed topic messages
//!
//! A message is the payload of one frame:
//!
//! | Field      | Bytes            | Notes                                          |
//! | ---------- | ---------------- | ---------------------------------------------- |
//! | topic      | 1..=15           | not NUL terminated on its own                  |
//! | NUL        | 1                |                                                |
//! | dimensions | 1                | number of fields, at most 4                    |
//! | count      | 2                | elements per field, little endian              |
//! | tags       | ceil(dims / 2)   | 4-bit [`FormatSpecifier`]s, low nibble first   |
//! | data       | sum(width*count) | each field in order, elements little endian    |
//!
//! All fields share a single element count, so the offset of a field is the sum of the widths of
//! the fields before it times the count.
use heapless::Vec;
use snafu::{ResultExt, Snafu};

use crate::{
    constants::{MAX_DIMENSIONS, MAX_TOPIC_LEN},
    format::{Element, FormatSpecifier},
    topic::{header_len, TopicDescriptor, TopicError},
};

/// One typed argument of a publish
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// A text string. Its byte length becomes the element count.
    Text(&'a str),
    /// Unsigned 8-bit elements
    U8(&'a [u8]),
    /// Signed 8-bit elements
    S8(&'a [i8]),
    /// Unsigned 16-bit elements
    U16(&'a [u16]),
    /// Signed 16-bit elements
    S16(&'a [i16]),
    /// Unsigned 32-bit elements
    U32(&'a [u32]),
    /// Signed 32-bit elements
    S32(&'a [i32]),
    /// Single precision float elements
    F32(&'a [f32]),
}

impl Field<'_> {
    /// The tag this field is sent with
    pub fn format(&self) -> FormatSpecifier {
        match self {
            Field::Text(_) => FormatSpecifier::Text,
            Field::U8(_) => FormatSpecifier::U8,
            Field::S8(_) => FormatSpecifier::S8,
            Field::U16(_) => FormatSpecifier::U16,
            Field::S16(_) => FormatSpecifier::S16,
            Field::U32(_) => FormatSpecifier::U32,
            Field::S32(_) => FormatSpecifier::S32,
            Field::F32(_) => FormatSpecifier::Float,
        }
    }

    /// Number of elements in the field
    pub fn len(&self) -> usize {
        match self {
            Field::Text(s) => s.len(),
            Field::U8(v) => v.len(),
            Field::S8(v) => v.len(),
            Field::U16(v) => v.len(),
            Field::S16(v) => v.len(),
            Field::U32(v) => v.len(),
            Field::S32(v) => v.len(),
            Field::F32(v) => v.len(),
        }
    }

    /// Returns true if the field has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes the field occupies in a message
    pub fn encoded_len(&self) -> usize {
        self.len() * self.format().width()
    }

    fn write(&self, out: &mut [u8]) -> usize {
        match self {
            Field::Text(s) => {
                out[..s.len()].copy_from_slice(s.as_bytes());
                s.len()
            }
            Field::U8(v) => write_elements(v, out),
            Field::S8(v) => write_elements(v, out),
            Field::U16(v) => write_elements(v, out),
            Field::S16(v) => write_elements(v, out),
            Field::U32(v) => write_elements(v, out),
            Field::S32(v) => write_elements(v, out),
            Field::F32(v) => write_elements(v, out),
        }
    }
}

fn write_elements<T: Element>(items: &[T], out: &mut [u8]) -> usize {
    let width = T::FORMAT.width();
    for (item, chunk) in items.iter().zip(out.chunks_exact_mut(width)) {
        item.write_le(chunk);
    }
    items.len() * width
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(value: &'a str) -> Self {
        Field::Text(value)
    }
}

macro_rules! impl_field_from {
    ($t:ty, $variant:ident) => {
        impl<'a> From<&'a [$t]> for Field<'a> {
            fn from(value: &'a [$t]) -> Self {
                Field::$variant(value)
            }
        }

        impl<'a, const N: usize> From<&'a [$t; N]> for Field<'a> {
            fn from(value: &'a [$t; N]) -> Self {
                Field::$variant(value.as_slice())
            }
        }
    };
}

impl_field_from!(u8, U8);
impl_field_from!(i8, S8);
impl_field_from!(u16, U16);
impl_field_from!(i16, S16);
impl_field_from!(u32, U32);
impl_field_from!(i32, S32);
impl_field_from!(f32, F32);

/// Errors building a message for transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    /// The topic specification could not be parsed
    #[snafu(display("Invalid topic specification: {source}"))]
    Topic {
        /// The parse error
        source: TopicError,
    },
    /// The number of fields does not match the topic specification
    #[snafu(display("Expected {expected} fields, got {actual}"))]
    FieldCountMismatch {
        /// Number of fields in the descriptor
        expected: usize,
        /// Number of fields provided
        actual: usize,
    },
    /// A field's type does not match the topic specification
    #[snafu(display("Field {index} does not match its declared type"))]
    FieldTypeMismatch {
        /// Index of the field
        index: usize,
    },
    /// A field's element count does not match the topic specification
    #[snafu(display("Field {index} has {actual} elements, expected {expected}"))]
    FieldLengthMismatch {
        /// Index of the field
        index: usize,
        /// Count declared by the descriptor
        expected: usize,
        /// Elements provided
        actual: usize,
    },
    /// The encoded message does not fit in the transmit buffer
    #[snafu(display("Message of {len} bytes exceeds the {capacity} byte buffer"))]
    MessageTooLong {
        /// Encoded length
        len: usize,
        /// Buffer size
        capacity: usize,
    },
}

/// Encode a message for `descriptor` into `out`
///
/// Every field must have the type declared by the descriptor and exactly `descriptor.count()`
/// elements. A text descriptor takes a single [`Field::Text`] whose length sets the count.
///
/// Returns the number of bytes written.
pub fn encode_message(
    descriptor: &TopicDescriptor<'_>,
    fields: &[Field<'_>],
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    let specifiers = descriptor.wire_fields();
    if fields.len() != specifiers.len() {
        return FieldCountMismatchSnafu {
            expected: specifiers.len(),
            actual: fields.len(),
        }
        .fail();
    }

    let count = if descriptor.is_text() {
        let text_len = fields[0].len();
        if text_len > u16::MAX as usize {
            return MessageTooLongSnafu {
                len: text_len,
                capacity: u16::MAX as usize,
            }
            .fail();
        }
        text_len
    } else {
        descriptor.count() as usize
    };

    let mut data_len = 0;
    for (index, (field, format)) in fields.iter().zip(specifiers).enumerate() {
        if field.format() != *format {
            return FieldTypeMismatchSnafu { index }.fail();
        }
        if field.len() != count {
            return FieldLengthMismatchSnafu {
                index,
                expected: count,
                actual: field.len(),
            }
            .fail();
        }
        data_len += field.encoded_len();
    }

    let topic = descriptor.topic().as_bytes();
    let len = header_len(topic.len(), specifiers.len()) + data_len;
    if len > out.len() {
        return MessageTooLongSnafu {
            len,
            capacity: out.len(),
        }
        .fail();
    }

    let mut pos = 0;
    out[..topic.len()].copy_from_slice(topic);
    pos += topic.len();
    out[pos] = 0;
    out[pos + 1] = specifiers.len() as u8;
    out[pos + 2..pos + 4].copy_from_slice(&(count as u16).to_le_bytes());
    pos += 4;

    for pair in specifiers.chunks(2) {
        let lo = u8::from(pair[0]);
        let hi = pair.get(1).map(|f| u8::from(*f)).unwrap_or(0);
        out[pos] = lo | (hi << 4);
        pos += 1;
    }

    for field in fields {
        pos += field.write(&mut out[pos..]);
    }
    debug_assert_eq!(pos, len);
    Ok(len)
}

/// Parse a topic specification and encode a message in one step
pub fn encode_spec(spec: &str, fields: &[Field<'_>], out: &mut [u8]) -> Result<usize, EncodeError> {
    let descriptor = TopicDescriptor::parse(spec).context(TopicSnafu)?;
    encode_message(&descriptor, fields, out)
}

/// Errors parsing a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum DecodeError {
    /// No NUL terminator after the topic
    MissingTerminator,
    /// The topic does not fit in a topic buffer
    TopicTooLong,
    /// The topic is not valid UTF-8
    InvalidUtf8,
    /// More fields than a message can carry
    #[snafu(display("Message declares {dimensions} fields"))]
    TooManyDimensions {
        /// Declared number of fields
        dimensions: u8,
    },
    /// A tag is not a known element type
    #[snafu(display("Unknown type tag {tag} in field {index}"))]
    UnknownFormat {
        /// Index of the field
        index: usize,
        /// Raw tag value
        tag: u8,
    },
    /// The message ends before its header or data does
    #[snafu(display("Message needs {needed} bytes, has {available}"))]
    Truncated {
        /// Length implied by the header
        needed: usize,
        /// Length received
        available: usize,
    },
}

/// Errors reading elements from a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum ElementError {
    /// The message has fewer fields than `index + 1`
    #[snafu(display("No field {index}"))]
    NoSuchField {
        /// Requested field
        index: usize,
    },
    /// The field cannot be read as the requested element type
    #[snafu(display("Field {index} has a different type"))]
    TypeMismatch {
        /// Requested field
        index: usize,
    },
    /// The destination has room for fewer elements than the field holds
    #[snafu(display("Field holds {needed} elements, destination has room for {available}"))]
    DestinationTooSmall {
        /// Element count of the field
        needed: usize,
        /// Length of the destination
        available: usize,
    },
}

/// A received message, borrowing the buffer it was decoded from
#[derive(Debug, Clone, PartialEq)]
pub struct Message<'a> {
    topic: &'a str,
    count: u16,
    specifiers: Vec<FormatSpecifier, MAX_DIMENSIONS>,
    data: &'a [u8],
}

impl<'a> Message<'a> {
    /// Parse a message from a frame payload
    ///
    /// Bytes after the last field are ignored.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let nul = match bytes.iter().position(|b| *b == 0) {
            Some(nul) => nul,
            None => return Err(DecodeError::MissingTerminator),
        };
        if nul >= MAX_TOPIC_LEN {
            return Err(DecodeError::TopicTooLong);
        }
        let topic = core::str::from_utf8(&bytes[..nul]).map_err(|_| DecodeError::InvalidUtf8)?;

        let rest = &bytes[nul + 1..];
        if rest.len() < 3 {
            return Err(DecodeError::Truncated {
                needed: nul + 4,
                available: bytes.len(),
            });
        }
        let dimensions = rest[0];
        if dimensions as usize > MAX_DIMENSIONS {
            return Err(DecodeError::TooManyDimensions { dimensions });
        }
        let count = u16::from_le_bytes([rest[1], rest[2]]);

        let header = header_len(nul, dimensions as usize);
        if bytes.len() < header {
            return Err(DecodeError::Truncated {
                needed: header,
                available: bytes.len(),
            });
        }
        let tags = &rest[3..3 + (dimensions as usize).div_ceil(2)];

        let mut specifiers = Vec::new();
        let mut data_len = 0;
        for index in 0..dimensions as usize {
            let tag = (tags[index / 2] >> (4 * (index % 2))) & 0x0F;
            let format = FormatSpecifier::from_nibble(tag)
                .ok_or(DecodeError::UnknownFormat { index, tag })?;
            data_len += format.width() * count as usize;
            specifiers
                .push(format)
                .map_err(|_| DecodeError::TooManyDimensions { dimensions })?;
        }

        if bytes.len() < header + data_len {
            return Err(DecodeError::Truncated {
                needed: header + data_len,
                available: bytes.len(),
            });
        }

        Ok(Self {
            topic,
            count,
            specifiers,
            data: &bytes[header..header + data_len],
        })
    }

    /// The topic name
    pub fn topic(&self) -> &'a str {
        self.topic
    }

    /// Number of fields
    pub fn dimensions(&self) -> usize {
        self.specifiers.len()
    }

    /// Elements per field
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Returns true if the fields hold no elements
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// All field tags, in order
    pub fn specifiers(&self) -> &[FormatSpecifier] {
        &self.specifiers
    }

    /// The tag of field `index`
    pub fn specifier(&self, index: usize) -> Option<FormatSpecifier> {
        self.specifiers.get(index).copied()
    }

    /// The raw little-endian bytes of field `index`
    pub fn field_bytes(&self, index: usize) -> Option<&'a [u8]> {
        if index >= self.specifiers.len() {
            return None;
        }
        let count = self.count as usize;
        let offset: usize = self.specifiers[..index]
            .iter()
            .map(|f| f.width() * count)
            .sum();
        let len = self.specifiers[index].width() * count;
        Some(&self.data[offset..offset + len])
    }

    /// The text of a single-field text message
    pub fn text(&self) -> Option<&'a str> {
        if self.specifiers.as_slice() != [FormatSpecifier::Text] {
            return None;
        }
        core::str::from_utf8(self.field_bytes(0)?).ok()
    }

    /// Copy the elements of field `index` into `dest`
    ///
    /// Returns the number of elements copied, which is always the message element count.
    pub fn get_elements<T: Element>(&self, index: usize, dest: &mut [T]) -> Result<usize, ElementError> {
        let format = self
            .specifier(index)
            .ok_or(ElementError::NoSuchField { index })?;
        if !T::accepts(format) {
            return Err(ElementError::TypeMismatch { index });
        }
        let count = self.count as usize;
        if dest.len() < count {
            return Err(ElementError::DestinationTooSmall {
                needed: count,
                available: dest.len(),
            });
        }
        // Checked by specifier() above
        let bytes = self.field_bytes(index).unwrap_or_default();
        for (d, chunk) in dest.iter_mut().zip(bytes.chunks_exact(format.width())) {
            *d = T::read_le(chunk);
        }
        Ok(count)
    }
}
