//! Topic specifications
//!
//! A publish names its topic and the layout of its fields with a short specification string:
//!
//! ```text
//! <topic>[:<count>][,<type>]*
//! ```
//!
//! where `<type>` is one of `u8`, `s8`, `u16`, `s16`, `u32`, `s32`, `f` or `st`, and `<count>`
//! is the number of elements in every field (1 if omitted). For example `"vi:64,s8,s8"` is two
//! arrays of 64 signed bytes on topic `vi`. A specification with no types, like `"log"`, is a
//! text publish, and so is one with the single type `st`.
//!
//! Parsing is a `const fn`, so a descriptor can be built once at compile time with [`topic!`]
//! and reused for every publish.
//!
//! [`topic!`]: crate::topic!
use snafu::Snafu;

use crate::{
    constants::{MAX_DIMENSIONS, MAX_TOPIC_CHARS},
    format::FormatSpecifier,
};

/// Errors in a topic specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum TopicError {
    /// The topic name is empty
    EmptyTopic,
    /// The topic name contains a NUL byte
    NulInTopic,
    /// The topic name is longer than the topic buffer allows
    #[snafu(display("Topic name of {len} bytes exceeds the {max} byte limit"))]
    TopicTooLong {
        /// Length of the topic name
        len: usize,
        /// Longest allowed topic name
        max: usize,
    },
    /// The element count is not a decimal number in the u16 range
    InvalidCount,
    /// A type code is not recognized
    #[snafu(display("Unknown type code in field {index}"))]
    UnknownType {
        /// Index of the offending field
        index: usize,
    },
    /// More typed fields than a message can carry
    #[snafu(display("More than {max} fields"))]
    TooManyDimensions {
        /// Maximum number of fields
        max: usize,
    },
    /// `st` was combined with other types
    TextNotAlone,
}

/// A parsed topic specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicDescriptor<'a> {
    spec: &'a str,
    topic_len: usize,
    count: u16,
    dimensions: usize,
    specifiers: [FormatSpecifier; MAX_DIMENSIONS],
}

impl<'a> TopicDescriptor<'a> {
    /// Parse a specification string
    pub const fn parse(spec: &'a str) -> Result<Self, TopicError> {
        let bytes = spec.as_bytes();
        let len = bytes.len();

        let mut i = 0;
        while i < len && bytes[i] != b':' && bytes[i] != b',' {
            if bytes[i] == 0 {
                return Err(TopicError::NulInTopic);
            }
            i += 1;
        }
        if i == 0 {
            return Err(TopicError::EmptyTopic);
        }
        if i > MAX_TOPIC_CHARS {
            return Err(TopicError::TopicTooLong {
                len: i,
                max: MAX_TOPIC_CHARS,
            });
        }
        let topic_len = i;

        let mut count = 1u16;
        if i < len && bytes[i] == b':' {
            i += 1;
            let start = i;
            let mut value = 0u32;
            while i < len && bytes[i] != b',' {
                if !bytes[i].is_ascii_digit() {
                    return Err(TopicError::InvalidCount);
                }
                value = value * 10 + (bytes[i] - b'0') as u32;
                if value > u16::MAX as u32 {
                    return Err(TopicError::InvalidCount);
                }
                i += 1;
            }
            if i == start {
                return Err(TopicError::InvalidCount);
            }
            // The firmware treats a zero count as one
            if value > 0 {
                count = value as u16;
            }
        }

        let mut specifiers = [FormatSpecifier::Unset; MAX_DIMENSIONS];
        let mut dimensions = 0;
        let mut has_text = false;
        while i < len {
            // bytes[i] is the ',' ahead of a type code
            i += 1;
            let start = i;
            while i < len && bytes[i] != b',' {
                i += 1;
            }
            let (_, rest) = bytes.split_at(start);
            let (code, _) = rest.split_at(i - start);
            let format = match FormatSpecifier::from_code(code) {
                Some(format) => format,
                None => return Err(TopicError::UnknownType { index: dimensions }),
            };
            if dimensions == MAX_DIMENSIONS {
                return Err(TopicError::TooManyDimensions {
                    max: MAX_DIMENSIONS,
                });
            }
            if matches!(format, FormatSpecifier::Text) {
                has_text = true;
            }
            specifiers[dimensions] = format;
            dimensions += 1;
        }
        if has_text && dimensions > 1 {
            return Err(TopicError::TextNotAlone);
        }

        Ok(Self {
            spec,
            topic_len,
            count,
            dimensions,
            specifiers,
        })
    }

    /// The full specification string this descriptor was parsed from
    pub fn spec(&self) -> &'a str {
        self.spec
    }

    /// The topic name
    pub fn topic(&self) -> &'a str {
        // Split point is at an ASCII ':' or ',' or the end, so always a char boundary
        &self.spec[..self.topic_len]
    }

    /// Element count shared by every field. Meaningless for text publishes, whose count is the
    /// length of the text.
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Number of typed fields declared by the topic string
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The typed fields declared by the topic string, in order
    ///
    /// Empty for a bare text publish.
    pub fn specifiers(&self) -> &[FormatSpecifier] {
        &self.specifiers[..self.dimensions]
    }

    /// The tags which will be put on the wire
    ///
    /// A bare text publish is sent as a single text field.
    pub fn wire_fields(&self) -> &[FormatSpecifier] {
        if self.dimensions == 0 {
            &[FormatSpecifier::Text]
        } else {
            self.specifiers()
        }
    }

    /// Returns true if this descriptor publishes a single text string
    pub fn is_text(&self) -> bool {
        self.dimensions == 0 || self.specifiers[0] == FormatSpecifier::Text
    }

    /// Size of the encoded message, for descriptors with a fixed layout
    ///
    /// Returns `None` for text publishes, whose size depends on the text.
    pub fn encoded_len(&self) -> Option<usize> {
        if self.is_text() {
            return None;
        }
        let data: usize = self
            .specifiers()
            .iter()
            .map(|f| f.width() * self.count as usize)
            .sum();
        Some(header_len(self.topic_len, self.dimensions) + data)
    }
}

/// Size of the message header: topic, NUL, dimensions, count, and packed tags
pub(crate) const fn header_len(topic_len: usize, dimensions: usize) -> usize {
    topic_len + 1 + crate::constants::MESSAGE_HEADER_LEN + dimensions.div_ceil(2)
}

/// Build a [`TopicDescriptor`] at compile time
///
/// A malformed specification fails the build.
///
/// ```
/// use dispatch_common::{topic, FormatSpecifier};
///
/// const VI: dispatch_common::TopicDescriptor<'static> = topic!("vi:64,s8,s8");
/// assert_eq!("vi", VI.topic());
/// assert_eq!(64, VI.count());
/// assert_eq!(&[FormatSpecifier::S8, FormatSpecifier::S8], VI.specifiers());
/// ```
#[macro_export]
macro_rules! topic {
    ($spec:expr) => {
        const {
            match $crate::topic::TopicDescriptor::parse($spec) {
                Ok(descriptor) => descriptor,
                Err(_) => panic!("invalid topic specification"),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::assert_contains;

    #[test]
    fn test_parse_array() {
        let d = TopicDescriptor::parse("vi:64,s8,s8").unwrap();
        assert_eq!("vi", d.topic());
        assert_eq!(64, d.count());
        assert_eq!(&[FormatSpecifier::S8, FormatSpecifier::S8], d.specifiers());
        assert!(!d.is_text());
        // "vi" NUL dims count(2) tags(1) data(128)
        assert_eq!(Some(2 + 1 + 3 + 1 + 128), d.encoded_len());
    }

    #[test]
    fn test_parse_defaults_count() {
        let d = TopicDescriptor::parse("omega,u16").unwrap();
        assert_eq!("omega", d.topic());
        assert_eq!(1, d.count());
        assert_eq!(&[FormatSpecifier::U16], d.specifiers());
    }

    #[test]
    fn test_parse_zero_count_is_one() {
        let d = TopicDescriptor::parse("t:0,u8").unwrap();
        assert_eq!(1, d.count());
    }

    #[test]
    fn test_parse_all_types() {
        let d = TopicDescriptor::parse("all:2,u8,s16,u32,f").unwrap();
        assert_eq!(
            &[
                FormatSpecifier::U8,
                FormatSpecifier::S16,
                FormatSpecifier::U32,
                FormatSpecifier::Float
            ],
            d.specifiers()
        );
    }

    #[test]
    fn test_parse_text() {
        let bare = TopicDescriptor::parse("log").unwrap();
        assert!(bare.is_text());
        assert!(bare.specifiers().is_empty());
        assert_eq!(&[FormatSpecifier::Text], bare.wire_fields());
        assert_eq!(None, bare.encoded_len());

        let explicit = TopicDescriptor::parse("log,st").unwrap();
        assert!(explicit.is_text());
        assert_eq!(&[FormatSpecifier::Text], explicit.wire_fields());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Err(TopicError::EmptyTopic), TopicDescriptor::parse(":3,u8"));
        assert_eq!(Err(TopicError::EmptyTopic), TopicDescriptor::parse(""));
        assert_eq!(Err(TopicError::NulInTopic), TopicDescriptor::parse("a\0b"));
        assert_eq!(
            Err(TopicError::TopicTooLong { len: 16, max: 15 }),
            TopicDescriptor::parse("abcdefghijklmnop,u8")
        );
        assert_eq!(Err(TopicError::InvalidCount), TopicDescriptor::parse("t:,u8"));
        assert_eq!(Err(TopicError::InvalidCount), TopicDescriptor::parse("t:x,u8"));
        assert_eq!(Err(TopicError::InvalidCount), TopicDescriptor::parse("t:70000,u8"));
        assert_eq!(
            Err(TopicError::UnknownType { index: 1 }),
            TopicDescriptor::parse("t,u8,u64")
        );
        assert_eq!(
            Err(TopicError::UnknownType { index: 0 }),
            TopicDescriptor::parse("t,")
        );
        assert_eq!(
            Err(TopicError::TooManyDimensions { max: 4 }),
            TopicDescriptor::parse("t,u8,u8,u8,u8,u8")
        );
        assert_eq!(
            Err(TopicError::TextNotAlone),
            TopicDescriptor::parse("t,st,u8")
        );
    }

    #[test]
    fn test_error_display() {
        let err = TopicDescriptor::parse("t,u8,u8,u8,u8,u8").unwrap_err();
        assert_contains!(err.to_string().as_str(), "More than 4 fields");
    }

    #[test]
    fn test_macro_const() {
        const D: TopicDescriptor<'static> = crate::topic!("m:2,u8,s16");
        assert_eq!("m", D.topic());
        assert_eq!(2, D.count());
        assert_eq!("m:2,u8,s16", D.spec());
    }
}
