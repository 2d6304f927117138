//! Link config file
//!
//! A LinkConfig is loaded from a TOML file and describes the topics exchanged over one serial link,
//! so that firmware and host tooling can agree on the topic specifications and how often each
//! topic is published.
//!
//! # An example TOML file
//!
//! ```toml
//! # Rate of the scheduler tick interrupt
//! tick_hz = 1000
//! # Size of the device transmit staging buffer. "vi" below encodes to 135 bytes.
//! max_message_len = 160
//!
//! [[topics]]
//! spec = "vi:64,s8,s8"
//! direction = "publish"
//! period_ms = 20
//!
//! [[topics]]
//! spec = "omega,u16"
//! direction = "subscribe"
//!
//! [[topics]]
//! spec = "log"
//! direction = "publish"
//! ```
//!
//! Every spec is parsed with the same parser the device uses at run time. Topic names must be
//! unique, and fixed layout topics must fit in `max_message_len` once encoded.
use std::collections::HashSet;

use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};

use crate::{
    constants::MAX_TRANSMIT_MESSAGE_LEN,
    topic::{TopicDescriptor, TopicError},
};

/// Error returned when loading a link config fails
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// An IO error occured while reading the file
    #[snafu(display("IO error: {source}"))]
    Io {
        /// The underlying IO error
        source: std::io::Error,
    },
    /// An error occured in the TOML parser
    #[snafu(display("Toml parse error: {source}"))]
    TomlParsing {
        /// The toml error which led to this error
        source: toml::de::Error,
    },
    /// A topic specification failed to parse
    #[snafu(display("Invalid topic spec {spec:?}: {source}"))]
    InvalidTopic {
        /// The offending spec string
        spec: String,
        /// The parse error
        source: TopicError,
    },
    /// Multiple topics with the same name
    #[snafu(display("Multiple definitions for topic {topic:?}"))]
    DuplicateTopic {
        /// The topic which was defined more than once
        topic: String,
    },
    /// A topic's encoded message is larger than the transmit buffer
    #[snafu(display("Topic {topic:?} encodes to {len} bytes, more than the {capacity} byte limit"))]
    MessageTooLarge {
        /// The topic name
        topic: String,
        /// Encoded message length
        len: usize,
        /// Configured transmit buffer size
        capacity: usize,
    },
    /// The tick rate is zero
    #[snafu(display("tick_hz must be non-zero"))]
    ZeroTickRate,
}

/// Which side of the link publishes a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The device publishes this topic to the host
    Publish,
    /// The device subscribes to this topic from the host
    Subscribe,
}

/// One topic carried by the link
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicConfig {
    /// Topic specification, e.g. `"vi:64,s8,s8"`
    pub spec: String,
    /// Direction of the topic
    pub direction: Direction,
    /// Publish period, for topics published from a scheduled task
    #[serde(default)]
    pub period_ms: Option<u32>,
}

fn default_tick_hz() -> u32 {
    1000
}

fn default_max_message_len() -> usize {
    MAX_TRANSMIT_MESSAGE_LEN
}

/// Configuration of a serial link
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Rate of the scheduler tick, in Hz
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Largest message the device can stage for transmit
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Topics carried by the link
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

impl LinkConfig {
    /// Try to read a config from a file
    pub fn load(config_path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let config_str = std::fs::read_to_string(&config_path).context(IoSnafu)?;
        Self::load_from_str(&config_str)
    }

    /// Try to read a config from a &str
    pub fn load_from_str(config_str: &str) -> Result<Self, LoadError> {
        let config: LinkConfig = toml::from_str(config_str).context(TomlParsingSnafu)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.tick_hz == 0 {
            return ZeroTickRateSnafu.fail();
        }
        let mut found = HashSet::new();
        for topic in &self.topics {
            let descriptor =
                TopicDescriptor::parse(&topic.spec).context(InvalidTopicSnafu { spec: &topic.spec })?;
            if !found.insert(descriptor.topic()) {
                return DuplicateTopicSnafu {
                    topic: descriptor.topic(),
                }
                .fail();
            }
            if let Some(len) = descriptor.encoded_len() {
                if len > self.max_message_len {
                    return MessageTooLargeSnafu {
                        topic: descriptor.topic(),
                        len,
                        capacity: self.max_message_len,
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }

    /// Get the parsed descriptor for a topic by name
    pub fn descriptor(&self, topic: &str) -> Option<TopicDescriptor<'_>> {
        self.descriptors().find(|d| d.topic() == topic)
    }

    /// Iterate the parsed descriptors of all topics
    pub fn descriptors(&self) -> impl Iterator<Item = TopicDescriptor<'_>> + '_ {
        // Every spec was validated on load
        self.topics
            .iter()
            .filter_map(|t| TopicDescriptor::parse(&t.spec).ok())
    }

    /// Get the config entry for a topic by name
    pub fn topic(&self, topic: &str) -> Option<&TopicConfig> {
        self.topics.iter().find(|t| {
            TopicDescriptor::parse(&t.spec)
                .map(|d| d.topic() == topic)
                .unwrap_or(false)
        })
    }

    /// The publish period of a topic converted to scheduler ticks
    ///
    /// Returns None if the topic is unknown or has no period. A non-zero period always converts to
    /// at least one tick.
    pub fn period_ticks(&self, topic: &str) -> Option<u32> {
        let period_ms = self.topic(topic)?.period_ms?;
        let ticks = period_ms as u64 * self.tick_hz as u64 / 1000;
        let ticks = if period_ms > 0 { ticks.max(1) } else { 0 };
        Some(ticks.min(u32::MAX as u64) as u32)
    }
}
