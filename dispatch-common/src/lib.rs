//! Wire-level code shared by dispatch devices and hosts.
//!
//! The serial link carries *frames*: SOF delimited, byte stuffed, Fletcher-16 terminated
//! payloads. Each frame payload is one *message*: a NUL terminated topic name followed by up to
//! four typed arrays which all share one element count.
//!
//! Most firmware will use this crate through `dispatch-node`, which re-exports it as `common`.
//! Host tooling can use it directly to build and parse the same byte streams.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod constants;
pub mod fletcher;
pub mod format;
pub mod frame;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod link_config;
pub mod message;
pub mod topic;

pub use fletcher::fletcher16;
pub use format::{Element, FormatSpecifier};
pub use frame::{encode_frame, FrameAccumulator, FrameError, FrameStats};
pub use message::{encode_message, encode_spec, DecodeError, ElementError, EncodeError, Field, Message};
pub use topic::{TopicDescriptor, TopicError};
