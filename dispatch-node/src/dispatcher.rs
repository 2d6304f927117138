//! Topic publish and subscribe over a framed link
//!
//! The [`Dispatcher`] owns everything the link needs: the [`Framer`], a staging buffer for
//! outgoing messages, a buffer for the frame being dispatched, and a small table of
//! subscriptions. Subscribers are plain functions taking the application state `S` and the
//! received [`Message`]:
//!
//! ```
//! use dispatch_node::{common::Message, Dispatcher, SerialBuffers};
//!
//! #[derive(Default)]
//! struct State {
//!     omega: u16,
//! }
//!
//! fn on_omega(state: &mut State, msg: &Message<'_>) {
//!     let mut value = [0u16; 1];
//!     if msg.get_elements(0, &mut value).is_ok() {
//!         state.omega = value[0];
//!     }
//! }
//!
//! static SERIAL: SerialBuffers = SerialBuffers::new();
//!
//! let mut dispatcher: Dispatcher<_, State> = Dispatcher::new(SERIAL.port());
//! dispatcher.subscribe("omega", on_omega).unwrap();
//!
//! let mut state = State::default();
//! // Called periodically, e.g. from a scheduled task
//! dispatcher.process(&mut state);
//! ```
//!
//! The message handed to a subscriber borrows the dispatcher's receive buffer, so it is only
//! valid for the duration of the callback.
use defmt_or_log::{debug, info, trace, warn};
use dispatch_common::{
    constants::{MAX_SUBSCRIPTIONS, MAX_TOPIC_CHARS, MAX_TRANSMIT_MESSAGE_LEN, RX_FRAME_LEN},
    frame::FrameStats,
    message::{encode_message, encode_spec, EncodeError, Field, Message},
    topic::TopicDescriptor,
};
use embedded_io::Error as _;
use heapless::String;
use snafu::{ResultExt, Snafu};

use crate::{framer::Framer, transport::Transport};

/// Signature of a subscriber callback
pub type Subscriber<S> = fn(&mut S, &Message<'_>);

/// Errors returned by the [`Dispatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum DispatchError {
    /// All subscription slots are in use
    SubscriptionTableFull,
    /// A topic name is empty, contains NUL, or is longer than a topic buffer allows
    #[snafu(display("Topic of {len} bytes is not a valid topic name"))]
    InvalidTopic {
        /// Length of the rejected topic
        len: usize,
    },
    /// The message could not be encoded
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The encoder error
        source: EncodeError,
    },
    /// The transport failed while sending
    #[snafu(display("Transport error: {kind:?}"))]
    Transport {
        /// Kind of the transport error
        kind: embedded_io::ErrorKind,
    },
}

struct Subscription<S> {
    topic: String<MAX_TOPIC_CHARS>,
    callback: Subscriber<S>,
}

/// Counters describing the traffic seen by a [`Dispatcher`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Framing counters
    pub frames: FrameStats,
    /// Messages sent
    pub published: u32,
    /// Valid frames received
    pub received: u32,
    /// Received frames whose payload was not a valid message
    pub decode_errors: u32,
    /// Received messages which matched no subscription
    pub unhandled: u32,
}

/// Publish/subscribe endpoint of a serial link
///
/// - `T`: the [`Transport`] carrying the frames
/// - `S`: state passed to subscriber callbacks
/// - `RX`: receive accumulation buffer size, which bounds the longest receivable frame
/// - `TX`: transmit staging buffer size, which bounds the longest message
#[allow(missing_debug_implementations)]
pub struct Dispatcher<
    T,
    S = (),
    const RX: usize = RX_FRAME_LEN,
    const TX: usize = MAX_TRANSMIT_MESSAGE_LEN,
> {
    framer: Framer<T, RX>,
    tx_buf: [u8; TX],
    rx_buf: [u8; RX],
    subscriptions: [Option<Subscription<S>>; MAX_SUBSCRIPTIONS],
    published: u32,
    received: u32,
    decode_errors: u32,
    unhandled: u32,
}

impl<T: Transport, S, const RX: usize, const TX: usize> Dispatcher<T, S, RX, TX> {
    /// Create a dispatcher on `transport` with no subscriptions
    pub fn new(transport: T) -> Self {
        Self {
            framer: Framer::new(transport),
            tx_buf: [0; TX],
            rx_buf: [0; RX],
            subscriptions: [const { None }; MAX_SUBSCRIPTIONS],
            published: 0,
            received: 0,
            decode_errors: 0,
            unhandled: 0,
        }
    }

    /// Access the framer
    pub fn framer(&self) -> &Framer<T, RX> {
        &self.framer
    }

    /// Mutably access the framer
    pub fn framer_mut(&mut self) -> &mut Framer<T, RX> {
        &mut self.framer
    }

    /// Publish a message on the topic described by `descriptor`
    ///
    /// `fields` must match the descriptor in number, type and element count. Blocks until the
    /// frame has been handed to the transport.
    pub fn publish(
        &mut self,
        descriptor: &TopicDescriptor<'_>,
        fields: &[Field<'_>],
    ) -> Result<(), DispatchError> {
        let len = encode_message(descriptor, fields, &mut self.tx_buf).context(EncodeSnafu)?;
        self.send(len)
    }

    /// Parse `spec` and publish a message
    ///
    /// Prefer [`publish`](Self::publish) with a descriptor built once by
    /// [`topic!`](dispatch_common::topic), which skips the parse.
    pub fn publish_spec(&mut self, spec: &str, fields: &[Field<'_>]) -> Result<(), DispatchError> {
        let len = encode_spec(spec, fields, &mut self.tx_buf).context(EncodeSnafu)?;
        self.send(len)
    }

    fn send(&mut self, len: usize) -> Result<(), DispatchError> {
        self.framer
            .push(&self.tx_buf[..len])
            .map_err(|e| DispatchError::Transport { kind: e.kind() })?;
        self.published = self.published.wrapping_add(1);
        trace!("Published message of {} bytes", len);
        Ok(())
    }

    /// Register `callback` for messages on `topic`
    ///
    /// The first free slot is used, and its index returned. A topic may have several
    /// subscriptions, and they are invoked in slot order.
    pub fn subscribe(
        &mut self,
        topic: &str,
        callback: Subscriber<S>,
    ) -> Result<usize, DispatchError> {
        if topic.is_empty() || topic.as_bytes().contains(&0) {
            return InvalidTopicSnafu { len: topic.len() }.fail();
        }
        let mut name = String::new();
        name.push_str(topic)
            .map_err(|_| DispatchError::InvalidTopic { len: topic.len() })?;

        let Some((slot, entry)) = self
            .subscriptions
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.is_none())
        else {
            warn!("Subscription table full");
            return SubscriptionTableFullSnafu.fail();
        };
        *entry = Some(Subscription {
            topic: name,
            callback,
        });
        info!("Subscribed slot {}", slot);
        Ok(slot)
    }

    /// Remove every subscription using `callback`
    ///
    /// Returns the number of slots cleared. Other slots keep their positions.
    pub fn unsubscribe(&mut self, callback: Subscriber<S>) -> usize {
        let mut removed = 0;
        for slot in self.subscriptions.iter_mut() {
            if slot
                .as_ref()
                .is_some_and(|s| core::ptr::fn_addr_eq(s.callback, callback))
            {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} subscriptions", removed);
        }
        removed
    }

    /// Number of occupied subscription slots
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().flatten().count()
    }

    /// Receive at most one frame and deliver it to every matching subscriber
    ///
    /// Returns the number of callbacks invoked. Frames which fail to decode, and messages no one
    /// subscribed to, are dropped and counted in [`stats`](Self::stats).
    pub fn process(&mut self, state: &mut S) -> usize {
        let len = self.framer.pull(&mut self.rx_buf);
        if len == 0 {
            return 0;
        }
        self.received = self.received.wrapping_add(1);

        let msg = match Message::decode(&self.rx_buf[..len]) {
            Ok(msg) => msg,
            Err(_) => {
                debug!("Dropping undecodable message of {} bytes", len);
                self.decode_errors = self.decode_errors.wrapping_add(1);
                return 0;
            }
        };

        let mut invoked = 0;
        for sub in self.subscriptions.iter().flatten() {
            if sub.topic.as_str() == msg.topic() {
                (sub.callback)(state, &msg);
                invoked += 1;
            }
        }
        if invoked == 0 {
            trace!("No subscriber for received topic");
            self.unhandled = self.unhandled.wrapping_add(1);
        }
        invoked
    }

    /// Traffic counters
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            frames: self.framer.stats(),
            published: self.published,
            received: self.received,
            decode_errors: self.decode_errors,
            unhandled: self.unhandled,
        }
    }
}
