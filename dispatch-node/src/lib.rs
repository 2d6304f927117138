//! A serial publish/subscribe runtime and cooperative scheduler for small instruments
//!
//! Dispatch-node lets firmware exchange named, typed arrays with a host over a plain byte stream,
//! such as a UART. It is no_std, performs no heap allocation, and is built to run on small
//! microcontrollers alongside a handful of interrupt handlers. It provides:
//!
//! * A [`Framer`] which delimits, escapes and checksums each message, and reassembles frames
//!   from an interrupt-fed receive queue while discarding noise and corrupt frames.
//! * A [`Dispatcher`] which publishes typed arrays on a topic, and invokes subscriber callbacks
//!   when a message arrives on a topic they subscribed to.
//! * A [`Scheduler`] which runs periodic tasks from a single foreground loop, driven by a
//!   [`TimeBase`] advanced by a timer interrupt.
//!
//! The wire formats live in [dispatch-common](common), which is re-exported here so host tooling
//! and firmware agree on them.
//!
//! # Getting Started
//!
//! ## Serial buffers
//!
//! The UART interrupt handlers and the foreground share a [`SerialBuffers`], which is usually a
//! static:
//!
//! ```ignore
//! static SERIAL: SerialBuffers<64, 256> = SerialBuffers::new();
//!
//! #[interrupt]
//! fn UART0() {
//!     while let Some(byte) = uart.read_byte() {
//!         SERIAL.on_receive(byte);
//!     }
//!     while uart.tx_ready() {
//!         match SERIAL.next_transmit() {
//!             Some(byte) => uart.write_byte(byte),
//!             None => break,
//!         }
//!     }
//! }
//! ```
//!
//! ## Time base
//!
//! A timer interrupt advances a [`TimeBase`] once per tick:
//!
//! ```ignore
//! static TIME: TimeBase = TimeBase::new();
//!
//! #[interrupt]
//! fn TIMER0() {
//!     TIME.tick();
//! }
//! ```
//!
//! ## Tasks and topics
//!
//! Topics are described by a short specification string, `"<topic>[:<count>][,<type>]*"`, which
//! [`topic!`](common::topic) parses at compile time. Tasks and subscribers are plain functions
//! taking the application context:
//!
//! ```ignore
//! use dispatch_node::common::{topic, Message, TopicDescriptor};
//!
//! const VI: TopicDescriptor<'static> = topic!("vi:64,s8,s8");
//!
//! struct App {
//!     // "vi" encodes to 135 bytes, more than the default 128 byte staging buffer
//!     link: Dispatcher<SerialPort<'static, 64, 256>, Settings, 64, 160>,
//!     settings: Settings,
//!     voltage: [i8; 64],
//!     current: [i8; 64],
//! }
//!
//! fn change_omega(settings: &mut Settings, msg: &Message<'_>) {
//!     let mut omega = [0u16; 1];
//!     if msg.get_elements(0, &mut omega).is_ok() {
//!         settings.omega = omega[0];
//!     }
//! }
//!
//! fn process(app: &mut App) {
//!     app.link.process(&mut app.settings);
//! }
//!
//! fn send_vi(app: &mut App) {
//!     let _ = app.link.publish(&VI, &[(&app.voltage).into(), (&app.current).into()]);
//! }
//!
//! fn main() -> ! {
//!     let mut app = App { link: Dispatcher::new(SERIAL.port()), .. };
//!     app.link.subscribe("omega", change_omega).unwrap();
//!
//!     let mut scheduler: Scheduler<App> = Scheduler::new(&TIME);
//!     scheduler.add(process, 1).unwrap();
//!     scheduler.add(send_vi, 500).unwrap();
//!     scheduler.manage(&mut app, || watchdog.feed())
//! }
//! ```
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod dispatcher;
mod framer;
mod scheduler;
mod time;
mod transport;

pub use dispatch_common as common;

pub use dispatcher::{DispatchError, DispatchStats, Dispatcher, Subscriber};
pub use framer::Framer;
pub use scheduler::{Scheduler, SchedulerError, TaskFn};
pub use time::TimeBase;
pub use transport::{SerialBuffers, SerialPort, Transport};

#[doc(hidden)]
pub use critical_section;
