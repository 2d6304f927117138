//! Wire values and capacities shared by both ends of the link

/// Start of frame marker. Never escaped when used as a delimiter.
pub const SOF: u8 = 0xF7;
/// End of frame marker
pub const EOF: u8 = 0x7F;
/// Escape marker. The byte following it was XORed with [`ESC_XOR`].
pub const ESC: u8 = 0xF6;
/// Value XORed into an escaped byte
pub const ESC_XOR: u8 = 0x20;

/// Maximum number of typed fields in one message
pub const MAX_DIMENSIONS: usize = 4;
/// Size of a topic buffer, including the NUL terminator
pub const MAX_TOPIC_LEN: usize = 16;
/// Longest topic name, in bytes
pub const MAX_TOPIC_CHARS: usize = MAX_TOPIC_LEN - 1;
/// Number of subscription slots in a dispatcher
pub const MAX_SUBSCRIPTIONS: usize = 4;
/// Default size of the transmit staging buffer, i.e. the largest unframed outgoing message
pub const MAX_TRANSMIT_MESSAGE_LEN: usize = 128;
/// Default size of the receive accumulation buffer
pub const RX_FRAME_LEN: usize = 64;

/// Number of task slots in a scheduler
pub const MAX_TASKS: usize = 10;
/// Tick count at which the scheduler rebases its time base to zero
pub const ROLLOVER_TICKS: u32 = 0x7FF0_0000;

/// Number of bytes in the message header which follow the topic terminator (dimensions and
/// element count)
pub const MESSAGE_HEADER_LEN: usize = 3;

/// Returns true if `byte` must be escaped inside a frame
pub const fn is_reserved(byte: u8) -> bool {
    byte == SOF || byte == EOF || byte == ESC
}
