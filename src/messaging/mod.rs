pub mod codec;
pub mod in_process;
pub mod redpanda;
pub mod topics;
pub mod transport;

pub use codec::{
    decode_command, decode_inbound, encode, AckMessage, AckStatus, CodecError, CommandItem,
    CommandMessage, InboundMessage, TelemetryMessage,
};
pub use in_process::InProcessChannel;
pub use redpanda::RedpandaChannel;
pub use topics::{MachineTopics, TopicKind};
pub use transport::{ChannelError, ChannelMessage, ChannelTransport};
