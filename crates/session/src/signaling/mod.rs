//! Signaling: envelope types, outbound sinks and the leader relay

pub mod protocol;
pub mod relay;
pub mod sink;

pub use protocol::{
    message_type, ClaimPayload, Envelope, ErrorPayload, LeadershipState, Participant,
    ResultPayload, ResultTag, RoomInfo, SignalingMessage, TagKind,
};
pub use relay::{LeaderRelay, RelayMember, RelaySink};
pub use sink::{send_detached, ChannelSink, SignalingSink};
