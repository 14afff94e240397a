//! # frame
//!
//! why: one envelope for every protocol message, with the metadata the transport acts on
//! relations: wraps handshake.rs, discovery.rs, election.rs, eligibility.rs (immutable messages)
//!            and quorum.rs (mutable accumulators); handed to an external transport as bytes
//! what: MessageType, Message, Accumulator, Payload, Frame

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codec::{self, Wire};
use crate::collab::VersionStore;
use crate::config::ClusterConfig;
use crate::discovery::Discovery;
use crate::election::{Election, Office};
use crate::eligibility::{Eligibility, EligibilityCause};
use crate::error::DecodeError;
use crate::handshake::{Connect, ConnectResponse};
use crate::node::NodeId;
use crate::quorum::{AckRound, ConfigUpdate};

const FLAG_BROADCAST: u8 = 0b001;
const FLAG_ARMED: u8 = 0b010;
const FLAG_REQUEST_ID: u8 = 0b100;

/// Dispatch tag, fixed per message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Connect,
    ConnectResponse,
    Discovery,
    Election,
    Eligibility,
    AckRound,
    ConfigUpdate,
}

impl MessageType {
    pub fn tag(self) -> u8 {
        match self {
            MessageType::Connect => 1,
            MessageType::ConnectResponse => 2,
            MessageType::Discovery => 3,
            MessageType::Election => 4,
            MessageType::Eligibility => 5,
            MessageType::AckRound => 6,
            MessageType::ConfigUpdate => 7,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        Ok(match tag {
            1 => MessageType::Connect,
            2 => MessageType::ConnectResponse,
            3 => MessageType::Discovery,
            4 => MessageType::Election,
            5 => MessageType::Eligibility,
            6 => MessageType::AckRound,
            7 => MessageType::ConfigUpdate,
            other => return Err(DecodeError::UnknownTypeTag(other)),
        })
    }
}

/// Value messages. Once framed they are only ever read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect(Connect),
    ConnectResponse(ConnectResponse),
    Discovery(Discovery),
    Election(Election),
    Eligibility(Eligibility),
}

/// Messages mutated in place as they travel from node to node.
///
/// Only the node currently holding the frame may touch it; the frame is
/// handed on by re-sending, never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    Round(AckRound),
    Update(ConfigUpdate),
}

impl Accumulator {
    pub fn round(&self) -> &AckRound {
        match self {
            Accumulator::Round(round) => round,
            Accumulator::Update(update) => update.round(),
        }
    }

    pub fn round_mut(&mut self) -> &mut AckRound {
        match self {
            Accumulator::Round(round) => round,
            Accumulator::Update(update) => update.round_mut(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.round().is_valid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Message(Message),
    Accumulator(Accumulator),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Message(Message::Connect(_)) => MessageType::Connect,
            Payload::Message(Message::ConnectResponse(_)) => MessageType::ConnectResponse,
            Payload::Message(Message::Discovery(_)) => MessageType::Discovery,
            Payload::Message(Message::Election(_)) => MessageType::Election,
            Payload::Message(Message::Eligibility(_)) => MessageType::Eligibility,
            Payload::Accumulator(Accumulator::Round(_)) => MessageType::AckRound,
            Payload::Accumulator(Accumulator::Update(_)) => MessageType::ConfigUpdate,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Payload::Message(Message::Connect(m)) => m.encode(buf),
            Payload::Message(Message::ConnectResponse(m)) => m.encode(buf),
            Payload::Message(Message::Discovery(m)) => m.encode(buf),
            Payload::Message(Message::Election(m)) => m.encode(buf),
            Payload::Message(Message::Eligibility(m)) => m.encode(buf),
            Payload::Accumulator(Accumulator::Round(m)) => m.encode(buf),
            Payload::Accumulator(Accumulator::Update(m)) => m.encode(buf),
        }
    }

    fn decode<B: Buf>(
        kind: MessageType,
        buf: &mut B,
        config: &ClusterConfig,
    ) -> Result<Self, DecodeError> {
        Ok(match kind {
            MessageType::Connect => Payload::Message(Message::Connect(Connect::decode(buf, config)?)),
            MessageType::ConnectResponse => Payload::Message(Message::ConnectResponse(
                ConnectResponse::decode(buf, config)?,
            )),
            MessageType::Discovery => {
                Payload::Message(Message::Discovery(Discovery::decode(buf, config)?))
            }
            MessageType::Election => {
                Payload::Message(Message::Election(Election::decode(buf, config)?))
            }
            MessageType::Eligibility => {
                Payload::Message(Message::Eligibility(Eligibility::decode(buf, config)?))
            }
            MessageType::AckRound => {
                Payload::Accumulator(Accumulator::Round(AckRound::decode(buf, config)?))
            }
            MessageType::ConfigUpdate => {
                Payload::Accumulator(Accumulator::Update(ConfigUpdate::decode(buf, config)?))
            }
        })
    }
}

/// Envelope around one message.
///
/// `timeout` is advisory: arming a frame asks the transport to treat the
/// exchange as failed if it goes unanswered. Nothing here runs a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    broadcast: bool,
    timeout_ms: Option<u32>,
    request_id: Option<u64>,
    payload: Payload,
}

impl Frame {
    /// Unicast, unarmed frame with no correlation id.
    pub fn new(payload: Payload) -> Self {
        Self {
            broadcast: false,
            timeout_ms: None,
            request_id: None,
            payload,
        }
    }

    pub fn message(message: Message) -> Self {
        Self::new(Payload::Message(message))
    }

    pub fn accumulator(accumulator: Accumulator) -> Self {
        Self::new(Payload::Accumulator(accumulator))
    }

    // -- builders for each protocol step --

    /// Local Connect, armed with the connect timeout. Also reports whether
    /// the software version had to be truncated.
    pub fn connect(config: &ClusterConfig, store: &impl VersionStore) -> (Self, bool) {
        let (connect, truncated) = Connect::build(config, store);
        let mut frame = Self::message(Message::Connect(connect));
        frame.arm(config.connect_timeout());
        (frame, truncated)
    }

    pub fn connect_response(response: ConnectResponse) -> Self {
        Self::message(Message::ConnectResponse(response))
    }

    /// Broadcast snapshot, armed so silent peers get noticed.
    pub fn discovery(snapshot: Discovery, config: &ClusterConfig) -> Self {
        let mut frame = Self::message(Message::Discovery(snapshot)).with_broadcast();
        frame.arm(config.discovery_timeout());
        frame
    }

    pub fn candidacy(candidate: NodeId, office: Office, config: &ClusterConfig) -> Self {
        Self::election(Election::candidacy(candidate, office), config)
    }

    pub fn election_notification(node: NodeId, office: Office, config: &ClusterConfig) -> Self {
        Self::election(Election::notification(node, office), config)
    }

    fn election(election: Election, config: &ClusterConfig) -> Self {
        let mut frame = Self::message(Message::Election(election)).with_broadcast();
        frame.arm(config.election_timeout());
        frame
    }

    pub fn eligibility(cause: EligibilityCause, config: &ClusterConfig) -> Self {
        let mut frame = Self::message(Message::Eligibility(Eligibility::new(cause)));
        frame.arm(config.notification_timeout());
        frame
    }

    /// Rollout frame, armed with the update timeout and tagged for correlation.
    pub fn config_update(update: ConfigUpdate, request_id: u64, config: &ClusterConfig) -> Self {
        let mut frame = Self::accumulator(Accumulator::Update(update)).with_request_id(request_id);
        frame.arm(config.update_timeout());
        frame
    }

    // -- envelope metadata --

    /// Ask the transport to fail the exchange if unanswered within `timeout`.
    /// Sub-millisecond precision is dropped.
    pub fn arm(&mut self, timeout: Duration) {
        self.timeout_ms = Some(timeout.as_millis().min(u32::MAX as u128) as u32);
    }

    pub fn with_broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn is_armed(&self) -> bool {
        self.timeout_ms.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(|ms| Duration::from_millis(ms.into()))
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn as_message(&self) -> Option<&Message> {
        match &self.payload {
            Payload::Message(message) => Some(message),
            Payload::Accumulator(_) => None,
        }
    }

    pub fn as_accumulator(&self) -> Option<&Accumulator> {
        match &self.payload {
            Payload::Accumulator(accumulator) => Some(accumulator),
            Payload::Message(_) => None,
        }
    }

    /// Mutable access exists for accumulators only.
    pub fn accumulator_mut(&mut self) -> Option<&mut Accumulator> {
        match &mut self.payload {
            Payload::Accumulator(accumulator) => Some(accumulator),
            Payload::Message(_) => None,
        }
    }

    // -- wire form --

    pub fn encode(&self, buf: &mut BytesMut) {
        let mut flags = 0;
        if self.broadcast {
            flags |= FLAG_BROADCAST;
        }
        if self.timeout_ms.is_some() {
            flags |= FLAG_ARMED;
        }
        if self.request_id.is_some() {
            flags |= FLAG_REQUEST_ID;
        }
        buf.put_u8(self.message_type().tag());
        buf.put_u8(flags);
        if let Some(ms) = self.timeout_ms {
            buf.put_u32(ms);
        }
        if let Some(id) = self.request_id {
            buf.put_u64(id);
        }
        self.payload.encode(buf);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        trace!(kind = ?self.message_type(), len = buf.len(), "frame encoded");
        buf.freeze()
    }

    /// Decode one complete frame. Leftover bytes are an error.
    pub fn from_bytes(mut data: &[u8], config: &ClusterConfig) -> Result<Self, DecodeError> {
        let kind = MessageType::from_tag(codec::get_u8(&mut data)?)?;
        let flags = codec::get_u8(&mut data)?;
        if flags & !(FLAG_BROADCAST | FLAG_ARMED | FLAG_REQUEST_ID) != 0 {
            return Err(DecodeError::InvalidCode {
                field: "frame flags",
                code: flags.into(),
            });
        }
        let timeout_ms = if flags & FLAG_ARMED != 0 {
            Some(codec::get_u32(&mut data)?)
        } else {
            None
        };
        let request_id = if flags & FLAG_REQUEST_ID != 0 {
            Some(codec::get_u64(&mut data)?)
        } else {
            None
        };
        let payload = Payload::decode(kind, &mut data, config)?;
        if data.has_remaining() {
            return Err(DecodeError::TrailingBytes(data.remaining()));
        }
        trace!(?kind, "frame decoded");
        Ok(Self {
            broadcast: flags & FLAG_BROADCAST != 0,
            timeout_ms,
            request_id,
            payload,
        })
    }
}
