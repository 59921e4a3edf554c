//! Replication messages carried inside a packet payload.
//!
//! A payload is a plain concatenation of messages, each encoded with bincode's
//! default options as `tick_id:u64 kind:u32 body`. Bodies are fixed-size, so
//! a message's length depends only on its kind.

use crate::object::{ObjectKey, ObjectSyncState, TickInput};
use crate::{NET_MAX_INPUT_TICKS, NET_MAX_PAYLOAD_SIZE};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of defined message kinds; kind values are `0..MESSAGE_KIND_COUNT`.
pub const MESSAGE_KIND_COUNT: u32 = 6;
const MESSAGE_KIND_OFFSET: usize = 8;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message of {needed} bytes does not fit, {remaining} bytes left in payload")]
    PayloadFull { needed: usize, remaining: usize },
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("truncated message: {0} trailing bytes")]
    Truncated(usize),
    #[error("failed to encode message: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode message: {0}")]
    Decode(bincode::Error),
}

/// Auto-layout hint for arranging one window per connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowLayout {
    pub user_count: u32,
    pub px: i32,
    pub py: i32,
    pub w: i32,
    pub h: i32,
}

/// Message kinds. Variant order defines the `kind` value on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    Ping,
    ObjUpdate {
        net_index: u32,
        sync: ObjectSyncState,
    },
    ObjEmpty {
        net_index: u32,
    },
    /// Client to server: the sender's most recent input ticks, oldest first.
    /// The last valid entry belongs to the enclosing message's tick id.
    Inputs {
        inputs: [TickInput; NET_MAX_INPUT_TICKS],
        input_count: u16,
    },
    AssignPlayerKey {
        player_key: ObjectKey,
    },
    WindowLayout(WindowLayout),
}

impl MessageBody {
    /// Packs up to `NET_MAX_INPUT_TICKS` inputs, keeping the most recent ones.
    pub fn inputs_from<'a>(window: impl IntoIterator<Item = &'a TickInput>) -> Self {
        let window: Vec<&TickInput> = window.into_iter().collect();
        let skip = window.len().saturating_sub(NET_MAX_INPUT_TICKS);

        let mut inputs = [TickInput::default(); NET_MAX_INPUT_TICKS];
        let mut input_count = 0u16;
        for (slot, input) in inputs.iter_mut().zip(window.into_iter().skip(skip)) {
            *slot = *input;
            input_count += 1;
        }
        MessageBody::Inputs {
            inputs,
            input_count,
        }
    }

    pub fn kind(&self) -> u32 {
        match self {
            MessageBody::Ping => 0,
            MessageBody::ObjUpdate { .. } => 1,
            MessageBody::ObjEmpty { .. } => 2,
            MessageBody::Inputs { .. } => 3,
            MessageBody::AssignPlayerKey { .. } => 4,
            MessageBody::WindowLayout(_) => 5,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            MessageBody::Ping => "Ping",
            MessageBody::ObjUpdate { .. } => "ObjUpdate",
            MessageBody::ObjEmpty { .. } => "ObjEmpty",
            MessageBody::Inputs { .. } => "Inputs",
            MessageBody::AssignPlayerKey { .. } => "AssignPlayerKey",
            MessageBody::WindowLayout(_) => "WindowLayout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetMessage {
    pub tick_id: u64,
    pub body: MessageBody,
}

#[derive(Serialize)]
struct NetMessageRef<'a> {
    tick_id: u64,
    body: &'a MessageBody,
}

/// Builds one packet payload, refusing messages that would overflow it.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(NET_MAX_PAYLOAD_SIZE),
        }
    }

    pub fn push(&mut self, tick_id: u64, body: &MessageBody) -> Result<(), ProtocolError> {
        let message = NetMessageRef { tick_id, body };
        let needed = bincode::serialized_size(&message).map_err(ProtocolError::Encode)? as usize;
        let remaining = NET_MAX_PAYLOAD_SIZE - self.buf.len();
        if needed > remaining {
            return Err(ProtocolError::PayloadFull { needed, remaining });
        }

        bincode::serialize_into(&mut self.buf, &message).map_err(ProtocolError::Encode)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Iterates over the messages of a payload.
///
/// Yields at most one error, after which the reader is exhausted: once a
/// message cannot be read, nothing after it can be trusted.
pub struct MessageReader<'a> {
    remaining: &'a [u8],
    failed: bool,
}

impl<'a> MessageReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            remaining: payload,
            failed: false,
        }
    }

    fn read_next(&mut self) -> Result<NetMessage, ProtocolError> {
        let kind_bytes = self
            .remaining
            .get(MESSAGE_KIND_OFFSET..MESSAGE_KIND_OFFSET + 4)
            .ok_or(ProtocolError::Truncated(self.remaining.len()))?;
        let kind = u32::from_le_bytes([kind_bytes[0], kind_bytes[1], kind_bytes[2], kind_bytes[3]]);
        if kind >= MESSAGE_KIND_COUNT {
            return Err(ProtocolError::UnknownKind(kind));
        }

        let mut cursor = self.remaining;
        let message: NetMessage =
            bincode::deserialize_from(&mut cursor).map_err(ProtocolError::Decode)?;
        self.remaining = cursor;
        Ok(message)
    }
}

impl Iterator for MessageReader<'_> {
    type Item = Result<NetMessage, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining.is_empty() {
            return None;
        }

        let result = self.read_next();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Hands every message of `payload` to `handler` in order.
///
/// Stops at the first unreadable message and logs it. Returns the number of
/// messages delivered.
pub fn dispatch_payload(payload: &[u8], mut handler: impl FnMut(NetMessage)) -> usize {
    let mut delivered = 0;
    for message in MessageReader::new(payload) {
        match message {
            Ok(message) => {
                handler(message);
                delivered += 1;
            }
            Err(e) => {
                warn!("Dropping rest of payload after {} messages: {}", delivered, e);
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::CollisionShape;
    use glam::Vec2;

    fn sample_sync() -> ObjectSyncState {
        ObjectSyncState {
            init: true,
            is_active: true,
            p: Vec2::new(12.5, -3.0),
            dp: Vec2::new(1.0, 2.0),
            color: [0.2, 0.4, 0.6, 1.0],
            rotation: 0.75,
            collision: CollisionShape::rect(Vec2::splat(4.0)),
            ..ObjectSyncState::default()
        }
    }

    fn collect(payload: &[u8]) -> Vec<NetMessage> {
        let mut out = Vec::new();
        dispatch_payload(payload, |m| out.push(m));
        out
    }

    #[test]
    fn test_message_layout() {
        let mut writer = PayloadWriter::new();
        writer.push(0x0102, &MessageBody::ObjEmpty { net_index: 7 }).unwrap();
        let bytes = writer.as_bytes();

        assert_eq!(bytes.len(), 8 + 4 + 4);
        assert_eq!(&bytes[0..8], &0x0102u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &7u32.to_le_bytes());
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let bodies = [
            MessageBody::Ping,
            MessageBody::ObjUpdate {
                net_index: 0,
                sync: sample_sync(),
            },
            MessageBody::ObjEmpty { net_index: 1 },
            MessageBody::inputs_from(&[TickInput::default()]),
            MessageBody::AssignPlayerKey {
                player_key: ObjectKey::new(1, 2),
            },
            MessageBody::WindowLayout(WindowLayout::default()),
        ];
        for body in bodies {
            let mut writer = PayloadWriter::new();
            writer.push(1, &body).unwrap();
            let tag = &writer.as_bytes()[8..12];
            assert_eq!(tag, &body.kind().to_le_bytes(), "{}", body.kind_name());
        }
    }

    #[test]
    fn test_dispatch_multiple_messages() {
        let mut writer = PayloadWriter::new();
        writer.push(10, &MessageBody::Ping).unwrap();
        writer
            .push(
                10,
                &MessageBody::ObjUpdate {
                    net_index: 3,
                    sync: sample_sync(),
                },
            )
            .unwrap();
        writer
            .push(
                11,
                &MessageBody::AssignPlayerKey {
                    player_key: ObjectKey::new(5, 3),
                },
            )
            .unwrap();

        let messages = collect(writer.as_bytes());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].body, MessageBody::Ping);
        assert_eq!(
            messages[1].body,
            MessageBody::ObjUpdate {
                net_index: 3,
                sync: sample_sync()
            }
        );
        assert_eq!(messages[2].tick_id, 11);
    }

    #[test]
    fn test_unknown_kind_stops_dispatch() {
        let mut writer = PayloadWriter::new();
        writer.push(1, &MessageBody::Ping).unwrap();
        let mut payload = writer.into_bytes();
        payload.extend_from_slice(&2u64.to_le_bytes());
        payload.extend_from_slice(&99u32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 16]);
        // a valid message after the unknown one is never reached
        payload.extend_from_slice(&3u64.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());

        let mut reader = MessageReader::new(&payload);
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next(),
            Some(Err(ProtocolError::UnknownKind(99)))
        ));
        assert!(reader.next().is_none());

        assert_eq!(collect(&payload).len(), 1);
    }

    #[test]
    fn test_truncated_body_stops_dispatch() {
        let mut writer = PayloadWriter::new();
        writer
            .push(
                4,
                &MessageBody::ObjUpdate {
                    net_index: 1,
                    sync: sample_sync(),
                },
            )
            .unwrap();
        let bytes = writer.into_bytes();
        let truncated = &bytes[..bytes.len() - 3];

        let mut reader = MessageReader::new(truncated);
        assert!(matches!(reader.next(), Some(Err(ProtocolError::Decode(_)))));
        assert_eq!(collect(truncated).len(), 0);
    }

    #[test]
    fn test_payload_writer_refuses_overflow() {
        let mut writer = PayloadWriter::new();
        let body = MessageBody::ObjUpdate {
            net_index: 0,
            sync: sample_sync(),
        };
        let mut pushed = 0;
        while writer.push(1, &body).is_ok() {
            pushed += 1;
        }
        assert!(pushed > 0);
        assert!(writer.len() <= NET_MAX_PAYLOAD_SIZE);
        assert!(matches!(
            writer.push(1, &body),
            Err(ProtocolError::PayloadFull { .. })
        ));
        assert_eq!(collect(writer.as_bytes()).len(), pushed);
    }

    #[test]
    fn test_inputs_window_fits_one_packet() {
        let window = vec![TickInput::path_to(Vec2::new(1.0, 2.0)); NET_MAX_INPUT_TICKS];
        let mut writer = PayloadWriter::new();
        writer.push(1, &MessageBody::Ping).unwrap();
        writer.push(1, &MessageBody::inputs_from(&window)).unwrap();
    }

    #[test]
    fn test_inputs_from_keeps_most_recent() {
        let window: Vec<TickInput> = (0..NET_MAX_INPUT_TICKS + 4)
            .map(|i| TickInput::moving(Vec2::new(i as f32, 0.0)))
            .collect();

        match MessageBody::inputs_from(&window) {
            MessageBody::Inputs {
                inputs,
                input_count,
            } => {
                assert_eq!(input_count as usize, NET_MAX_INPUT_TICKS);
                assert_eq!(inputs[0].move_dir.x, 4.0);
                assert_eq!(
                    inputs[NET_MAX_INPUT_TICKS - 1].move_dir.x,
                    (NET_MAX_INPUT_TICKS + 3) as f32
                );
            }
            other => panic!("Wrong message kind: {:?}", other),
        }
    }
}
