//! Typed view of frame payloads.

use bytes::BytesMut;
use hgipc_variant::Variant;

use crate::binary::{decode_variant, decode_variant_exact, encode_variant};
use crate::codec::{Frame, PacketType};
use crate::error::ProtocolError;

const FAULT_CODE_KEY: &str = "faultCode";
const FAULT_STRING_KEY: &str = "faultString";

/// Error result returned by the hub for a failed call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rpc fault {code}: {message}")]
pub struct RpcFault {
    pub code: i64,
    pub message: String,
}

impl RpcFault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wire form: `Struct{"faultCode": Integer, "faultString": String}`.
    pub fn to_variant(&self) -> Variant {
        Variant::structure([
            (FAULT_CODE_KEY, Variant::Integer(self.code)),
            (FAULT_STRING_KEY, Variant::from(self.message.as_str())),
        ])
    }

    pub fn from_variant(value: &Variant) -> Result<Self, ProtocolError> {
        let code = value
            .get(FAULT_CODE_KEY)
            .and_then(Variant::as_i64)
            .ok_or_else(|| malformed(PacketType::Fault, "missing integer faultCode"))?;
        let message = value
            .get(FAULT_STRING_KEY)
            .and_then(Variant::as_str)
            .ok_or_else(|| malformed(PacketType::Fault, "missing string faultString"))?;
        Ok(Self::new(code, message))
    }
}

/// One variable change, as delivered to the event callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Originator of the change, when the hub reports one.
    pub source: Option<String>,
    pub peer_id: u64,
    pub channel: i32,
    pub variable: String,
    pub value: Variant,
}

/// All variable changes carried by one event packet.
///
/// The hub sends three payload shapes:
/// - `[peerId, channel, name, value]`
/// - `[peerId, channel, [names...], [values...]]`
/// - `[source, peerId, channel, [names...], [values...]]`
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub source: Option<String>,
    pub peer_id: u64,
    pub channel: i32,
    pub values: Vec<(String, Variant)>,
}

impl EventBatch {
    pub fn single(
        peer_id: u64,
        channel: i32,
        variable: impl Into<String>,
        value: Variant,
    ) -> Self {
        Self {
            source: None,
            peer_id,
            channel,
            values: vec![(variable.into(), value)],
        }
    }

    /// Fan the batch out into one event per variable, in payload order.
    pub fn into_events(self) -> impl Iterator<Item = Event> {
        let Self {
            source,
            peer_id,
            channel,
            values,
        } = self;
        values.into_iter().map(move |(variable, value)| Event {
            source: source.clone(),
            peer_id,
            channel,
            variable,
            value,
        })
    }

    /// Encode in the most compact shape that carries every field.
    ///
    /// Peer ids travel as signed 64-bit integers; larger ids are rejected.
    pub fn to_variant(&self) -> Result<Variant, ProtocolError> {
        let peer_id = i64::try_from(self.peer_id).map_err(|_| ProtocolError::MalformedEnvelope {
            packet: PacketType::Event,
            reason: format!("peer id {} does not fit a signed 64-bit integer", self.peer_id),
        })?;
        let head = [Variant::Integer(peer_id), Variant::from(self.channel)];

        if self.source.is_none() && self.values.len() == 1 {
            let (name, value) = &self.values[0];
            let mut items = head.to_vec();
            items.push(Variant::from(name.as_str()));
            items.push(value.clone());
            return Ok(Variant::Array(items));
        }

        let names = Variant::Array(
            self.values
                .iter()
                .map(|(name, _)| Variant::from(name.as_str()))
                .collect(),
        );
        let values = Variant::Array(self.values.iter().map(|(_, v)| v.clone()).collect());

        let mut items = Vec::with_capacity(5);
        if let Some(source) = &self.source {
            items.push(Variant::from(source.as_str()));
        }
        items.extend(head);
        items.push(names);
        items.push(values);
        Ok(Variant::Array(items))
    }

    pub fn from_variant(value: &Variant) -> Result<Self, ProtocolError> {
        let items = value
            .as_array()
            .ok_or_else(|| malformed(PacketType::Event, "payload is not an array"))?;

        let (source, rest) = match items {
            [Variant::String(source), rest @ ..] if rest.len() == 4 => {
                (Some(source.clone()), rest)
            }
            rest if rest.len() == 4 => (None, rest),
            _ => {
                return Err(malformed(
                    PacketType::Event,
                    format!("expected 4 or 5 elements, got {}", items.len()),
                ))
            }
        };

        let peer_id = rest[0]
            .as_i64()
            .and_then(|id| u64::try_from(id).ok())
            .ok_or_else(|| malformed(PacketType::Event, "peer id is not a non-negative integer"))?;
        let channel = rest[1]
            .as_i64()
            .and_then(|ch| i32::try_from(ch).ok())
            .ok_or_else(|| malformed(PacketType::Event, "channel is not a 32-bit integer"))?;

        let values = match (&rest[2], &rest[3]) {
            (Variant::String(name), value) if source.is_none() => {
                vec![(name.clone(), value.clone())]
            }
            (Variant::Array(names), Variant::Array(values)) => {
                if names.len() != values.len() {
                    return Err(malformed(
                        PacketType::Event,
                        format!("{} names but {} values", names.len(), values.len()),
                    ));
                }
                names
                    .iter()
                    .zip(values)
                    .map(|(name, value)| {
                        name.as_str()
                            .map(|n| (n.to_string(), value.clone()))
                            .ok_or_else(|| {
                                malformed(PacketType::Event, "variable name is not a string")
                            })
                    })
                    .collect::<Result<_, _>>()?
            }
            _ => {
                return Err(malformed(
                    PacketType::Event,
                    "expected variable name and value",
                ))
            }
        };

        Ok(Self {
            source,
            peer_id,
            channel,
            values,
        })
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request { method: String, params: Vec<Variant> },
    Response(Variant),
    Fault(RpcFault),
    Event(EventBatch),
}

impl Envelope {
    pub fn request(method: impl Into<String>, params: Vec<Variant>) -> Self {
        Envelope::Request {
            method: method.into(),
            params,
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Envelope::Request { .. } => PacketType::Request,
            Envelope::Response(_) => PacketType::Response,
            Envelope::Fault(_) => PacketType::Fault,
            Envelope::Event(_) => PacketType::Event,
        }
    }

    /// Append the payload bytes (without frame header) to `dst`.
    pub fn encode_payload(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Envelope::Request { method, params } => {
                encode_variant(&Variant::from(method.as_str()), dst)?;
                encode_array(params, dst)
            }
            Envelope::Response(value) => encode_variant(value, dst),
            Envelope::Fault(fault) => encode_variant(&fault.to_variant(), dst),
            Envelope::Event(batch) => encode_variant(&batch.to_variant()?, dst),
        }
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let mut payload = BytesMut::new();
        self.encode_payload(&mut payload)?;
        Ok(Frame::new(self.packet_type(), payload.freeze()))
    }

    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let payload = frame.payload.as_ref();
        match frame.packet_type {
            PacketType::Request => {
                let mut src = payload;
                let method = match decode_variant(&mut src)? {
                    Variant::String(method) => method,
                    other => {
                        return Err(malformed(
                            PacketType::Request,
                            format!("method name is {}", other.kind()),
                        ))
                    }
                };
                let params = match decode_variant_exact(src)? {
                    Variant::Array(params) => params,
                    other => {
                        return Err(malformed(
                            PacketType::Request,
                            format!("parameters are {}", other.kind()),
                        ))
                    }
                };
                Ok(Envelope::Request { method, params })
            }
            PacketType::Response => Ok(Envelope::Response(decode_variant_exact(payload)?)),
            PacketType::Fault => Ok(Envelope::Fault(RpcFault::from_variant(
                &decode_variant_exact(payload)?,
            )?)),
            PacketType::Event => Ok(Envelope::Event(EventBatch::from_variant(
                &decode_variant_exact(payload)?,
            )?)),
        }
    }
}

// Same bytes as encoding `Variant::Array(params.to_vec())` without the copy.
fn encode_array(items: &[Variant], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    use bytes::BufMut;

    let count = u32::try_from(items.len()).map_err(|_| ProtocolError::TooLarge {
        what: "array",
        len: items.len(),
        max: u32::MAX as usize,
    })?;
    dst.put_u8(0x10);
    dst.put_u32(count);
    for item in items {
        encode_variant(item, dst)?;
    }
    Ok(())
}

fn malformed(packet: PacketType, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedEnvelope {
        packet,
        reason: reason.into(),
    }
}
