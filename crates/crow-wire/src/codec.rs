//! Record <-> bytes codec, and the length-prefixed framing that carries
//! those bytes over a connection (spec §4.1, §4.6).

use crate::compaction::{self, CompactionContext};
use crate::error::{WireError, WireResult};
use crate::primitives::*;
use crate::record::*;
use crate::value::Value;
use crate::{attrs, frame};
use bytes::{Bytes, BytesMut};
use crow_core::ServiceEndpoint;
use tokio::io::{AsyncRead, AsyncWrite};

/// Maximum frame size accepted from a peer. Large enough for any
/// reasonable single record, small enough that a corrupt length prefix
/// cannot be used to exhaust memory.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Stateful encoder for one connection's outbound direction. Tracks the
/// compaction context of an in-progress streaming reply, if any.
#[derive(Default)]
pub struct RecordEncoder {
    stream: Option<(u64, CompactionContext)>,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, record: &Record) -> WireResult<BytesMut> {
        let mut dst = BytesMut::new();
        write_u8(&mut dst, record.tag());
        match record {
            Record::JoinRequest {
                address,
                port,
                service_id,
                service_name,
                attributes,
            } => {
                write_string(&mut dst, address);
                write_u32(&mut dst, *port as u32);
                write_opt_string(&mut dst, service_id.as_deref());
                write_string(&mut dst, service_name);
                write_string(&mut dst, &attrs::encode(attributes));
            }
            Record::Registration {
                service_id,
                expire_at,
            } => {
                write_string(&mut dst, service_id);
                write_date(&mut dst, expire_at);
            }
            Record::HeartBeat { service_id } => write_string(&mut dst, service_id),
            Record::Lease { expire_at } => write_date(&mut dst, expire_at),
            Record::LeaseExpired { service_id } => write_string(&mut dst, service_id),
            Record::InvalidMessage { original } => write_bytes(&mut dst, original),
            Record::RemoteCall {
                target_ns,
                fn_name,
                args,
            } => {
                write_string(&mut dst, target_ns);
                write_string(&mut dst, fn_name);
                let mut ctx = CompactionContext::new();
                encode_compacted(&mut ctx, args, &mut dst);
            }
            Record::CallResult { obj } => {
                let mut ctx = CompactionContext::new();
                encode_compacted(&mut ctx, obj, &mut dst);
            }
            Record::ProtocolError { code, message } => {
                write_string(&mut dst, code);
                write_string(&mut dst, message);
            }
            Record::CallException { kind, stack_trace } => {
                write_string(&mut dst, kind);
                write_string(&mut dst, stack_trace);
            }
            Record::Discovery {
                service_name,
                attributes,
            } => {
                write_string(&mut dst, service_name);
                write_string(&mut dst, &attrs::encode(attributes));
            }
            Record::ServiceFound { endpoints } => {
                write_u32(&mut dst, endpoints.len() as u32);
                for ep in endpoints {
                    write_endpoint(&mut dst, ep);
                }
            }
            Record::ServiceNotFound {
                service_name,
                attributes,
            } => {
                write_string(&mut dst, service_name);
                write_string(&mut dst, &attrs::encode(attributes));
            }
            Record::SequentialItemStart { seq_id } => {
                write_u32(&mut dst, (*seq_id >> 32) as u32);
                write_u32(&mut dst, *seq_id as u32);
                self.stream = Some((*seq_id, CompactionContext::new()));
            }
            Record::SequentialItem { seq_id, obj } => {
                write_u32(&mut dst, (*seq_id >> 32) as u32);
                write_u32(&mut dst, *seq_id as u32);
                let (_, ctx) = self
                    .stream
                    .as_mut()
                    .filter(|(active, _)| active == seq_id)
                    .ok_or(WireError::NoActiveStream(*seq_id))?;
                encode_compacted(ctx, obj, &mut dst);
            }
            Record::SequentialItemEnd { seq_id } => {
                write_u32(&mut dst, (*seq_id >> 32) as u32);
                write_u32(&mut dst, *seq_id as u32);
                self.stream = None;
            }
            Record::Ping | Record::Ack => {}
        }
        Ok(dst)
    }
}

fn encode_compacted(ctx: &mut CompactionContext, value: &Value, dst: &mut BytesMut) {
    let (added, body) = compaction::encode(ctx, value);
    compaction::write_added_keymap(dst, &added);
    dst.extend_from_slice(&body);
}

fn write_endpoint(dst: &mut BytesMut, ep: &ServiceEndpoint) {
    write_string(dst, &ep.address);
    write_u32(dst, ep.port as u32);
    write_string(dst, &ep.service_id);
    write_string(dst, &ep.service_name);
    write_string(dst, &attrs::encode(&ep.attributes));
}

fn read_endpoint(src: &mut Bytes) -> WireResult<ServiceEndpoint> {
    let address = read_string(src, "endpoint.address")?;
    let port = read_u32(src)? as u16;
    let service_id = read_string(src, "endpoint.service_id")?;
    let service_name = read_string(src, "endpoint.service_name")?;
    let attributes = attrs::decode(&read_string(src, "endpoint.attributes")?)
        .map_err(|_| WireError::MalformedAttributes("endpoint.attributes".into()))?;
    Ok(ServiceEndpoint {
        address,
        port,
        service_id,
        service_name,
        attributes,
    })
}

fn read_seq_id(src: &mut Bytes) -> WireResult<u64> {
    let hi = read_u32(src)? as u64;
    let lo = read_u32(src)? as u64;
    Ok((hi << 32) | lo)
}

/// Stateful decoder for one connection's inbound direction; mirrors
/// [`RecordEncoder`]'s streaming-context tracking.
#[derive(Default)]
pub struct RecordDecoder {
    stream: Option<(u64, CompactionContext)>,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, mut src: Bytes) -> WireResult<Record> {
        let tag = read_u8(&mut src)?;
        Ok(match tag {
            TAG_JOIN_REQUEST => {
                let address = read_string(&mut src, "join.address")?;
                let port = read_u32(&mut src)? as u16;
                let service_id = read_opt_string(&mut src, "join.service_id")?;
                let service_name = read_string(&mut src, "join.service_name")?;
                let attributes = attrs::decode(&read_string(&mut src, "join.attributes")?)
                    .map_err(|_| WireError::MalformedAttributes("join.attributes".into()))?;
                Record::JoinRequest {
                    address,
                    port,
                    service_id,
                    service_name,
                    attributes,
                }
            }
            TAG_REGISTRATION => Record::Registration {
                service_id: read_string(&mut src, "registration.service_id")?,
                expire_at: read_date(&mut src)?,
            },
            TAG_HEART_BEAT => Record::HeartBeat {
                service_id: read_string(&mut src, "heartbeat.service_id")?,
            },
            TAG_LEASE => Record::Lease {
                expire_at: read_date(&mut src)?,
            },
            TAG_LEASE_EXPIRED => Record::LeaseExpired {
                service_id: read_string(&mut src, "lease_expired.service_id")?,
            },
            TAG_INVALID_MESSAGE => Record::InvalidMessage {
                original: read_bytes(&mut src, "invalid_message.original")?,
            },
            TAG_REMOTE_CALL => {
                let target_ns = read_string(&mut src, "remote_call.target_ns")?;
                let fn_name = read_string(&mut src, "remote_call.fn_name")?;
                let mut ctx = CompactionContext::new();
                let args = decode_compacted(&mut ctx, &mut src)?;
                Record::RemoteCall {
                    target_ns,
                    fn_name,
                    args,
                }
            }
            TAG_CALL_RESULT => {
                let mut ctx = CompactionContext::new();
                Record::CallResult {
                    obj: decode_compacted(&mut ctx, &mut src)?,
                }
            }
            TAG_PROTOCOL_ERROR => Record::ProtocolError {
                code: read_string(&mut src, "protocol_error.code")?,
                message: read_string(&mut src, "protocol_error.message")?,
            },
            TAG_CALL_EXCEPTION => Record::CallException {
                kind: read_string(&mut src, "call_exception.kind")?,
                stack_trace: read_string(&mut src, "call_exception.stack_trace")?,
            },
            TAG_DISCOVERY => {
                let service_name = read_string(&mut src, "discovery.service_name")?;
                let attributes = attrs::decode(&read_string(&mut src, "discovery.attributes")?)
                    .map_err(|_| WireError::MalformedAttributes("discovery.attributes".into()))?;
                Record::Discovery {
                    service_name,
                    attributes,
                }
            }
            TAG_SERVICE_FOUND => {
                let count = read_u32(&mut src)? as usize;
                let mut endpoints = Vec::with_capacity(count);
                for _ in 0..count {
                    endpoints.push(read_endpoint(&mut src)?);
                }
                Record::ServiceFound { endpoints }
            }
            TAG_SERVICE_NOT_FOUND => {
                let service_name = read_string(&mut src, "service_not_found.service_name")?;
                let attributes =
                    attrs::decode(&read_string(&mut src, "service_not_found.attributes")?)
                        .map_err(|_| {
                            WireError::MalformedAttributes("service_not_found.attributes".into())
                        })?;
                Record::ServiceNotFound {
                    service_name,
                    attributes,
                }
            }
            TAG_SEQUENTIAL_ITEM_START => {
                let seq_id = read_seq_id(&mut src)?;
                self.stream = Some((seq_id, CompactionContext::new()));
                Record::SequentialItemStart { seq_id }
            }
            TAG_SEQUENTIAL_ITEM => {
                let seq_id = read_seq_id(&mut src)?;
                let (active_id, ctx) = self
                    .stream
                    .as_mut()
                    .ok_or(WireError::NoActiveStream(seq_id))?;
                if *active_id != seq_id {
                    return Err(WireError::StreamMismatch {
                        expected: *active_id,
                        found: seq_id,
                    });
                }
                let obj = decode_compacted(ctx, &mut src)?;
                Record::SequentialItem { seq_id, obj }
            }
            TAG_SEQUENTIAL_ITEM_END => {
                let seq_id = read_seq_id(&mut src)?;
                match self.stream.take() {
                    Some((active_id, _)) if active_id == seq_id => {}
                    Some((active_id, _)) => {
                        return Err(WireError::StreamMismatch {
                            expected: active_id,
                            found: seq_id,
                        });
                    }
                    None => return Err(WireError::NoActiveStream(seq_id)),
                }
                Record::SequentialItemEnd { seq_id }
            }
            TAG_PING => Record::Ping,
            TAG_ACK => Record::Ack,
            other => return Err(WireError::UnknownTag(other)),
        })
    }
}

fn decode_compacted(ctx: &mut CompactionContext, src: &mut Bytes) -> WireResult<Value> {
    let added = compaction::read_added_keymap(src)?;
    compaction::decode(ctx, &added, src)
}

/// Writes `record` as one length-prefixed frame.
pub async fn write_record<W: AsyncWrite + Unpin>(
    w: &mut W,
    encoder: &mut RecordEncoder,
    record: &Record,
) -> WireResult<()> {
    let body = encoder.encode(record)?;
    frame::write_frame(w, &body).await?;
    Ok(())
}

/// Reads one length-prefixed frame and decodes it into a `Record`.
/// Decode failures are not propagated as transport errors so the
/// connection stays open and the caller can reply in-band. Malformed
/// attributes and an unbound key-id are protocol violations with a MUST
/// reply of `ProtocolError` (spec §6.1, §6.3); every other decode
/// failure (unknown tag, truncated field, bad UTF-8) becomes the more
/// generic `Record::InvalidMessage` (spec §4.3).
pub async fn read_record<R: AsyncRead + Unpin>(
    r: &mut R,
    decoder: &mut RecordDecoder,
) -> WireResult<Record> {
    let bytes = frame::read_frame(r, MAX_FRAME_BYTES).await?;
    match decoder.decode(Bytes::from(bytes.clone())) {
        Ok(record) => Ok(record),
        Err(WireError::MalformedAttributes(detail)) => Ok(Record::ProtocolError {
            code: "malformed-attributes".to_string(),
            message: detail,
        }),
        Err(WireError::UnboundKeyId(id)) => Ok(Record::ProtocolError {
            code: "unbound-key-id".to_string(),
            message: format!("key id {id} referenced before it was bound"),
        }),
        Err(_) => Ok(Record::InvalidMessage { original: bytes }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use crow_core::now;

    fn roundtrip(record: Record) -> Record {
        let mut enc = RecordEncoder::new();
        let mut dec = RecordDecoder::new();
        let body = enc.encode(&record).unwrap();
        dec.decode(body.freeze()).unwrap()
    }

    #[test]
    fn join_request_round_trips() {
        let record = Record::JoinRequest {
            address: "127.0.0.1".into(),
            port: 5001,
            service_id: None,
            service_name: "math".into(),
            attributes: Default::default(),
        };
        assert_eq!(roundtrip(record.clone()), record);
    }

    #[test]
    fn registration_round_trips_with_date_precision() {
        let expire_at = now().with_nanosecond(0).unwrap();
        let record = Record::Registration {
            service_id: "svc-1".into(),
            expire_at,
        };
        assert_eq!(roundtrip(record.clone()), record);
    }

    #[test]
    fn remote_call_round_trips_nested_value() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("a".to_string(), Value::Int(2));
        map.insert("b".to_string(), Value::Int(3));
        let record = Record::RemoteCall {
            target_ns: "math".into(),
            fn_name: "add".into(),
            args: Value::List(vec![Value::Map(map)]),
        };
        assert_eq!(roundtrip(record.clone()), record);
    }

    #[test]
    fn streaming_sequence_round_trips() {
        let mut enc = RecordEncoder::new();
        let mut dec = RecordDecoder::new();

        let start = Record::SequentialItemStart { seq_id: 7 };
        let item0 = Record::SequentialItem { seq_id: 7, obj: Value::Int(0) };
        let item1 = Record::SequentialItem { seq_id: 7, obj: Value::Int(1) };
        let end = Record::SequentialItemEnd { seq_id: 7 };

        for record in [start, item0, item1, end] {
            let body = enc.encode(&record).unwrap();
            let decoded = dec.decode(body.freeze()).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn mismatched_sequence_id_is_rejected() {
        let mut enc = RecordEncoder::new();
        let mut dec = RecordDecoder::new();
        let start = Record::SequentialItemStart { seq_id: 1 };
        dec.decode(enc.encode(&start).unwrap().freeze()).unwrap();

        let wrong_item = Record::SequentialItem { seq_id: 2, obj: Value::Null };
        // Encoder refuses to encode against a non-active sequence id.
        let mut enc2 = RecordEncoder::new();
        assert!(enc2.encode(&wrong_item).is_err());

        // A decoder that receives a stray id for an open stream rejects it.
        let mut raw = BytesMut::new();
        write_u8(&mut raw, TAG_SEQUENTIAL_ITEM);
        write_u32(&mut raw, 0);
        write_u32(&mut raw, 99);
        compaction::write_added_keymap(&mut raw, &Vec::new());
        let err = dec.decode(raw.freeze()).unwrap_err();
        assert!(matches!(err, WireError::StreamMismatch { .. }));
    }
}
