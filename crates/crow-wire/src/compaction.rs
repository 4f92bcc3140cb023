//! Per-stream compaction context (spec §4.2, §C2): map keys seen by a
//! context are assigned small integer ids; later encodings of the same key
//! refer to the id instead of repeating the string. A `RemoteCall` /
//! `CallResult` starts a fresh, empty, one-shot context; a streaming reply
//! shares one context across `SequentialItemStart` .. `SequentialItemEnd`.

use crate::error::{WireError, WireResult};
use crate::primitives::{read_bool, read_bytes, read_f64, read_i64, read_string, read_u32,
    write_bool, write_bytes, write_f64, write_i64, write_string, write_u32};
use crate::value::Value;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_MAP: u8 = 7;

/// Keys added by the current encode call, emitted on the wire as a
/// `ContextChange` delta immediately before the payload it unlocks.
pub type AddedKeymap = Vec<(String, u32)>;

#[derive(Debug, Default)]
pub struct CompactionContext {
    key_to_id: HashMap<String, u32>,
    id_to_key: HashMap<u32, String>,
    next_id: u32,
}

impl CompactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self, key: &str, added: &mut AddedKeymap) -> u32 {
        if let Some(&id) = self.key_to_id.get(key) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        added.push((key.to_string(), id));
        id
    }

    /// Applies a received `ContextChange` delta. An id rebound to a
    /// different key than it already holds is a context-change violation.
    pub fn apply_added(&mut self, added: &AddedKeymap) -> WireResult<()> {
        for (key, id) in added {
            if let Some(existing) = self.id_to_key.get(id) {
                if existing != key {
                    return Err(WireError::UnboundKeyId(*id));
                }
            }
            self.key_to_id.insert(key.clone(), *id);
            self.id_to_key.insert(*id, key.clone());
            if *id >= self.next_id {
                self.next_id = id + 1;
            }
        }
        Ok(())
    }

    fn resolve(&self, id: u32) -> WireResult<&str> {
        self.id_to_key
            .get(&id)
            .map(String::as_str)
            .ok_or(WireError::UnboundKeyId(id))
    }
}

/// Encodes `value` under `ctx`, returning the keys newly minted during this
/// call and the compacted body bytes.
pub fn encode(ctx: &mut CompactionContext, value: &Value) -> (AddedKeymap, BytesMut) {
    let mut added = AddedKeymap::new();
    let mut body = BytesMut::new();
    encode_value(ctx, &mut added, value, &mut body);
    (added, body)
}

fn encode_value(ctx: &mut CompactionContext, added: &mut AddedKeymap, value: &Value, dst: &mut BytesMut) {
    match value {
        Value::Null => dst.extend_from_slice(&[TAG_NULL]),
        Value::Bool(b) => {
            dst.extend_from_slice(&[TAG_BOOL]);
            write_bool(dst, *b);
        }
        Value::Int(i) => {
            dst.extend_from_slice(&[TAG_INT]);
            write_i64(dst, *i);
        }
        Value::Float(f) => {
            dst.extend_from_slice(&[TAG_FLOAT]);
            write_f64(dst, *f);
        }
        Value::Str(s) => {
            dst.extend_from_slice(&[TAG_STR]);
            write_string(dst, s);
        }
        Value::Bytes(b) => {
            dst.extend_from_slice(&[TAG_BYTES]);
            write_bytes(dst, b);
        }
        Value::List(items) => {
            dst.extend_from_slice(&[TAG_LIST]);
            write_u32(dst, items.len() as u32);
            for item in items {
                encode_value(ctx, added, item, dst);
            }
        }
        Value::Map(map) => {
            dst.extend_from_slice(&[TAG_MAP]);
            write_u32(dst, map.len() as u32);
            for (key, val) in map {
                let id = ctx.mint(key, added);
                write_u32(dst, id);
                encode_value(ctx, added, val, dst);
            }
        }
    }
}

/// Applies a received `added` delta then decodes `body` under the
/// (now-updated) `ctx`.
pub fn decode(ctx: &mut CompactionContext, added: &AddedKeymap, body: &mut Bytes) -> WireResult<Value> {
    ctx.apply_added(added)?;
    decode_value(ctx, body)
}

fn decode_value(ctx: &CompactionContext, src: &mut Bytes) -> WireResult<Value> {
    let tag = crate::primitives::read_u8(src)?;
    Ok(match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => Value::Bool(read_bool(src)?),
        TAG_INT => Value::Int(read_i64(src)?),
        TAG_FLOAT => Value::Float(read_f64(src)?),
        TAG_STR => Value::Str(read_string(src, "value.str")?),
        TAG_BYTES => Value::Bytes(read_bytes(src, "value.bytes")?),
        TAG_LIST => {
            let count = read_u32(src)? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value(ctx, src)?);
            }
            Value::List(items)
        }
        TAG_MAP => {
            let count = read_u32(src)? as usize;
            let mut map = std::collections::BTreeMap::new();
            for _ in 0..count {
                let id = read_u32(src)?;
                let key = ctx.resolve(id)?.to_string();
                let val = decode_value(ctx, src)?;
                map.insert(key, val);
            }
            Value::Map(map)
        }
        other => return Err(WireError::UnknownTag(other)),
    })
}

/// Writes an `AddedKeymap` delta: count, then `(key, id)` pairs.
pub fn write_added_keymap(dst: &mut BytesMut, added: &AddedKeymap) {
    write_u32(dst, added.len() as u32);
    for (key, id) in added {
        write_string(dst, key);
        write_u32(dst, *id);
    }
}

pub fn read_added_keymap(src: &mut Bytes) -> WireResult<AddedKeymap> {
    let count = read_u32(src)? as usize;
    let mut added = AddedKeymap::with_capacity(count);
    for _ in 0..count {
        let key = read_string(src, "added_keymap.key")?;
        let id = read_u32(src)?;
        added.push((key, id));
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> Value {
        let mut inner = BTreeMap::new();
        inner.insert("a".to_string(), Value::Int(1));
        inner.insert("b".to_string(), Value::Str("hi".into()));
        Value::List(vec![Value::Map(inner.clone()), Value::Map(inner)])
    }

    #[test]
    fn one_shot_context_round_trips() {
        let mut enc_ctx = CompactionContext::new();
        let (added, body) = encode(&mut enc_ctx, &sample());

        let mut dec_ctx = CompactionContext::new();
        let mut body = body.freeze();
        let decoded = decode(&mut dec_ctx, &added, &mut body).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn second_map_does_not_remint_keys() {
        let mut enc_ctx = CompactionContext::new();
        let (added, _body) = encode(&mut enc_ctx, &sample());
        // "a" and "b" each appear once in the added keymap despite being
        // used by both list elements.
        assert_eq!(added.len(), 2);
    }

    #[test]
    fn streaming_context_shared_across_items() {
        let mut enc_ctx = CompactionContext::new();
        let mut dec_ctx = CompactionContext::new();

        let mut first_map = BTreeMap::new();
        first_map.insert("x".to_string(), Value::Int(1));
        let (added1, body1) = encode(&mut enc_ctx, &Value::Map(first_map));
        assert_eq!(added1.len(), 1);
        let decoded1 = decode(&mut dec_ctx, &added1, &mut body1.freeze()).unwrap();
        assert_eq!(decoded1, Value::Map(BTreeMap::from([("x".to_string(), Value::Int(1))])));

        let mut second_map = BTreeMap::new();
        second_map.insert("x".to_string(), Value::Int(2));
        let (added2, body2) = encode(&mut enc_ctx, &Value::Map(second_map));
        assert!(added2.is_empty(), "x was already minted by the first item");
        let decoded2 = decode(&mut dec_ctx, &added2, &mut body2.freeze()).unwrap();
        assert_eq!(decoded2, Value::Map(BTreeMap::from([("x".to_string(), Value::Int(2))])));
    }

    #[test]
    fn unbound_key_id_is_rejected() {
        let mut dec_ctx = CompactionContext::new();
        let mut body = BytesMut::new();
        body.extend_from_slice(&[TAG_MAP]);
        write_u32(&mut body, 1);
        write_u32(&mut body, 42);
        body.extend_from_slice(&[TAG_NULL]);
        let err = decode(&mut dec_ctx, &AddedKeymap::new(), &mut body.freeze()).unwrap_err();
        assert!(matches!(err, WireError::UnboundKeyId(42)));
    }
}
