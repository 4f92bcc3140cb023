//! The generic RPC payload union (spec §9: "restrict RPC payloads to the
//! declared wire format ... pass user-defined values through a generic
//! value union").

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}
