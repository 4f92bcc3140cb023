//! Textual attribute-map wire form (spec §6.1, §9 Open Question: textual
//! was chosen over structured). Entries are `key=TAGvalue` pairs joined by
//! `;`; `TAG` is one of `s`/`i`/`b`/`f`. `;`, `=` and `\` inside a string
//! value are backslash-escaped.
//!
//! Malformed input is always a `WireError`, never silently coerced or
//! dropped (spec §6.1: "servers that fail to parse attributes MUST reply
//! `ProtocolError`").

use crate::error::{WireError, WireResult};
use crow_core::{AttrValue, Attributes};

pub fn encode(attrs: &Attributes) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), encode_value(v)))
        .collect::<Vec<_>>()
        .join(";")
}

fn encode_value(v: &AttrValue) -> String {
    match v {
        AttrValue::Str(s) => format!("s{}", escape(s)),
        AttrValue::Int(i) => format!("i{i}"),
        AttrValue::Bool(b) => format!("b{b}"),
        AttrValue::Float(f) => format!("f{f}"),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || c == ';' || c == '=' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn decode(text: &str) -> WireResult<Attributes> {
    let mut attrs = Attributes::new();
    if text.is_empty() {
        return Ok(attrs);
    }
    for entry in split_unescaped(text, ';') {
        let mut parts = split_unescaped(&entry, '=').into_iter();
        let key = parts
            .next()
            .ok_or_else(|| WireError::MalformedAttributes(entry.clone()))?;
        let raw_value = parts
            .next()
            .ok_or_else(|| WireError::MalformedAttributes(entry.clone()))?;
        if parts.next().is_some() || key.is_empty() {
            return Err(WireError::MalformedAttributes(entry));
        }
        let value = decode_value(&raw_value)
            .ok_or_else(|| WireError::MalformedAttributes(entry.clone()))?;
        attrs.insert(unescape(&key), value);
    }
    Ok(attrs)
}

fn decode_value(tagged: &str) -> Option<AttrValue> {
    let mut chars = tagged.chars();
    let tag = chars.next()?;
    let rest: String = chars.collect();
    match tag {
        's' => Some(AttrValue::Str(unescape(&rest))),
        'i' => rest.parse::<i64>().ok().map(AttrValue::Int),
        'b' => rest.parse::<bool>().ok().map(AttrValue::Bool),
        'f' => rest.parse::<f64>().ok().map(AttrValue::Float),
        _ => None,
    }
}

fn split_unescaped(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(current);
            current = String::new();
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(current);
    parts
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
