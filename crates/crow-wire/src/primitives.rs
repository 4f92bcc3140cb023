//! Big-endian primitive encoding shared by every record body (spec §4.1).

use crate::error::{WireError, WireResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{Datelike, TimeZone, Timelike, Utc};
use crow_core::Instant;

pub fn write_u8(dst: &mut BytesMut, v: u8) {
    dst.put_u8(v);
}

pub fn read_u8(src: &mut Bytes) -> WireResult<u8> {
    if src.remaining() < 1 {
        return Err(WireError::Truncated("u8"));
    }
    Ok(src.get_u8())
}

pub fn write_u32(dst: &mut BytesMut, v: u32) {
    dst.put_u32(v);
}

pub fn read_u32(src: &mut Bytes) -> WireResult<u32> {
    if src.remaining() < 4 {
        return Err(WireError::Truncated("u32"));
    }
    Ok(src.get_u32())
}

pub fn write_i32(dst: &mut BytesMut, v: i32) {
    dst.put_i32(v);
}

pub fn read_i32(src: &mut Bytes) -> WireResult<i32> {
    if src.remaining() < 4 {
        return Err(WireError::Truncated("i32"));
    }
    Ok(src.get_i32())
}

pub fn write_i64(dst: &mut BytesMut, v: i64) {
    dst.put_i64(v);
}

pub fn read_i64(src: &mut Bytes) -> WireResult<i64> {
    if src.remaining() < 8 {
        return Err(WireError::Truncated("i64"));
    }
    Ok(src.get_i64())
}

pub fn write_f64(dst: &mut BytesMut, v: f64) {
    dst.put_f64(v);
}

pub fn read_f64(src: &mut Bytes) -> WireResult<f64> {
    if src.remaining() < 8 {
        return Err(WireError::Truncated("f64"));
    }
    Ok(src.get_f64())
}

pub fn write_bool(dst: &mut BytesMut, v: bool) {
    dst.put_u8(v as u8);
}

pub fn read_bool(src: &mut Bytes) -> WireResult<bool> {
    Ok(read_u8(src)? != 0)
}

/// u32-length-prefixed UTF-8 string.
pub fn write_string(dst: &mut BytesMut, s: &str) {
    write_u32(dst, s.len() as u32);
    dst.put_slice(s.as_bytes());
}

pub fn read_string(src: &mut Bytes, what: &'static str) -> WireResult<String> {
    let len = read_u32(src)? as usize;
    if src.remaining() < len {
        return Err(WireError::Truncated(what));
    }
    let bytes = src.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(what))
}

/// u32-length-prefixed raw byte string.
pub fn write_bytes(dst: &mut BytesMut, b: &[u8]) {
    write_u32(dst, b.len() as u32);
    dst.put_slice(b);
}

pub fn read_bytes(src: &mut Bytes, what: &'static str) -> WireResult<Vec<u8>> {
    let len = read_u32(src)? as usize;
    if src.remaining() < len {
        return Err(WireError::Truncated(what));
    }
    Ok(src.copy_to_bytes(len).to_vec())
}

/// A present/absent string, used for the nullable `service-id` field of
/// `JoinRequest`: one presence byte followed by the string if present.
pub fn write_opt_string(dst: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            write_bool(dst, true);
            write_string(dst, s);
        }
        None => write_bool(dst, false),
    }
}

pub fn read_opt_string(src: &mut Bytes, what: &'static str) -> WireResult<Option<String>> {
    if read_bool(src)? {
        Ok(Some(read_string(src, what)?))
    } else {
        Ok(None)
    }
}

/// Fixed 9-byte date: `int32 year | byte month | byte day | byte hour |
/// byte minute | byte second` (spec §4.1).
pub fn write_date(dst: &mut BytesMut, instant: &Instant) {
    write_i32(dst, instant.year());
    write_u8(dst, instant.month() as u8);
    write_u8(dst, instant.day() as u8);
    write_u8(dst, instant.hour() as u8);
    write_u8(dst, instant.minute() as u8);
    write_u8(dst, instant.second() as u8);
}

pub fn read_date(src: &mut Bytes) -> WireResult<Instant> {
    let year = read_i32(src)?;
    let month = read_u8(src)? as u32;
    let day = read_u8(src)? as u32;
    let hour = read_u8(src)? as u32;
    let minute = read_u8(src)? as u32;
    let second = read_u8(src)? as u32;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or(WireError::Truncated("date"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trips() {
        let instant = Utc.with_ymd_and_hms(2026, 7, 28, 13, 5, 9).unwrap();
        let mut buf = BytesMut::new();
        write_date(&mut buf, &instant);
        assert_eq!(buf.len(), 9);
        let mut bytes = buf.freeze();
        let decoded = read_date(&mut bytes).unwrap();
        assert_eq!(decoded, instant);
    }

    #[test]
    fn string_round_trips() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "math.add");
        let mut bytes = buf.freeze();
        assert_eq!(read_string(&mut bytes, "test").unwrap(), "math.add");
    }

    #[test]
    fn opt_string_none_round_trips() {
        let mut buf = BytesMut::new();
        write_opt_string(&mut buf, None);
        let mut bytes = buf.freeze();
        assert_eq!(read_opt_string(&mut bytes, "test").unwrap(), None);
    }
}
