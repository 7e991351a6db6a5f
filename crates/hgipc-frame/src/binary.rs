//! Tag-prefixed binary encoding of [`Variant`] trees.
//!
//! Each value is a one-byte tag followed by its payload:
//!
//! | Tag    | Kind    | Payload                                   |
//! |--------|---------|-------------------------------------------|
//! | `0x00` | void    | none                                      |
//! | `0x01` | boolean | 1 byte, `0` or `1`                        |
//! | `0x02` | integer | 8 bytes, signed                           |
//! | `0x03` | float   | 8 bytes, IEEE-754 binary64                |
//! | `0x04` | string  | u32 length + UTF-8 bytes                  |
//! | `0x05` | binary  | u32 length + bytes                        |
//! | `0x10` | array   | u32 count + elements                      |
//! | `0x11` | struct  | u32 count + (key, value) pairs            |
//!
//! Every multi-byte number is big-endian.

use bytes::{Buf, BufMut, BytesMut};
use hgipc_variant::Variant;

use crate::error::ProtocolError;

/// Maximum array/struct nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 128;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Void = 0x00,
    Bool = 0x01,
    Integer = 0x02,
    Float = 0x03,
    String = 0x04,
    Binary = 0x05,
    Array = 0x10,
    Struct = 0x11,
}

impl Tag {
    const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Tag::Void),
            0x01 => Some(Tag::Bool),
            0x02 => Some(Tag::Integer),
            0x03 => Some(Tag::Float),
            0x04 => Some(Tag::String),
            0x05 => Some(Tag::Binary),
            0x10 => Some(Tag::Array),
            0x11 => Some(Tag::Struct),
            _ => None,
        }
    }
}

/// Append the encoding of `value` to `dst`.
pub fn encode_variant(value: &Variant, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    match value {
        Variant::Void => dst.put_u8(Tag::Void as u8),
        Variant::Bool(b) => {
            dst.put_u8(Tag::Bool as u8);
            dst.put_u8(u8::from(*b));
        }
        Variant::Integer(i) => {
            dst.put_u8(Tag::Integer as u8);
            dst.put_i64(*i);
        }
        Variant::Float(f) => {
            dst.put_u8(Tag::Float as u8);
            dst.put_f64(*f);
        }
        Variant::String(s) => {
            dst.put_u8(Tag::String as u8);
            put_len(dst, "string", s.len())?;
            dst.put_slice(s.as_bytes());
        }
        Variant::Binary(bytes) => {
            dst.put_u8(Tag::Binary as u8);
            put_len(dst, "binary", bytes.len())?;
            dst.put_slice(bytes);
        }
        Variant::Array(items) => {
            dst.put_u8(Tag::Array as u8);
            put_len(dst, "array", items.len())?;
            for item in items {
                encode_variant(item, dst)?;
            }
        }
        Variant::Struct(entries) => {
            dst.put_u8(Tag::Struct as u8);
            put_len(dst, "struct", entries.len())?;
            for (key, value) in entries {
                encode_variant(key, dst)?;
                encode_variant(value, dst)?;
            }
        }
    }
    Ok(())
}

fn put_len(dst: &mut BytesMut, what: &'static str, len: usize) -> Result<(), ProtocolError> {
    let len32 = u32::try_from(len).map_err(|_| ProtocolError::TooLarge {
        what,
        len,
        max: u32::MAX as usize,
    })?;
    dst.put_u32(len32);
    Ok(())
}

/// Decode one variant from the front of `src`, advancing it past the value.
pub fn decode_variant(src: &mut &[u8]) -> Result<Variant, ProtocolError> {
    decode_nested(src, 0)
}

/// Decode a buffer that must contain exactly one variant.
pub fn decode_variant_exact(mut src: &[u8]) -> Result<Variant, ProtocolError> {
    let value = decode_variant(&mut src)?;
    if !src.is_empty() {
        return Err(ProtocolError::TrailingBytes(src.len()));
    }
    Ok(value)
}

fn decode_nested(src: &mut &[u8], depth: usize) -> Result<Variant, ProtocolError> {
    need(src, 1)?;
    let raw_tag = src.get_u8();
    let tag = Tag::from_u8(raw_tag).ok_or(ProtocolError::UnknownTag(raw_tag))?;

    Ok(match tag {
        Tag::Void => Variant::Void,
        Tag::Bool => {
            need(src, 1)?;
            match src.get_u8() {
                0 => Variant::Bool(false),
                1 => Variant::Bool(true),
                other => return Err(ProtocolError::InvalidBoolean(other)),
            }
        }
        Tag::Integer => {
            need(src, 8)?;
            Variant::Integer(src.get_i64())
        }
        Tag::Float => {
            need(src, 8)?;
            Variant::Float(src.get_f64())
        }
        Tag::String => {
            let len = get_len(src)?;
            let bytes = take(src, len)?;
            Variant::String(String::from_utf8(bytes.to_vec())?)
        }
        Tag::Binary => {
            let len = get_len(src)?;
            Variant::Binary(take(src, len)?.to_vec())
        }
        Tag::Array => {
            let count = get_len(src)?;
            let depth = enter(depth)?;
            // Every element occupies at least its tag byte.
            need(src, count)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_nested(src, depth)?);
            }
            Variant::Array(items)
        }
        Tag::Struct => {
            let count = get_len(src)?;
            let depth = enter(depth)?;
            need(src, count.saturating_mul(2))?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let key = decode_nested(src, depth)?;
                let value = decode_nested(src, depth)?;
                entries.push((key, value));
            }
            Variant::Struct(entries)
        }
    })
}

fn enter(depth: usize) -> Result<usize, ProtocolError> {
    let next = depth + 1;
    if next > MAX_DEPTH {
        return Err(ProtocolError::DepthExceeded { max: MAX_DEPTH });
    }
    Ok(next)
}

fn need(src: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if src.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}

fn get_len(src: &mut &[u8]) -> Result<usize, ProtocolError> {
    need(src, 4)?;
    Ok(src.get_u32() as usize)
}

fn take<'a>(src: &mut &'a [u8], len: usize) -> Result<&'a [u8], ProtocolError> {
    need(src, len)?;
    let (head, tail) = src.split_at(len);
    *src = tail;
    Ok(head)
}
