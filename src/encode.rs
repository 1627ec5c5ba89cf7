//! Serialize data into the wire protocol.
//!
//! Every request body is encoded through [`Wire`], which pairs the encoder
//! with an exact [`wire_len`](Wire::wire_len) so frames can be sized up
//! front: the broker reserves `4 + header + body` bytes once, writes the
//! big-endian length prefix, and serializes without reallocation.
//!
//! Wire rules: all integers big-endian; STRING is an i16 length then UTF-8
//! bytes (-1 for null); BYTES is an i32 length then raw bytes (-1 for
//! null); ARRAY is an i32 element count then the elements.

use bytes::{BufMut, Bytes};

use crate::error::Result;

pub trait Wire {
    /// Exact number of bytes [`encode`](Wire::encode) will write.
    fn wire_len(&self) -> usize;

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()>;
}

impl<'a, T: Wire + 'a + ?Sized> Wire for &'a T {
    fn wire_len(&self) -> usize {
        (*self).wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl Wire for bool {
    fn wire_len(&self) -> usize {
        1
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i8(*self as i8);
        Ok(())
    }
}

impl Wire for i8 {
    fn wire_len(&self) -> usize {
        1
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl Wire for i16 {
    fn wire_len(&self) -> usize {
        2
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl Wire for i32 {
    fn wire_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl Wire for u32 {
    fn wire_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_u32(*self);
        Ok(())
    }
}

impl Wire for i64 {
    fn wire_len(&self) -> usize {
        8
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

impl Wire for str {
    fn wire_len(&self) -> usize {
        2 + self.len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i16(self.len() as i16);
        buffer.put(self.as_bytes());
        Ok(())
    }
}

impl Wire for String {
    fn wire_len(&self) -> usize {
        2 + self.len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

/// Nullable STRING: -1 length denotes null.
impl Wire for Option<String> {
    fn wire_len(&self) -> usize {
        match self {
            Some(s) => s.wire_len(),
            None => 2,
        }
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        match self {
            Some(s) => s.encode(buffer),
            None => (-1i16).encode(buffer),
        }
    }
}

/// BYTES: i32 length then raw bytes.
impl Wire for Bytes {
    fn wire_len(&self) -> usize {
        4 + self.len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i32(self.len() as i32);
        buffer.put_slice(self);
        Ok(())
    }
}

impl Wire for [u8] {
    fn wire_len(&self) -> usize {
        4 + self.len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i32(self.len() as i32);
        buffer.put(self);
        Ok(())
    }
}

/// Nullable BYTES: -1 length denotes null.
impl Wire for Option<Bytes> {
    fn wire_len(&self) -> usize {
        match self {
            Some(b) => b.wire_len(),
            None => 4,
        }
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        match self {
            Some(b) => b.encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

/// ARRAY(T): i32 element count then the elements.
impl<T: Wire> Wire for Vec<T> {
    fn wire_len(&self) -> usize {
        4 + self.iter().map(Wire::wire_len).sum::<usize>()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        buffer.put_i32(self.len() as i32);
        for item in self {
            item.encode(buffer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_i16_big_endian() {
        let mut buf = Vec::new();
        0x1234i16.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x12, 0x34]);
        assert_eq!(0x1234i16.wire_len(), 2);
    }

    #[test]
    fn test_encode_i32_big_endian() {
        let mut buf = Vec::new();
        0x12345678i32.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_encode_i64_big_endian() {
        let mut buf = Vec::new();
        0x123456789ABCDEF0i64.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]);
        assert_eq!(0i64.wire_len(), 8);
    }

    #[test]
    fn test_encode_string() {
        let mut buf = Vec::new();
        "hi".encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x02, b'h', b'i']);
        assert_eq!("hi".wire_len(), 4);
    }

    #[test]
    fn test_encode_empty_string_has_zero_length_prefix() {
        let mut buf = Vec::new();
        "".encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x00]);
    }

    #[test]
    fn test_encode_nullable_string_none() {
        let mut buf = Vec::new();
        let s: Option<String> = None;
        s.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0xFF, 0xFF]);
        assert_eq!(s.wire_len(), 2);
    }

    #[test]
    fn test_encode_bytes() {
        let mut buf = Vec::new();
        Bytes::from(vec![1, 2, 3]).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x00, 0x00, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_encode_nullable_bytes_none() {
        let mut buf = Vec::new();
        let b: Option<Bytes> = None;
        b.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(b.wire_len(), 4);
    }

    #[test]
    fn test_encode_array_of_i32() {
        let mut buf = Vec::new();
        let xs = vec![1i32, 2];
        xs.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                0x00, 0x00, 0x00, 0x02, // count
                0x00, 0x00, 0x00, 0x01, // 1
                0x00, 0x00, 0x00, 0x02, // 2
            ]
        );
        assert_eq!(xs.wire_len(), 12);
    }

    #[test]
    fn test_encode_array_of_strings() {
        let mut buf = Vec::new();
        let xs = vec!["a".to_string(), "bc".to_string()];
        xs.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x01, b'a', 0x00, 0x02, b'b', b'c']
        );
        assert_eq!(xs.wire_len(), buf.len());
    }

    #[test]
    fn test_wire_len_matches_encoded_len() {
        let mut buf = Vec::new();
        let value = Some(Bytes::from_static(b"payload"));
        value.encode(&mut buf).unwrap();
        assert_eq!(value.wire_len(), buf.len());
    }
}
