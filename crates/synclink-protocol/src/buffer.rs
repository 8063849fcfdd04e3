//! The binary packet buffer: field writers and a cursor-based reader.
//!
//! Every frame on the wire starts with a 3-byte header —
//! `[packet id: 1][sequence: 2, big-endian]` — followed by the
//! variant-specific payload. [`PacketBuffer`] is used for both
//! directions: writers append fields to a growable byte vector, readers
//! walk a cursor over a received frame.
//!
//! All multi-byte integers are big-endian. Strings are a 4-byte length
//! prefix plus UTF-8 bytes; lists and maps are a 4-byte count prefix
//! plus their elements; wide integers are a 4-byte length prefix plus a
//! minimal two's-complement big-endian byte array.

use crate::ProtocolError;

/// Size of the frame header: 1-byte packet id + 2-byte sequence.
pub const HEADER_SIZE: usize = 3;

/// A growable write buffer / cursor-based read buffer for one frame.
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl PacketBuffer {
    /// Creates a write buffer with the header already stamped.
    pub fn for_frame(packet_id: u8, sequence: u16) -> Self {
        let mut data = Vec::with_capacity(32);
        data.push(packet_id);
        data.extend_from_slice(&sequence.to_be_bytes());
        Self { data, cursor: 0 }
    }

    /// Wraps a received frame for reading. The cursor starts at 0;
    /// call [`focus_data`](Self::focus_data) to skip past the header.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    /// The packet id from the frame header.
    pub fn packet_id(&self) -> Result<u8, ProtocolError> {
        if self.data.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortHeader {
                len: self.data.len(),
            });
        }
        Ok(self.data[0])
    }

    /// The sequence number from the frame header.
    pub fn sequence(&self) -> Result<u16, ProtocolError> {
        if self.data.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortHeader {
                len: self.data.len(),
            });
        }
        Ok(u16::from_be_bytes([self.data[1], self.data[2]]))
    }

    /// Positions the read cursor just past the header, ready for
    /// variant-specific field decoding.
    pub fn focus_data(&mut self) {
        self.cursor = HEADER_SIZE;
    }

    /// Rewinds the read cursor to the start of the frame, for re-reads.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor)
    }

    /// Consumes the buffer, returning the encoded frame.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The full frame as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    // -- writers ----------------------------------------------------------
    //
    // Writers never fail. Growth is geometric: when the buffer is full we
    // reserve the current capacity again plus the bytes required, so a
    // packet with many fields does not reallocate per field.

    fn grow_for(&mut self, extra: usize) {
        if self.data.len() + extra > self.data.capacity() {
            self.data.reserve(self.data.capacity().max(16) + extra);
        }
    }

    /// Appends a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.grow_for(1);
        self.data.push(value);
    }

    /// Appends a boolean as one byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Appends a signed 16-bit integer, big-endian.
    pub fn write_i16(&mut self, value: i16) {
        self.grow_for(2);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends an unsigned 16-bit integer, big-endian.
    pub fn write_u16(&mut self, value: u16) {
        self.grow_for(2);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a signed 32-bit integer, big-endian.
    pub fn write_i32(&mut self, value: i32) {
        self.grow_for(4);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends an unsigned 32-bit integer, big-endian.
    pub fn write_u32(&mut self, value: u32) {
        self.grow_for(4);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a signed 64-bit integer, big-endian.
    pub fn write_i64(&mut self, value: i64) {
        self.grow_for(8);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a 32-bit float, big-endian IEEE 754.
    pub fn write_f32(&mut self, value: f32) {
        self.grow_for(4);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a 64-bit float, big-endian IEEE 754.
    pub fn write_f64(&mut self, value: f64) {
        self.grow_for(8);
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a UTF-8 string: 4-byte length prefix + bytes.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.grow_for(value.len());
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Appends a wide integer: 4-byte length prefix + minimal
    /// two's-complement big-endian byte array.
    ///
    /// This is the classic arbitrary-precision byte layout, so the wire
    /// format stays compatible with peers that use true big integers;
    /// in memory we carry values as `i128`.
    pub fn write_wide(&mut self, value: i128) {
        let raw = value.to_be_bytes();
        // Strip redundant sign-extension bytes, keeping at least one.
        let mut start = 0;
        while start < raw.len() - 1 {
            let redundant = (raw[start] == 0x00 && raw[start + 1] < 0x80)
                || (raw[start] == 0xFF && raw[start + 1] >= 0x80);
            if !redundant {
                break;
            }
            start += 1;
        }
        let bytes = &raw[start..];
        self.write_u32(bytes.len() as u32);
        self.grow_for(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Appends a homogeneous list: 4-byte count prefix + elements.
    pub fn write_list<T>(
        &mut self,
        items: &[T],
        mut write_item: impl FnMut(&mut Self, &T),
    ) {
        self.write_u32(items.len() as u32);
        for item in items {
            write_item(self, item);
        }
    }

    /// Appends a homogeneous map: 4-byte count prefix + key/value pairs.
    pub fn write_pairs<'a, K: 'a, V: 'a>(
        &mut self,
        pairs: impl ExactSizeIterator<Item = (&'a K, &'a V)>,
        mut write_pair: impl FnMut(&mut Self, &K, &V),
    ) {
        self.write_u32(pairs.len() as u32);
        for (key, value) in pairs {
            write_pair(self, key, value);
        }
    }

    // -- readers ----------------------------------------------------------

    fn take(&mut self, needed: usize) -> Result<&[u8], ProtocolError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        let slice = &self.data[self.cursor..self.cursor + needed];
        self.cursor += needed;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a boolean (one byte, zero = false).
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a signed 16-bit integer, big-endian.
    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads an unsigned 16-bit integer, big-endian.
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a signed 32-bit integer, big-endian.
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads an unsigned 32-bit integer, big-endian.
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a signed 64-bit integer, big-endian.
    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_be_bytes(raw))
    }

    /// Reads a 32-bit float.
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a 64-bit float.
    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_be_bytes(raw))
    }

    fn read_len_prefix(&mut self) -> Result<usize, ProtocolError> {
        let declared = self.read_u32()? as usize;
        let remaining = self.remaining();
        if declared > remaining {
            return Err(ProtocolError::LengthOverrun {
                declared,
                remaining,
            });
        }
        Ok(declared)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_len_prefix()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Reads a wide integer (length-prefixed two's-complement bytes).
    pub fn read_wide(&mut self) -> Result<i128, ProtocolError> {
        let len = self.read_len_prefix()?;
        if len == 0 || len > 16 {
            return Err(ProtocolError::WideIntWidth { len });
        }
        let bytes = self.take(len)?;
        let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut raw = [fill; 16];
        raw[16 - len..].copy_from_slice(bytes);
        Ok(i128::from_be_bytes(raw))
    }

    /// Reads a count-prefixed homogeneous list.
    pub fn read_list<T>(
        &mut self,
        read_item: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Vec<T>, ProtocolError> {
        let count = self.read_len_prefix()?;
        self.read_list_n(count, read_item)
    }

    /// Reads a list whose element count was supplied out of band.
    pub fn read_list_n<T>(
        &mut self,
        count: usize,
        mut read_item: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Vec<T>, ProtocolError> {
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(read_item(self)?);
        }
        Ok(items)
    }

    /// Reads a count-prefixed sequence of key/value pairs.
    pub fn read_pairs<K, V>(
        &mut self,
        mut read_pair: impl FnMut(&mut Self) -> Result<(K, V), ProtocolError>,
    ) -> Result<Vec<(K, V)>, ProtocolError> {
        let count = self.read_len_prefix()?;
        let mut pairs = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            pairs.push(read_pair(self)?);
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_buf() -> PacketBuffer {
        PacketBuffer::for_frame(0, 0)
    }

    fn reread(buf: PacketBuffer) -> PacketBuffer {
        let mut buf = PacketBuffer::from_bytes(buf.into_bytes());
        buf.focus_data();
        buf
    }

    #[test]
    fn header_is_stamped_and_readable() {
        let buf = PacketBuffer::for_frame(7, 0x1234);
        assert_eq!(buf.packet_id().unwrap(), 7);
        assert_eq!(buf.sequence().unwrap(), 0x1234);
        assert_eq!(buf.as_bytes(), &[7, 0x12, 0x34]);
    }

    #[test]
    fn short_frame_header_errors() {
        let buf = PacketBuffer::from_bytes(vec![1, 2]);
        assert!(matches!(
            buf.packet_id(),
            Err(ProtocolError::ShortHeader { len: 2 })
        ));
        assert!(buf.sequence().is_err());
    }

    #[test]
    fn primitive_round_trip() {
        let mut buf = write_buf();
        buf.write_u8(0xAB);
        buf.write_bool(true);
        buf.write_i16(-2);
        buf.write_u16(65_000);
        buf.write_i32(-100_000);
        buf.write_i64(-5_000_000_000);
        buf.write_f32(1.5);
        buf.write_f64(-2.25);

        let mut buf = reread(buf);
        assert_eq!(buf.read_u8().unwrap(), 0xAB);
        assert!(buf.read_bool().unwrap());
        assert_eq!(buf.read_i16().unwrap(), -2);
        assert_eq!(buf.read_u16().unwrap(), 65_000);
        assert_eq!(buf.read_i32().unwrap(), -100_000);
        assert_eq!(buf.read_i64().unwrap(), -5_000_000_000);
        assert_eq!(buf.read_f32().unwrap(), 1.5);
        assert_eq!(buf.read_f64().unwrap(), -2.25);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = write_buf();
        buf.write_string("héllo wörld");
        buf.write_string("");
        let mut buf = reread(buf);
        assert_eq!(buf.read_string().unwrap(), "héllo wörld");
        assert_eq!(buf.read_string().unwrap(), "");
    }

    #[test]
    fn string_length_overrun_is_malformed() {
        let mut buf = write_buf();
        buf.write_u32(100); // declared length, but no bytes follow
        let mut buf = reread(buf);
        assert!(matches!(
            buf.read_string(),
            Err(ProtocolError::LengthOverrun {
                declared: 100,
                remaining: 0
            })
        ));
    }

    #[test]
    fn wide_int_round_trip_extremes() {
        let values = [
            0i128,
            1,
            -1,
            127,
            128,
            -128,
            -129,
            i64::MAX as i128 + 1,
            i128::MAX,
            i128::MIN,
        ];
        for v in values {
            let mut buf = write_buf();
            buf.write_wide(v);
            let mut buf = reread(buf);
            assert_eq!(buf.read_wide().unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn wide_int_encoding_is_minimal() {
        let mut buf = write_buf();
        buf.write_wide(1);
        // header(3) + length prefix(4) + one payload byte
        assert_eq!(buf.as_bytes().len(), 8);
        assert_eq!(&buf.as_bytes()[3..], &[0, 0, 0, 1, 0x01]);

        let mut buf = write_buf();
        buf.write_wide(-1);
        assert_eq!(&buf.as_bytes()[3..], &[0, 0, 0, 1, 0xFF]);
    }

    #[test]
    fn wide_int_bad_width_is_malformed() {
        let mut buf = write_buf();
        buf.write_u32(0);
        let mut buf = reread(buf);
        assert!(matches!(
            buf.read_wide(),
            Err(ProtocolError::WideIntWidth { len: 0 })
        ));
    }

    #[test]
    fn list_round_trip() {
        let mut buf = write_buf();
        buf.write_list(&[10i64, -20, 30], |b, v| b.write_i64(*v));
        let mut buf = reread(buf);
        let items = buf.read_list(|b| b.read_i64()).unwrap();
        assert_eq!(items, vec![10, -20, 30]);
    }

    #[test]
    fn list_count_overrun_is_malformed() {
        let mut buf = write_buf();
        buf.write_u32(1_000_000);
        let mut buf = reread(buf);
        assert!(buf.read_list(|b| b.read_i64()).is_err());
    }

    #[test]
    fn map_round_trip() {
        use std::collections::BTreeMap;
        let mut map = BTreeMap::new();
        map.insert("kills".to_string(), 42i128);
        map.insert("xp".to_string(), 1_000_000_000_000i128);

        let mut buf = write_buf();
        buf.write_pairs(map.iter(), |b, k, v| {
            b.write_string(k);
            b.write_wide(*v);
        });
        let mut buf = reread(buf);
        let pairs = buf
            .read_pairs(|b| Ok((b.read_string()?, b.read_wide()?)))
            .unwrap();
        let decoded: BTreeMap<String, i128> = pairs.into_iter().collect();
        assert_eq!(decoded, map);
    }

    #[test]
    fn truncated_fixed_read_errors() {
        let mut buf = write_buf();
        buf.write_u8(1);
        let mut buf = reread(buf);
        buf.read_u8().unwrap();
        assert!(matches!(
            buf.read_i32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 0
            })
        ));
    }

    #[test]
    fn reset_allows_reread() {
        let mut buf = write_buf();
        buf.write_u8(9);
        let mut buf = reread(buf);
        assert_eq!(buf.read_u8().unwrap(), 9);
        buf.reset();
        assert_eq!(buf.read_u8().unwrap(), 0); // packet id byte
        buf.focus_data();
        assert_eq!(buf.read_u8().unwrap(), 9);
    }
}
