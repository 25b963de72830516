use byteorder::{ByteOrder, LittleEndian};

use super::validate::ValidationError;
use super::ParseError;

/// A forward-only cursor over a borrowed byte slice.
///
/// Every read is bounds-checked; running off the end yields
/// [`ParseError::UnexpectedEof`] and leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0 }
    }
}

impl<'a> Reader<'a> {
    // Basic operations --------------------------------------------------------
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    pub fn read_byte(&mut self) -> Result<u8, ParseError> {
        match self.bytes.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if !self.has_at_least(len) {
            return Err(ParseError::UnexpectedEof);
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Everything from the cursor to the end, consuming it.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        bytes
    }

    /// Carve out the next `len` bytes as an independent reader, used for one
    /// section payload or one function body.
    pub fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>, ParseError> {
        Ok(Reader::new(self.read_bytes(len)?))
    }

    /// Reject a declared vector length that exceeds `limit` or that cannot
    /// possibly be backed by the remaining input (every item takes at least
    /// `min_item_size` bytes).
    pub fn validate_item_count(
        &self,
        count: u32,
        limit: u32,
        min_item_size: usize,
    ) -> Result<usize, ParseError> {
        if count > limit {
            return Err(ParseError::TooLarge);
        }
        let needed = (count as u64).saturating_mul(min_item_size as u64);
        if needed > self.remaining() as u64 {
            return Err(ParseError::UnexpectedEof);
        }
        Ok(count as usize)
    }

    // Read and interpret types ------------------------------------------------

    // le
    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ParseError> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    /// Raw IEEE-754 bits; NaN payloads survive untouched.
    pub fn read_f32_bits(&mut self) -> Result<u32, ParseError> {
        self.read_u32()
    }

    pub fn read_f64_bits(&mut self) -> Result<u64, ParseError> {
        self.read_u64()
    }

    pub fn read_vu32(&mut self) -> Result<u32, ParseError> {
        read_vu(&mut || self.read_byte(), 32).map(|v| v as u32)
    }

    pub fn read_vu64(&mut self) -> Result<u64, ParseError> {
        read_vu(&mut || self.read_byte(), 64)
    }

    pub fn read_vs32(&mut self) -> Result<i32, ParseError> {
        read_vs(&mut || self.read_byte(), 32).map(|v| v as i32)
    }

    /// Block types encode a type index as a positive 33-bit signed integer.
    pub fn read_vs33(&mut self) -> Result<i64, ParseError> {
        read_vs(&mut || self.read_byte(), 33)
    }

    pub fn read_vs64(&mut self) -> Result<i64, ParseError> {
        read_vs(&mut || self.read_byte(), 64)
    }

    /// A length-prefixed UTF-8 name.
    pub fn read_name(&mut self) -> Result<String, ParseError> {
        let len = self.read_vu32()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ValidationError::MalformedUtf8.into())
    }

    /// A length-prefixed byte vector.
    pub fn read_byte_vec(&mut self) -> Result<&'a [u8], ParseError> {
        let len = self.read_vu32()? as usize;
        self.read_bytes(len)
    }
}

fn read_vu<F>(reader: &mut F, size: u32) -> Result<u64, ParseError>
where
    F: FnMut() -> Result<u8, ParseError>,
{
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let b = reader()?;
        let payload = (b & 0x7f) as u64;
        let used = size - shift;
        if used <= 7 {
            // final permitted byte: no continuation, no bits beyond `size`
            if b & 0x80 != 0 || payload >> used != 0 {
                return Err(ParseError::TooLarge);
            }
            return Ok(result | (payload << shift));
        }
        result |= payload << shift;
        if b & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

fn read_vs<F>(reader: &mut F, size: u32) -> Result<i64, ParseError>
where
    F: FnMut() -> Result<u8, ParseError>,
{
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let b = reader()?;
        let payload = (b & 0x7f) as i64;
        let used = size - shift;
        if used <= 7 {
            if b & 0x80 != 0 {
                return Err(ParseError::TooLarge);
            }
            // unused high bits must replicate the sign bit
            let sign = (payload >> (used - 1)) & 1;
            let upper = payload >> used;
            let expected = if sign == 1 { 0x7f >> used } else { 0 };
            if upper != expected {
                return Err(ParseError::TooLarge);
            }
            result |= payload << shift;
            shift += 7;
            if shift < 64 && sign == 1 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
        result |= payload << shift;
        shift += 7;
        if b & 0x80 == 0 {
            if shift < 64 && (b & 0x40) != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32() {
        let read = |v: Vec<u8>| -> u32 {
            let mut reader = Reader::new(&v);
            reader.read_u32().expect("Failed to read u32")
        };

        assert_eq!(read(vec![0, 0, 0, 0]), 0);
        assert_eq!(read(vec![1, 0, 0, 0]), 1);
        assert_eq!(read(vec![0, 1, 0, 0]), 256);
        assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80]), 2155905152);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff]), 4294967295);
    }

    #[test]
    fn test_read_vu32() {
        let read = |v: Vec<u8>| {
            let mut reader = Reader::new(&v);
            reader.read_vu32().expect("Failed to read vu32")
        };

        assert_eq!(read(vec![0]), 0);
        assert_eq!(read(vec![1]), 1);
        assert_eq!(read(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
        assert_eq!(read(vec![0x7f]), 127);
        assert_eq!(read(vec![0x80, 0x7f]), 16256);
        assert_eq!(read(vec![0xb4, 0x07]), 0x3b4);
        assert_eq!(read(vec![0x8c, 0x08]), 0x40c);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0xf]), 0xffffffff);
        assert_eq!(read(vec![128, 128, 128, 128, 8]), 0x80000000);
        // redundant padding is fine while it stays within five bytes
        assert_eq!(read(vec![0x81, 0x80, 0x80, 0x80, 0x00]), 1);
    }

    #[test]
    fn test_read_vu32_too_large() {
        let read = |v: Vec<u8>| Reader::new(&v).read_vu32();

        // high bits set in the fifth byte
        assert!(matches!(
            read(vec![0xff, 0xff, 0xff, 0xff, 0x1f]),
            Err(ParseError::TooLarge)
        ));
        // six bytes
        assert!(matches!(
            read(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x00]),
            Err(ParseError::TooLarge)
        ));
    }

    #[test]
    fn test_read_vu32_eof() {
        let mut reader = Reader::new(&[0x80, 0x80]);
        assert!(matches!(reader.read_vu32(), Err(ParseError::UnexpectedEof)));
    }

    #[test]
    fn test_read_vu64() {
        let read = |v: Vec<u8>| {
            let mut reader = Reader::new(&v);
            reader.read_vu64().expect("Failed to read vu64")
        };

        assert_eq!(read(vec![0]), 0);
        assert_eq!(read(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0xf]), 0xffffffff);
        assert_eq!(
            read(vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
            u64::MAX
        );
        assert!(matches!(
            Reader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02]).read_vu64(),
            Err(ParseError::TooLarge)
        ));
    }

    #[test]
    fn test_read_vs32() {
        let read = |v: Vec<u8>| {
            let mut reader = Reader::new(&v);
            reader.read_vs32().expect("Failed to read vs32")
        };

        assert_eq!(read(vec![0]), 0);
        assert_eq!(read(vec![1]), 1);
        assert_eq!(read(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
        assert_eq!(read(vec![0x7f]), -1);
        assert_eq!(read(vec![0x80, 0x7f]), -128);
        assert_eq!(read(vec![0b10011011, 0b11110001, 0b01011001]), -624485);
        // this is different as a 32 than a 64
        assert_eq!(read(vec![128, 128, 128, 128, 120]), i32::MIN);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x07]), i32::MAX);
    }

    #[test]
    fn test_read_vs32_too_large() {
        let read = |v: Vec<u8>| Reader::new(&v).read_vs32();

        // positive value with garbage above the sign bit
        assert!(matches!(
            read(vec![0xff, 0xff, 0xff, 0xff, 0x0f]),
            Err(ParseError::TooLarge)
        ));
        // negative value whose unused bits are not a sign extension
        assert!(matches!(
            read(vec![0x80, 0x80, 0x80, 0x80, 0x70]),
            Err(ParseError::TooLarge)
        ));
    }

    #[test]
    fn test_read_vs64() {
        let read = |v: Vec<u8>| {
            let mut reader = Reader::new(&v);
            reader.read_vs64().expect("Failed to read vs64")
        };

        assert_eq!(read(vec![0x7f]), -1);
        assert_eq!(read(vec![0x80, 0x7f]), -128);
        assert_eq!(
            read(vec![128, 128, 128, 128, 128, 128, 128, 252, 255, 0]),
            0x7ff8000000000000
        );
        assert_eq!(
            read(vec![128, 128, 128, 128, 128, 128, 128, 128, 128, 127]),
            i64::MIN
        );
        assert!(matches!(
            Reader::new(&[128, 128, 128, 128, 128, 128, 128, 128, 128, 1]).read_vs64(),
            Err(ParseError::TooLarge)
        ));
    }

    #[test]
    fn test_read_vs33() {
        let read = |v: Vec<u8>| Reader::new(&v).read_vs33().expect("Failed to read vs33");

        assert_eq!(read(vec![0x40]), -64);
        assert_eq!(read(vec![0x05]), 5);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x0f]), 0xffffffff);
    }

    #[test]
    fn test_read_float_bits() {
        let mut reader = Reader::new(&[0x01, 0x00, 0xa0, 0x7f, 0, 0, 0, 0, 0, 0, 0xf8, 0xff]);
        assert_eq!(reader.read_f32_bits().unwrap(), 0x7fa00001);
        assert_eq!(reader.read_f64_bits().unwrap(), 0xfff8000000000000);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_name() {
        let read = |v: &[u8]| Reader::new(v).read_name();

        assert_eq!(read(b"\x05hello").unwrap(), "hello");
        assert_eq!(read(&[0x02, 0xc3, 0xa9]).unwrap(), "\u{e9}");
        // overlong encoding of '/'
        assert!(matches!(
            read(&[0x02, 0xc0, 0xaf]),
            Err(ParseError::ValidationFailed(ValidationError::MalformedUtf8))
        ));
        // surrogate half U+D800
        assert!(matches!(
            read(&[0x03, 0xed, 0xa0, 0x80]),
            Err(ParseError::ValidationFailed(ValidationError::MalformedUtf8))
        ));
        // above U+10FFFF
        assert!(matches!(
            read(&[0x04, 0xf4, 0x90, 0x80, 0x80]),
            Err(ParseError::ValidationFailed(ValidationError::MalformedUtf8))
        ));
        assert!(matches!(read(&[0x04, b'a']), Err(ParseError::UnexpectedEof)));
    }

    #[test]
    fn test_sub_reader_is_bounded() {
        let mut reader = Reader::new(&[1, 2, 3, 4]);
        let mut section = reader.sub_reader(2).unwrap();
        assert_eq!(section.read_byte().unwrap(), 1);
        assert_eq!(section.read_byte().unwrap(), 2);
        assert!(matches!(section.read_byte(), Err(ParseError::UnexpectedEof)));
        assert_eq!(reader.read_byte().unwrap(), 3);
        assert!(matches!(reader.sub_reader(5), Err(ParseError::UnexpectedEof)));
    }

    #[test]
    fn test_validate_item_count() {
        let reader = Reader::new(&[0; 4]);
        assert_eq!(reader.validate_item_count(4, 10, 1).unwrap(), 4);
        assert!(matches!(
            reader.validate_item_count(11, 10, 1),
            Err(ParseError::TooLarge)
        ));
        assert!(matches!(
            reader.validate_item_count(5, 10, 1),
            Err(ParseError::UnexpectedEof)
        ));
    }
}
