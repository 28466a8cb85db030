//! Zero-copy binary codec shared with the alliance chain.
//!
//! Integers are little-endian. Variable-length fields are prefixed with a
//! var-uint: values below `0xFD` take one byte, otherwise a marker byte
//! (`0xFD`, `0xFE`, `0xFF`) is followed by a u16, u32 or u64. Decoding rejects
//! non-minimal var-uints so every value has exactly one encoding.

use crate::CodecError;

/// Append-only output buffer.
#[derive(Debug, Default)]
pub struct Sink {
    buf: Vec<u8>,
}

impl Sink {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_var_uint(&mut self, v: u64) {
        if v < 0xFD {
            self.write_u8(v as u8);
        } else if v <= u64::from(u16::MAX) {
            self.write_u8(0xFD);
            self.write_u16(v as u16);
        } else if v <= u64::from(u32::MAX) {
            self.write_u8(0xFE);
            self.write_u32(v as u32);
        } else {
            self.write_u8(0xFF);
            self.write_u64(v);
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_uint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Borrowing cursor over an input buffer.
#[derive(Debug)]
pub struct Source<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Source<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.read_bytes(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash32(&mut self) -> Result<[u8; 32], CodecError> {
        self.read_array()
    }

    pub fn read_var_uint(&mut self) -> Result<u64, CodecError> {
        let v = match self.read_u8()? {
            0xFD => {
                let v = u64::from(self.read_u16()?);
                if v < 0xFD {
                    return Err(CodecError::IrregularVarUint);
                }
                v
            }
            0xFE => {
                let v = u64::from(self.read_u32()?);
                if v <= u64::from(u16::MAX) {
                    return Err(CodecError::IrregularVarUint);
                }
                v
            }
            0xFF => {
                let v = self.read_u64()?;
                if v <= u64::from(u32::MAX) {
                    return Err(CodecError::IrregularVarUint);
                }
                v
            }
            small => u64::from(small),
        };
        Ok(v)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_var_uint()?;
        let len = usize::try_from(len).map_err(|_| CodecError::UnexpectedEof {
            needed: usize::MAX,
            remaining: self.remaining(),
        })?;
        self.read_bytes(len)
    }
}

/// Types with a canonical binary encoding.
pub trait Encode {
    fn encode(&self, sink: &mut Sink);

    fn to_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        self.encode(&mut sink);
        sink.into_bytes()
    }
}

/// Types decodable from their canonical binary encoding.
pub trait Decode: Sized {
    fn decode(source: &mut Source<'_>) -> Result<Self, CodecError>;

    /// Decode a complete buffer, rejecting trailing bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut source = Source::new(bytes);
        let value = Self::decode(&mut source)?;
        if !source.is_empty() {
            return Err(CodecError::TrailingBytes(source.remaining()));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_uint_bytes(v: u64) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_uint(v);
        sink.into_bytes()
    }

    #[test]
    fn var_uint_boundaries() {
        assert_eq!(var_uint_bytes(0xFC), vec![0xFC]);
        assert_eq!(var_uint_bytes(0xFD), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(var_uint_bytes(0x1_0000), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(var_uint_bytes(u64::MAX)[0], 0xFF);
    }

    #[test]
    fn non_minimal_var_uint_rejected() {
        let mut source = Source::new(&[0xFD, 0x10, 0x00]);
        assert_eq!(source.read_var_uint(), Err(CodecError::IrregularVarUint));
    }

    #[test]
    fn truncated_var_bytes_is_eof() {
        let mut source = Source::new(&[0x05, 1, 2]);
        assert!(matches!(
            source.read_var_bytes(),
            Err(CodecError::UnexpectedEof { needed: 5, remaining: 2 })
        ));
    }

    #[test]
    fn integers_are_little_endian() {
        let mut sink = Sink::new();
        sink.write_u32(0x0102_0304);
        assert_eq!(sink.into_bytes(), vec![4, 3, 2, 1]);
    }
}
