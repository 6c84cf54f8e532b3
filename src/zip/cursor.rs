//! Sequential little-endian decoding over a byte window.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Cursor over a borrowed byte window.
///
/// Every read advances past the consumed bytes and fails with
/// [`Error::UnexpectedEof`] when the window is exhausted, so a corrupt
/// length field can never read out of bounds.
pub struct ByteCursor<'a> {
    buf: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::UnexpectedEof {
                needed: n,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Slice off a fixed-length child window.
    pub fn sub(&mut self, n: usize) -> Result<ByteCursor<'a>> {
        Ok(ByteCursor::new(self.take(n)?))
    }

    /// Consume `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_in_order() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.u8().unwrap(), 0x01);
        assert_eq!(cursor.u16().unwrap(), 0x0302);
        assert_eq!(cursor.u32().unwrap(), 0x07060504);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn u64_little_endian() {
        let data = 0xdead_beef_cafe_f00du64.to_le_bytes();
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.u64().unwrap(), 0xdead_beef_cafe_f00d);
    }

    #[test]
    fn short_window_is_an_error_not_a_panic() {
        let data = [0x01, 0x02];
        let mut cursor = ByteCursor::new(&data);
        let err = cursor.u32().unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedEof {
                needed: 4,
                available: 2
            }
        ));
        // The failed read consumed nothing.
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn sub_slices_a_bounded_child() {
        let data = [0xaa, 0xbb, 0xcc, 0xdd];
        let mut cursor = ByteCursor::new(&data);
        let mut child = cursor.sub(2).unwrap();
        assert_eq!(child.u16().unwrap(), 0xbbaa);
        assert!(child.u8().is_err());
        assert_eq!(cursor.remaining(), 2);
        assert!(cursor.sub(3).is_err());
    }
}
