use thiserror::Error;

#[derive(Debug, Error)]
#[error("unexpected end of data")]
pub struct UnexpectedEnd;

/// Bounded cursor over a byte buffer.
///
/// Positions are absolute indices into the underlying buffer, so a reader
/// restricted to a sub-range still reports offsets that make sense to a
/// caller looking at the whole file.
pub struct ByteReader<'a> {
    data: &'a [u8],
    start: usize,
    end: usize,
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            start: 0,
            end: data.len(),
            position: 0,
        }
    }

    /// A reader restricted to `[start, end)` of `data`.
    pub fn slice(data: &'a [u8], start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= data.len());
        Self {
            data,
            start,
            end,
            position: start,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end - self.position
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.end
    }

    pub fn seek(&mut self, position: usize) -> Result<(), UnexpectedEnd> {
        if position < self.start || position > self.end {
            return Err(UnexpectedEnd);
        }
        self.position = position;
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8, UnexpectedEnd> {
        if self.at_end() {
            return Err(UnexpectedEnd);
        }
        Ok(self.data[self.position])
    }

    pub fn read_u8(&mut self) -> Result<u8, UnexpectedEnd> {
        let value = self.peek_u8()?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, UnexpectedEnd> {
        let bytes = self.read_exact(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, UnexpectedEnd> {
        let bytes = self.read_exact(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_exact(&mut self, count: usize) -> Result<&'a [u8], UnexpectedEnd> {
        if self.remaining() < count {
            return Err(UnexpectedEnd);
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.peek_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16_le().unwrap(), 0x0302);
        assert_eq!(reader.read_u32_le().unwrap(), 0x07060504);
        assert!(reader.at_end());
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_slice_bounds() {
        let data = [0u8; 16];
        let mut reader = ByteReader::slice(&data, 4, 8);

        assert_eq!(reader.position(), 4);
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.read_exact(4).unwrap().len(), 4);
        assert!(reader.read_u8().is_err());

        assert!(reader.seek(3).is_err());
        assert!(reader.seek(9).is_err());
        reader.seek(8).unwrap();
        assert!(reader.at_end());
    }
}
