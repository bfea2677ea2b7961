use std::io::{self, prelude::*, SeekFrom};

/// A sub-block length is a single byte.
pub(crate) const MAX_SUB_BLOCK_LEN: usize = 255;

/// Field readers for GIF streams.
///
/// Unless otherwise stated, multi-byte numeric fields are ordered with the
/// least significant byte first.
pub(crate) trait GifRead: Read + Seek {
    fn read_byte(&mut self) -> io::Result<u8> {
        let [byte] = self.read_fixed::<1>()?;
        Ok(byte)
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.read_fixed::<2>()?))
    }

    fn read_fixed<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buffer = [0; N];
        self.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn read_bytes(&mut self, count: usize) -> io::Result<Box<[u8]>> {
        let mut buffer = vec![0; count];
        self.read_exact(&mut buffer)?;
        Ok(buffer.into_boxed_slice())
    }

    /// Reads one length-prefixed sub-block into `buf` and returns its length.
    /// A length of zero is the block terminator.
    fn read_sub_block(&mut self, buf: &mut [u8; MAX_SUB_BLOCK_LEN]) -> io::Result<usize> {
        let len = usize::from(self.read_byte()?);
        self.read_exact(&mut buf[..len])?;
        Ok(len)
    }

    /// Skips sub-blocks up to and including the terminator.
    fn skip_sub_blocks(&mut self) -> io::Result<()> {
        loop {
            let len = self.read_byte()?;
            if len == 0 {
                return Ok(());
            }
            self.seek(SeekFrom::Current(i64::from(len)))?;
        }
    }

    fn stream_offset(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

impl<T: Read + Seek + ?Sized> GifRead for T {}
