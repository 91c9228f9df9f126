use std::io::{self, BufRead, Read};

/// Buffered reader that lets callers return consumed bytes to the front of
/// the stream.
///
/// Returned bytes are served from `front` before the inner reader is touched
/// again, so a record decoder wrapped around this reader sees them exactly as
/// if they had never been read.
pub struct PushbackReader<R> {
    inner: R,
    front: Vec<u8>,
    cursor: usize,
    consumed: u64,
}

impl<R: BufRead> PushbackReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            front: Vec::new(),
            cursor: 0,
            consumed: 0,
        }
    }

    /// Return `bytes` so that the next read yields them first, in order.
    pub fn unread(&mut self, bytes: &[u8]) {
        let mut front = Vec::with_capacity(bytes.len() + self.front.len() - self.cursor);
        front.extend_from_slice(bytes);
        front.extend_from_slice(&self.front[self.cursor..]);
        self.front = front;
        self.cursor = 0;
        self.consumed -= bytes.len() as u64;
    }

    /// Net number of bytes handed out (reads minus unreads).
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// Read a single byte, `None` at end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.fill_buf()?.first() {
            Some(&b) => b,
            None => return Ok(None),
        };
        self.consume(1);
        Ok(Some(byte))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> Read for PushbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for PushbackReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.cursor < self.front.len() {
            return Ok(&self.front[self.cursor..]);
        }
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if self.cursor < self.front.len() {
            self.cursor = (self.cursor + amt).min(self.front.len());
            if self.cursor == self.front.len() {
                self.front.clear();
                self.cursor = 0;
            }
        } else {
            self.inner.consume(amt);
        }
        self.consumed += amt as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unread_bytes_come_back_in_order() {
        let mut reader = PushbackReader::new(&b"abcdef"[..]);
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.position(), 4);

        reader.unread(&buf[1..]);
        assert_eq!(reader.position(), 1);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"bcdef");
    }

    #[test]
    fn read_byte_reports_end_of_stream() {
        let mut reader = PushbackReader::new(&b"x"[..]);
        assert_eq!(reader.read_byte().unwrap(), Some(b'x'));
        assert_eq!(reader.read_byte().unwrap(), None);
        reader.unread(b"x");
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_byte().unwrap(), Some(b'x'));
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn partially_consumed_pushback_keeps_its_tail() {
        let mut reader = PushbackReader::new(&b"abcdef"[..]);
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        reader.unread(&buf);
        assert_eq!(reader.read_byte().unwrap(), Some(b'a'));
        reader.unread(b"a");
        assert_eq!(reader.position(), 0);
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "abcdef");
    }
}
