//! The framed connection: line commands plus length-prefixed chunks.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use crate::NetError;

/// One side of a framed channel over a stream pair.
///
/// Writes are buffered; every read flushes pending output first, so a
/// request/response exchange never deadlocks on an unflushed command.
pub struct Conn {
    inp: Box<dyn BufRead + Send>,
    outp: Box<dyn Write + Send>,
}

impl Conn {
    pub fn new(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            inp: Box::new(BufReader::new(reader)),
            outp: Box::new(BufWriter::new(writer)),
        }
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), NetError> {
        self.outp.write_all(data)?;
        Ok(())
    }

    /// Queue one command line (the newline is added here).
    pub fn write_line(&mut self, line: impl AsRef<str>) -> Result<(), NetError> {
        self.outp.write_all(line.as_ref().as_bytes())?;
        self.outp.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), NetError> {
        self.outp.flush()?;
        Ok(())
    }

    /// Read one line, without its newline. `None` on EOF.
    pub fn read_line(&mut self) -> Result<Option<String>, NetError> {
        self.outp.flush()?;
        let mut line = String::new();
        if self.inp.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        self.outp.flush()?;
        self.inp.read_exact(buf)?;
        Ok(())
    }

    /// Consume the command terminator: blank lines are skipped, `ok`
    /// succeeds, anything else is a protocol violation, EOF means the
    /// peer died.
    pub fn check_ok(&mut self) -> Result<(), NetError> {
        loop {
            match self.read_line()? {
                None => return Err(NetError::ServerClosed),
                Some(line) if line.is_empty() => continue,
                Some(line) if line == "ok" => return Ok(()),
                Some(line) => return Err(NetError::Protocol(line)),
            }
        }
    }

    /// The server-side command terminator.
    pub fn write_ok(&mut self) -> Result<(), NetError> {
        self.outp.write_all(b"\nok\n")?;
        self.flush()
    }

    /// Send one length-prefixed chunk; an empty chunk is the stream
    /// terminator.
    pub fn write_frame(&mut self, data: &[u8]) -> Result<(), NetError> {
        self.outp.write_all(&(data.len() as u32).to_be_bytes())?;
        self.outp.write_all(data)?;
        Ok(())
    }

    /// Read one length-prefixed chunk. Empty means end-of-stream.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, NetError> {
        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut data = vec![0u8; len];
        self.inp.read_exact(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn conn_reading(input: &[u8]) -> Conn {
        Conn::new(Cursor::new(input.to_vec()), Vec::new())
    }

    #[test]
    fn check_ok_skips_blank_lines() {
        let mut c = conn_reading(b"\n\nok\n");
        c.check_ok().unwrap();
    }

    #[test]
    fn check_ok_rejects_other_lines() {
        let mut c = conn_reading(b"error: boom\n");
        match c.check_ok() {
            Err(NetError::Protocol(line)) => assert_eq!(line, "error: boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn check_ok_on_eof_is_server_closed() {
        let mut c = conn_reading(b"\n");
        assert!(matches!(c.check_ok(), Err(NetError::ServerClosed)));
    }

    #[test]
    fn frame_roundtrip() {
        use std::os::unix::net::UnixStream;

        let (a, b) = UnixStream::pair().unwrap();
        let mut tx = Conn::new(a.try_clone().unwrap(), a);
        let mut rx = Conn::new(b.try_clone().unwrap(), b);

        tx.write_frame(b"hello").unwrap();
        tx.write_frame(b"").unwrap();
        tx.flush().unwrap();

        assert_eq!(rx.read_frame().unwrap(), b"hello");
        assert_eq!(rx.read_frame().unwrap(), b"");
    }

    #[test]
    fn short_frame_is_an_error() {
        let mut bytes = 10u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut c = conn_reading(&bytes);
        assert!(c.read_frame().is_err());
    }
}
