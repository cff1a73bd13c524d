use std::io::{self, BufRead};

/// Reassembles logical lines from a buffered byte source, handling
/// arbitrarily long lines that exceed the source's own internal buffer —
/// `BufRead::read_until` already loops internally to fill its buffer, so
/// this just needs to keep asking for more until it sees the delimiter.
///
/// Returns the line without its trailing `\n` (and without a trailing `\r`,
/// since PTY output is typically CRLF-terminated), plus whether the source
/// was at EOF before any bytes were read. On EOF with no trailing newline,
/// whatever was read is still returned as the final line.
pub fn read_line<R: BufRead + ?Sized>(stream: &mut R) -> io::Result<(String, bool)> {
    let mut buf = Vec::new();
    let n = stream.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok((String::new(), true));
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok((String::from_utf8_lossy(&buf).into_owned(), false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_simple_lines() {
        let mut cursor = Cursor::new(b"first\nsecond\n".to_vec());
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line, "first");
        assert!(!eof);
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line, "second");
        assert!(!eof);
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line, "");
        assert!(eof);
    }

    #[test]
    fn strips_carriage_return() {
        let mut cursor = Cursor::new(b"hello\r\n".to_vec());
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line, "hello");
        assert!(!eof);
    }

    #[test]
    fn reassembles_long_line_past_internal_buffer() {
        let long = "x".repeat(64 * 1024);
        let mut data = long.clone().into_bytes();
        data.push(b'\n');
        let mut cursor = Cursor::new(data);
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line.len(), long.len());
        assert!(!eof);
    }

    #[test]
    fn no_trailing_newline_is_still_returned() {
        let mut cursor = Cursor::new(b"dangling".to_vec());
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line, "dangling");
        assert!(!eof);
        let (line, eof) = read_line(&mut cursor).unwrap();
        assert_eq!(line, "");
        assert!(eof);
    }
}
