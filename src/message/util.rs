use std::io::{self, prelude::*};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
/// 
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read a little-endian u64 message length out of the given stream.
/// 
pub fn read_usize<R: Read>(stream: &mut R) -> io::Result<usize> {
    Ok(u64::from_le_bytes(read_bytes_array(stream)?) as usize)
}

/// Read the given number of bytes from a stream, into a vec.
/// 
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
/// 
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Fill up the given buffer by reading bytes from a stream. A stream which
/// closes before the buffer is full is an `UnexpectedEof` error.
///
pub fn read_bytes_into<R: Read>(stream: &mut R, buffer: &mut [u8]) -> io::Result<()> {
    let mut cursor = 0;
    while cursor < buffer.len() {
        match stream.read(&mut buffer[cursor..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed mid-message")),
            Ok(n) => cursor += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write a length-prefixed frame: the byte count as a little-endian u64,
/// then the bytes.
///
pub fn write_frame<W: Write>(stream: &mut W, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(&(bytes.len() as u64).to_le_bytes())?;
    stream.write_all(bytes)?;
    stream.flush()
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{ceil_log2, read_bytes_vec, read_usize, write_frame};

    #[test]
    fn ceil_log2_rounds_up() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn frames_read_back() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"halo").unwrap();
        let mut stream = &buffer[..];
        let size = read_usize(&mut stream).unwrap();
        assert_eq!(read_bytes_vec(&mut stream, size).unwrap(), b"halo");
        assert!(read_usize(&mut stream).is_err());
    }
}
