//! Native messaging framing: a native-endian `u32` length followed by that
//! many bytes of UTF-8 JSON.

use std::io::{self, Read, Write};

const HEADER_SIZE: usize = 4;
/// Largest message the browser may send to a host.
pub const MAX_INCOMING: usize = 64 * 1024 * 1024;
/// Largest message a host may send to the browser.
pub const MAX_OUTGOING: usize = 1024 * 1024;

/// Reads one frame. `Ok(None)` means the browser closed the pipe between
/// messages.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated message header",
                ))
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_INCOMING {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes"),
        ));
    }

    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload)?;
    }
    Ok(Some(payload))
}

pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_OUTGOING {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("response too large: {} bytes", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_ne_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}
