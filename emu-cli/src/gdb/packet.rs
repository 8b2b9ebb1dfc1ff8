//! RSP packet framing: `$<data>#<checksum>` plus the `+`/`-` ack handshake.
//! Grounded in the original's `gdb_stub.c`, reimplemented against
//! `std::net::TcpStream` instead of a raw serial descriptor.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::EmuError;

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, EmuError> {
    if text.len() % 2 != 0 {
        return Err(EmuError::Protocol(format!("odd-length hex payload: {text}")));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| EmuError::Protocol(format!("bad hex byte at offset {i}: {text}")))
        })
        .collect()
}

fn read_byte(stream: &mut TcpStream) -> std::io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match stream.read(&mut byte)? {
        0 => Ok(None),
        _ => Ok(Some(byte[0])),
    }
}

/// Blocks (the stream must be in blocking mode) until a full `$...#cc`
/// packet is received, acking it, or returns `Ok(None)` on a clean close.
/// `Ctrl-C` (0x03) bytes that arrive while idle between packets are
/// swallowed here too; `c`/`s` handlers poll for them separately via
/// `BreakSignal` while a run is in progress.
pub fn read_packet(stream: &mut TcpStream) -> Result<Option<Vec<u8>>, EmuError> {
    loop {
        let mut body = Vec::new();
        loop {
            match read_byte(stream).map_err(|e| EmuError::Protocol(e.to_string()))? {
                None => return Ok(None),
                Some(b'$') => break,
                Some(_) => continue, // '+', '-', 0x03, or noise between packets
            }
        }
        loop {
            match read_byte(stream).map_err(|e| EmuError::Protocol(e.to_string()))? {
                None => return Ok(None),
                Some(b'#') => break,
                Some(b) => body.push(b),
            }
        }
        let mut cksum_hex = [0u8; 2];
        for slot in &mut cksum_hex {
            *slot = read_byte(stream)
                .map_err(|e| EmuError::Protocol(e.to_string()))?
                .ok_or_else(|| EmuError::Protocol("truncated checksum".into()))?;
        }
        let expected = u8::from_str_radix(std::str::from_utf8(&cksum_hex).unwrap_or(""), 16)
            .map_err(|_| EmuError::Protocol("non-hex checksum".into()))?;
        if checksum(&body) == expected {
            stream.write_all(b"+").map_err(|e| EmuError::Protocol(e.to_string()))?;
            return Ok(Some(body));
        }
        stream.write_all(b"-").map_err(|e| EmuError::Protocol(e.to_string()))?;
    }
}

pub fn send_packet(stream: &mut TcpStream, body: &[u8]) -> Result<(), EmuError> {
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.push(b'$');
    frame.extend_from_slice(body);
    frame.push(b'#');
    frame.extend_from_slice(format!("{:02x}", checksum(body)).as_bytes());
    stream.write_all(&frame).map_err(|e| EmuError::Protocol(e.to_string()))
}
