// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::io::Write;

/// Write a LEB128-style variable length integer, 7 bits per byte with the high bit as a continuation flag.
pub fn write<W: Write>(w: &mut W, mut v: u64) -> std::io::Result<()> {
    loop {
        if v < 0x80 {
            w.write_all(&[v as u8])?;
            return Ok(());
        } else {
            w.write_all(&[(v as u8) | 0x80])?;
            v >>= 7;
        }
    }
}

/// Read a variable length integer, returning the value and the number of bytes consumed.
pub fn read(b: &[u8]) -> std::io::Result<(u64, usize)> {
    let mut v = 0u64;
    let mut shift = 0u32;
    for (i, byte) in b.iter().enumerate() {
        v |= ((byte & 0x7f) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok((v, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            break;
        }
    }
    Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated varint"))
}
