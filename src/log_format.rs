//! Binary layout shared by commit (which writes records) and recovery
//! (which reads them back): `offset: u64 (native-endian) ‖ length: u64
//! (native-endian) ‖ length bytes`. No checksum, no record count — per
//! `spec.md`, checksumming log entries is an explicit Non-goal. A torn
//! trailing record (one the process crashed mid-write) is detected purely
//! by a short read and discarded, exactly as `spec.md` §4.3 describes.

use std::io::{self, Read, Write};

pub struct Record {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

pub fn write_record(w: &mut impl Write, offset: u64, bytes: &[u8]) -> io::Result<()> {
    w.write_all(&offset.to_ne_bytes())?;
    w.write_all(&(bytes.len() as u64).to_ne_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

/// Reads every syntactically complete record from `r`. A record whose
/// header or payload is cut short by EOF — the torn tail left by a crash
/// mid-commit — stops the scan and is discarded, rather than erroring.
pub fn read_records(r: &mut impl Read) -> io::Result<Vec<Record>> {
    let mut records = Vec::new();
    loop {
        let mut offset_buf = [0u8; 8];
        if !read_fully(r, &mut offset_buf)? {
            break;
        }
        let mut len_buf = [0u8; 8];
        if !read_fully(r, &mut len_buf)? {
            break;
        }
        let len = u64::from_ne_bytes(len_buf) as usize;
        let mut bytes = vec![0u8; len];
        if !read_fully(r, &mut bytes)? {
            break;
        }
        records.push(Record {
            offset: u64::from_ne_bytes(offset_buf),
            bytes,
        });
    }
    Ok(records)
}

/// Like `Read::read_exact`, but reports a short read (including zero bytes
/// at a clean EOF) as `Ok(false)` instead of an error — both a clean stop
/// and a torn trailing record are handled the same way by the caller.
fn read_fully(r: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..])? {
            0 => return Ok(false),
            n => read += n,
        }
    }
    Ok(true)
}
