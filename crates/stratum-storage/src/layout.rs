//! Little-endian field helpers for fixed-offset layouts.

use stratum_common::{Result, StratumError};

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[inline]
pub(crate) fn get_i32(buf: &[u8], offset: usize) -> i32 {
    get_u32(buf, offset) as i32
}

#[inline]
pub(crate) fn get_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Writes a 4-byte length followed by ASCII text, at most `max` bytes.
pub(crate) fn put_str(buf: &mut [u8], offset: usize, text: &str, max: usize) -> Result<()> {
    if text.len() > max || !text.is_ascii() {
        return Err(StratumError::ConfigError(format!(
            "'{}' must be ASCII and at most {} bytes",
            text, max
        )));
    }
    put_u32(buf, offset, text.len() as u32);
    buf[offset + 4..offset + 4 + text.len()].copy_from_slice(text.as_bytes());
    Ok(())
}

/// Reads a length-prefixed ASCII string of at most `max` bytes.
pub(crate) fn get_str(buf: &[u8], offset: usize, max: usize) -> Result<String> {
    let len = get_u32(buf, offset) as usize;
    if len > max {
        return Err(StratumError::CorruptHeader {
            reason: format!("string at offset {} has length {} (max {})", offset, len, max),
        });
    }
    let bytes = &buf[offset + 4..offset + 4 + len];
    String::from_utf8(bytes.to_vec()).map_err(|_| StratumError::CorruptHeader {
        reason: format!("string at offset {} is not text", offset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        let mut buf = [0u8; 16];
        put_u32(&mut buf, 0, 0xDEADBEEF);
        put_i32(&mut buf, 4, -1);
        put_u64(&mut buf, 8, u64::MAX - 1);
        assert_eq!(get_u32(&buf, 0), 0xDEADBEEF);
        assert_eq!(get_i32(&buf, 4), -1);
        assert_eq!(get_u64(&buf, 8), u64::MAX - 1);
    }

    #[test]
    fn test_strings() {
        let mut buf = [0u8; 64];
        put_str(&mut buf, 4, "orders", 20).unwrap();
        assert_eq!(get_str(&buf, 4, 20).unwrap(), "orders");
        assert!(put_str(&mut buf, 4, "much too long", 5).is_err());
        put_u32(&mut buf, 4, 50);
        assert!(get_str(&buf, 4, 20).is_err());
    }
}
