use crate::status::fail;
use alloc::string::String;
use alloc::vec::Vec;
use anyhow::Result;
use uefi_raw::{Char16, Status};

/// Encode `value` as a NUL-terminated UTF-16 string suitable for firmware calls.
/// Interior NUL characters would silently truncate the string, so they are rejected.
pub fn encode_utf16(value: &str) -> Result<Vec<Char16>> {
    if value.contains('\0') {
        return Err(fail(
            Status::INVALID_PARAMETER,
            "string contains an interior NUL character",
        ));
    }

    // Encode the string and terminate it.
    let mut encoded = value.encode_utf16().collect::<Vec<_>>();
    encoded.push(0);
    Ok(encoded)
}

/// Decode UTF-16 `units` up to the first NUL (or the end of the slice).
/// Unpaired surrogates are replaced with U+FFFD.
pub fn decode_utf16(units: &[Char16]) -> String {
    let end = units
        .iter()
        .position(|&unit| unit == 0)
        .unwrap_or(units.len());
    char::decode_utf16(units[..end].iter().copied())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decode a UTF-16 string stored little-endian in `bytes`, stopping at the first NUL.
/// A trailing odd byte is ignored.
pub fn decode_utf16_bytes(bytes: &[u8]) -> String {
    let units = bytes
        // Chunk everything into two bytes.
        .chunks_exact(2)
        // Reinterpret the bytes as u16 little-endian.
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect::<Vec<_>>();
    decode_utf16(&units)
}

/// Decode a NUL-terminated UTF-16 string at `pointer`, reading at most `limit` units.
///
/// # Safety
/// `pointer` must be null or valid for reads up to its terminator or `limit` units.
pub unsafe fn decode_utf16_ptr(pointer: *const Char16, limit: usize) -> Option<String> {
    if pointer.is_null() {
        return None;
    }

    let mut length = 0;
    // SAFETY: The caller guarantees the pointer is readable up to the terminator or limit.
    while length < limit && unsafe { *pointer.add(length) } != 0 {
        length += 1;
    }

    // SAFETY: We just read every unit in this range.
    let units = unsafe { core::slice::from_raw_parts(pointer, length) };
    Some(decode_utf16(units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_of;

    #[test]
    fn encodes_with_terminator() {
        let encoded = encode_utf16("a.txt").unwrap();
        assert_eq!(encoded, [0x61, 0x2e, 0x74, 0x78, 0x74, 0]);
    }

    #[test]
    fn rejects_interior_nul() {
        let error = encode_utf16("a\0b").unwrap_err();
        assert_eq!(status_of(&error), Some(Status::INVALID_PARAMETER));
    }

    #[test]
    fn decodes_until_terminator() {
        assert_eq!(decode_utf16(&[0x45, 0x46, 0x49, 0, 0x58]), "EFI");
        assert_eq!(decode_utf16(&[0x45, 0x46]), "EF");
        assert_eq!(decode_utf16(&[0xd800, 0x41]), "\u{fffd}A");
        assert_eq!(decode_utf16_bytes(&[0x68, 0, 0x69, 0, 0, 0, 0x7a, 0]), "hi");
    }

    #[test]
    fn decodes_pointer_with_limit() {
        let vendor = encode_utf16("EDK II").unwrap();
        assert_eq!(
            unsafe { decode_utf16_ptr(vendor.as_ptr(), 64) }.as_deref(),
            Some("EDK II")
        );
        assert_eq!(
            unsafe { decode_utf16_ptr(vendor.as_ptr(), 3) }.as_deref(),
            Some("EDK")
        );
        assert_eq!(unsafe { decode_utf16_ptr(core::ptr::null(), 3) }, None);
    }
}
