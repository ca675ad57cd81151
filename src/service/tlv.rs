//! MLE TLV helpers.
//!
//! MLE TLVs are `type (1) | length (1) | value`. The service only needs to
//! walk them: to check a received message is well formed, to find the
//! Response TLV, and to rewrite the frame counter TLVs before sending.

use std::ops::Range;

/// Iterator over `(type, value range)` of a TLV chain.
///
/// Stops at the first truncated TLV.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TlvIter<'a> {
    /// Walk the TLVs of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl Iterator for TlvIter<'_> {
    type Item = (u8, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.data.get(self.offset..self.offset + 2)?;
        let (tlv_type, len) = (header[0], usize::from(header[1]));
        let start = self.offset + 2;
        let end = start + len;
        if end > self.data.len() {
            self.offset = self.data.len();
            return None;
        }
        self.offset = end;
        Some((tlv_type, start..end))
    }
}

/// Value range of the first TLV of `tlv_type`.
pub fn find_tlv(data: &[u8], tlv_type: u8) -> Option<Range<usize>> {
    TlvIter::new(data)
        .find(|(t, _)| *t == tlv_type)
        .map(|(_, range)| range)
}

/// Check that `data` is a complete TLV chain.
pub fn is_well_formed(data: &[u8]) -> bool {
    let mut consumed = 0;
    for (_, range) in TlvIter::new(data) {
        consumed = range.end;
    }
    consumed == data.len()
}

/// Overwrite a 4-byte TLV value with `value` (big-endian).
///
/// Returns false if the TLV is absent or not 4 bytes long.
pub fn write_u32_tlv(data: &mut [u8], tlv_type: u8, value: u32) -> bool {
    match find_tlv(data, tlv_type) {
        Some(range) if range.len() == 4 => {
            data[range].copy_from_slice(&value.to_be_bytes());
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TLV_CHALLENGE, TLV_LL_FRAME_COUNTER, TLV_MLE_FRAME_COUNTER, TLV_RESPONSE};

    #[test]
    fn test_find_tlv() {
        let data = [TLV_CHALLENGE, 2, 0xaa, 0xbb, TLV_RESPONSE, 1, 0xcc];
        assert_eq!(find_tlv(&data, TLV_CHALLENGE), Some(2..4));
        assert_eq!(find_tlv(&data, TLV_RESPONSE), Some(6..7));
        assert_eq!(find_tlv(&data, TLV_MLE_FRAME_COUNTER), None);
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed(&[]));
        assert!(is_well_formed(&[1, 0, 2, 1, 9]));
        assert!(!is_well_formed(&[1, 3, 0]));
        assert!(!is_well_formed(&[1]));
    }

    #[test]
    fn test_write_u32_tlv() {
        let mut data = [TLV_LL_FRAME_COUNTER, 4, 0, 0, 0, 0, TLV_MLE_FRAME_COUNTER, 2, 0, 0];
        assert!(write_u32_tlv(&mut data, TLV_LL_FRAME_COUNTER, 0x0102_0304));
        assert_eq!(&data[2..6], &[1, 2, 3, 4]);
        assert!(!write_u32_tlv(&mut data, TLV_MLE_FRAME_COUNTER, 7));
        assert!(!write_u32_tlv(&mut data, TLV_CHALLENGE, 7));
    }
}
