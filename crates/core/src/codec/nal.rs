//! H.264 NAL-unit framing and RBSP escaping.
//!
//! Encoded video reaches the meeting client in one of two container
//! conventions:
//!
//! ```text
//! Annex B:         [00 00 00 01][NAL][00 00 01][NAL]...
//! Length-prefixed: [len:u32 BE][NAL][len:u32 BE][NAL]...
//! ```
//!
//! Every parser here returns `None` on malformed input. Callers must treat
//! `None` as "leave the frame alone".

/// H.264 NAL unit type constants.
pub mod nal_type {
    /// Non-IDR coded slice (P/B frame)
    pub const NON_IDR_SLICE: u8 = 1;
    /// IDR coded slice (keyframe)
    pub const IDR_SLICE: u8 = 5;
    /// Supplemental Enhancement Information
    pub const SEI: u8 = 6;
    /// Sequence Parameter Set
    pub const SPS: u8 = 7;
    /// Picture Parameter Set
    pub const PPS: u8 = 8;
}

/// 4-byte Annex B start code used when writing units.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Container convention of an encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Start-code delimited units
    AnnexB,
    /// 4-byte big-endian length prefixed units (AVCC)
    LengthPrefixed,
    /// Neither convention produced a plausible first unit
    Unknown,
}

/// Location of one NAL unit inside a frame buffer.
///
/// `start_offset` points at the framing (start code or length prefix),
/// `payload_start..payload_end` covers the unit itself, header byte included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    pub start_offset: usize,
    pub payload_start: usize,
    pub payload_end: usize,
}

impl NalUnit {
    /// The unit's bytes (header byte included, framing excluded).
    #[inline]
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.payload_start..self.payload_end]
    }

    /// 5-bit unit type taken from the header byte.
    #[inline]
    pub fn unit_type(&self, buf: &[u8]) -> u8 {
        nal_type(buf[self.payload_start])
    }

    /// Whether this unit carries coded slice data (types 1-5).
    #[inline]
    pub fn is_slice(&self, buf: &[u8]) -> bool {
        matches!(self.unit_type(buf), 1..=5)
    }
}

/// Extract the 5-bit NAL unit type from a header byte.
#[inline]
pub fn nal_type(header: u8) -> u8 {
    header & 0x1f
}

#[inline]
fn plausible_first_unit(buf: &[u8], units: &[NalUnit]) -> bool {
    units
        .first()
        .map(|u| matches!(u.unit_type(buf), 1..=23))
        .unwrap_or(false)
}

/// Detect which container convention a frame uses.
///
/// Annex B is tried first; a frame is only accepted under a convention when
/// its first unit has a type in 1..=23.
pub fn detect_container_format(buf: &[u8]) -> ContainerFormat {
    if let Some(units) = find_annexb_units(buf) {
        if plausible_first_unit(buf, &units) {
            return ContainerFormat::AnnexB;
        }
    }
    if let Some(units) = find_length_prefixed_units(buf) {
        if plausible_first_unit(buf, &units) {
            return ContainerFormat::LengthPrefixed;
        }
    }
    ContainerFormat::Unknown
}

/// Find every start code in `buf`, returning `(position, length)` pairs.
fn start_codes(buf: &[u8]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut i = 0;
    while i + 3 < buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            found.push((i, 3));
            i += 3;
            continue;
        }
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 0 && buf[i + 3] == 1 {
            found.push((i, 4));
            i += 4;
            continue;
        }
        i += 1;
    }
    found
}

/// Split an Annex B frame into units.
///
/// Each start code opens a unit that ends at the next start code or at the
/// end of the buffer. Zero-length spans are skipped.
pub fn find_annexb_units(buf: &[u8]) -> Option<Vec<NalUnit>> {
    let starts = start_codes(buf);
    if starts.is_empty() {
        return None;
    }

    let mut units = Vec::with_capacity(starts.len());
    for (idx, &(pos, len)) in starts.iter().enumerate() {
        let payload_start = pos + len;
        let payload_end = starts.get(idx + 1).map(|&(next, _)| next).unwrap_or(buf.len());
        if payload_start >= payload_end {
            continue;
        }
        units.push(NalUnit {
            start_offset: pos,
            payload_start,
            payload_end,
        });
    }

    if units.is_empty() {
        None
    } else {
        Some(units)
    }
}

/// Split a length-prefixed frame into units.
///
/// Framing is strict: a zero length, a length running past the buffer, or
/// trailing bytes that do not form a full record all fail the parse.
pub fn find_length_prefixed_units(buf: &[u8]) -> Option<Vec<NalUnit>> {
    let mut units = Vec::new();
    let mut cursor = 0usize;

    while cursor + 4 <= buf.len() {
        let len = u32::from_be_bytes([buf[cursor], buf[cursor + 1], buf[cursor + 2], buf[cursor + 3]])
            as usize;
        let payload_start = cursor + 4;
        if len == 0 || len > buf.len() - payload_start {
            return None;
        }
        units.push(NalUnit {
            start_offset: cursor,
            payload_start,
            payload_end: payload_start + len,
        });
        cursor = payload_start + len;
    }

    if units.is_empty() || cursor != buf.len() {
        return None;
    }
    Some(units)
}

/// Split a frame into units using the given convention.
pub fn find_units(buf: &[u8], format: ContainerFormat) -> Option<Vec<NalUnit>> {
    match format {
        ContainerFormat::AnnexB => find_annexb_units(buf),
        ContainerFormat::LengthPrefixed => find_length_prefixed_units(buf),
        ContainerFormat::Unknown => None,
    }
}

/// Insert emulation-prevention bytes into an RBSP.
///
/// After two consecutive zero bytes, any byte <= 0x03 is preceded by 0x03.
pub fn escape_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64 + 4);
    let mut zeros = 0usize;
    for &b in rbsp {
        if zeros >= 2 && b <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
    out
}

/// Remove emulation-prevention bytes from an escaped payload.
pub fn unescape_emulation_prevention(escaped: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut zeros = 0usize;
    for &b in escaped {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        out.push(b);
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
    out
}

/// Append an SEI payloadType / payloadSize value: one 0xFF per 255, then
/// the remainder.
pub fn write_sei_varint(mut value: usize, out: &mut Vec<u8>) {
    while value >= 255 {
        out.push(0xFF);
        value -= 255;
    }
    out.push(value as u8);
}

/// Read an SEI payloadType / payloadSize value at `*cursor`.
///
/// Returns `None` when the buffer ends before the terminating byte.
pub fn read_sei_varint(buf: &[u8], cursor: &mut usize) -> Option<usize> {
    let mut value = 0usize;
    while *buf.get(*cursor)? == 0xFF {
        value += 255;
        *cursor += 1;
    }
    value += *buf.get(*cursor)? as usize;
    *cursor += 1;
    Some(value)
}
