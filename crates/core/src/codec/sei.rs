//! Private SEI extension carrying effect parameters.
//!
//! The unit is a `user_data_unregistered` SEI message (payloadType 5):
//!
//! ```text
//! [0x06][payloadType=5][payloadSize][uuid: 16 bytes][JSON record][0x80]
//!        \______________________ RBSP, emulation-prevention escaped ___/
//! ```
//!
//! Decoders that do not recognise the UUID skip the message, so frames stay
//! valid for every receiver.

use super::nal::{
    detect_container_format, escape_emulation_prevention, find_units, nal_type,
    read_sei_varint, unescape_emulation_prevention, write_sei_varint, ContainerFormat, NalUnit,
    START_CODE,
};
use crate::fx::{clamp_strength, BeautyType, EffectParameters, FilterName};
use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// Published UUID of the effect-parameter extension
pub const FX_SEI_UUID: Uuid = uuid!("b0f7b0a1-6a3d-4c53-9b2e-6a7d3e9f1c20");

/// SEI payload type for user data unregistered
pub const USER_DATA_UNREGISTERED: usize = 5;

/// NAL header byte of an SEI unit (nal_ref_idc 0, type 6)
pub const SEI_NAL_HEADER: u8 = 0x06;

/// RBSP trailing stop bit
const RBSP_STOP: u8 = 0x80;

/// Record schema tag
const RECORD_VERSION: u8 = 1;

static FX_SEI_IDENTIFIER: [u8; 16] = *FX_SEI_UUID.as_bytes();

/// 16-byte identifier of the extension
#[inline]
pub fn fx_sei_identifier() -> &'static [u8; 16] {
    &FX_SEI_IDENTIFIER
}

#[derive(Serialize)]
struct WireRecord<'a> {
    v: u8,
    eb: bool,
    ef: bool,
    bt: &'a str,
    b: u8,
    s: u8,
    f: &'a str,
    t: i64,
}

/// Decoded record; every field is optional so older or partial senders
/// still produce usable parameters.
#[derive(Deserialize)]
struct IncomingRecord {
    eb: Option<bool>,
    ef: Option<bool>,
    bt: Option<String>,
    b: Option<f64>,
    s: Option<f64>,
    f: Option<String>,
    t: Option<f64>,
}

impl IncomingRecord {
    fn into_params(self) -> EffectParameters {
        let beauty_strength = clamp_strength(self.b.unwrap_or(0.0));
        let slim_strength = clamp_strength(self.s.unwrap_or(0.0));
        let filter_name = self
            .f
            .as_deref()
            .and_then(|f| f.parse::<FilterName>().ok())
            .unwrap_or_default();
        let beauty_type = self
            .bt
            .as_deref()
            .and_then(|bt| bt.parse::<BeautyType>().ok())
            .unwrap_or_default();

        EffectParameters {
            beauty_enabled: self.eb.unwrap_or(beauty_strength > 0),
            filter_enabled: self.ef.unwrap_or(filter_name != FilterName::None),
            beauty_type,
            beauty_strength,
            slim_strength,
            filter_name,
            version: 0,
            updated_at_ms: self.t.filter(|t| t.is_finite()).map(|t| t as i64).unwrap_or(0),
        }
    }
}

/// One SEI message body: identifier plus serialized record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiRecord {
    payload: Vec<u8>,
}

impl SeiRecord {
    /// Serialize effect parameters into a record.
    pub fn from_params(params: &EffectParameters) -> Self {
        let record = WireRecord {
            v: RECORD_VERSION,
            eb: params.beauty_enabled,
            ef: params.filter_enabled,
            bt: params.beauty_type.as_str(),
            b: params.beauty_strength.min(100),
            s: params.slim_strength.min(100),
            f: params.filter_name.as_str(),
            t: params.updated_at_ms,
        };
        // A struct of plain scalars and static strings always serializes
        let payload = serde_json::to_vec(&record).unwrap_or_default();
        Self { payload }
    }

    pub fn identifier(&self) -> &'static [u8; 16] {
        fx_sei_identifier()
    }

    /// UTF-8 JSON bytes of the record
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Unescaped SEI RBSP: header varints, identifier, record, stop bit.
    pub fn to_rbsp(&self) -> Vec<u8> {
        let body_len = 16 + self.payload.len();
        let mut rbsp = Vec::with_capacity(body_len + 8);
        write_sei_varint(USER_DATA_UNREGISTERED, &mut rbsp);
        write_sei_varint(body_len, &mut rbsp);
        rbsp.extend_from_slice(self.identifier());
        rbsp.extend_from_slice(&self.payload);
        rbsp.push(RBSP_STOP);
        rbsp
    }
}

/// Build a complete SEI NAL unit (header byte included, no framing).
pub fn build_sei_unit(params: &EffectParameters) -> Vec<u8> {
    let escaped = escape_emulation_prevention(&SeiRecord::from_params(params).to_rbsp());
    let mut nal = Vec::with_capacity(1 + escaped.len());
    nal.push(SEI_NAL_HEADER);
    nal.extend_from_slice(&escaped);
    nal
}

/// Find the effect record bytes inside an SEI unit.
///
/// Walks every SEI message until the RBSP stop byte; returns the bytes after
/// the identifier of the first matching user-data message.
pub fn find_fx_user_data(nal: &[u8]) -> Option<Vec<u8>> {
    if nal.len() < 2 || nal_type(nal[0]) != nal_type::SEI {
        return None;
    }
    let rbsp = unescape_emulation_prevention(&nal[1..]);
    let id = fx_sei_identifier();

    let mut cursor = 0usize;
    while cursor < rbsp.len() {
        if rbsp[cursor] == RBSP_STOP {
            return None;
        }
        let payload_type = read_sei_varint(&rbsp, &mut cursor)?;
        let payload_size = read_sei_varint(&rbsp, &mut cursor)?;
        if payload_size > rbsp.len() - cursor {
            return None;
        }

        let body = &rbsp[cursor..cursor + payload_size];
        if payload_type == USER_DATA_UNREGISTERED && payload_size >= 16 && &body[..16] == id {
            return Some(body[16..].to_vec());
        }
        cursor += payload_size;
    }
    None
}

/// Parse an SEI unit into effect parameters.
///
/// Returns `None` for any other unit type, a foreign identifier, truncated
/// framing, or a record that is not valid JSON.
pub fn parse_sei_unit(nal: &[u8]) -> Option<EffectParameters> {
    decode_record(&find_fx_user_data(nal)?)
}

fn decode_record(user_data: &[u8]) -> Option<EffectParameters> {
    let text = std::str::from_utf8(user_data).ok()?;
    let record: IncomingRecord = serde_json::from_str(text).ok()?;
    Some(record.into_params())
}

/// Splice an SEI unit into an encoded frame.
///
/// The unit lands right before the first slice unit (types 1-5), or at the
/// end when the frame has none, framed the same way as the frame's own
/// units. Returns `None` when the container cannot be detected.
pub fn inject_into_frame(frame: &[u8], sei: &[u8]) -> Option<Vec<u8>> {
    let format = detect_container_format(frame);
    let units = find_units(frame, format)?;
    let insert_at = units
        .iter()
        .find(|u| u.is_slice(frame))
        .map(|u| u.start_offset)
        .unwrap_or(frame.len());

    let framing: [u8; 4] = match format {
        ContainerFormat::AnnexB => START_CODE,
        ContainerFormat::LengthPrefixed => u32::try_from(sei.len()).ok()?.to_be_bytes(),
        ContainerFormat::Unknown => return None,
    };

    let mut out = Vec::with_capacity(frame.len() + framing.len() + sei.len());
    out.extend_from_slice(&frame[..insert_at]);
    out.extend_from_slice(&framing);
    out.extend_from_slice(sei);
    out.extend_from_slice(&frame[insert_at..]);
    Some(out)
}

/// Recover effect parameters from the first SEI unit carrying the effect
/// identifier. A tagged record that fails to decode ends the search.
pub fn extract_from_frame(frame: &[u8]) -> Option<EffectParameters> {
    let units = find_units(frame, detect_container_format(frame))?;
    let user_data = units
        .iter()
        .filter(|u| u.unit_type(frame) == nal_type::SEI)
        .find_map(|u: &NalUnit| find_fx_user_data(u.payload(frame)))?;
    decode_record(&user_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::nal::find_annexb_units;

    fn sample_params() -> EffectParameters {
        EffectParameters {
            beauty_enabled: true,
            filter_enabled: true,
            beauty_type: BeautyType::Natural,
            beauty_strength: 40,
            slim_strength: 0,
            filter_name: FilterName::Warm,
            version: 3,
            updated_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_identifier_bytes() {
        let id = fx_sei_identifier();
        assert_eq!(id[0], 0xb0);
        assert_eq!(id[1], 0xf7);
        assert_eq!(id[15], 0x20);
    }

    #[test]
    fn test_build_layout() {
        let nal = build_sei_unit(&sample_params());
        assert_eq!(nal[0], SEI_NAL_HEADER);
        assert_eq!(nal[1], USER_DATA_UNREGISTERED as u8);
        assert_eq!(*nal.last().unwrap(), RBSP_STOP);

        let rbsp = unescape_emulation_prevention(&nal[1..]);
        let mut cursor = 1;
        let size = read_sei_varint(&rbsp, &mut cursor).unwrap();
        assert_eq!(&rbsp[cursor..cursor + 16], fx_sei_identifier());
        // size covers identifier and record, then the stop bit
        assert_eq!(cursor + size + 1, rbsp.len());
    }

    #[test]
    fn test_round_trip_recovers_encoded_fields() {
        let params = sample_params();
        let decoded = parse_sei_unit(&build_sei_unit(&params)).unwrap();
        assert!(decoded.same_effect(&params));
        assert_eq!(decoded.updated_at_ms, params.updated_at_ms);
    }

    #[test]
    fn test_round_trip_disabled_strengths() {
        let params = EffectParameters {
            beauty_enabled: false,
            beauty_strength: 75,
            slim_strength: 100,
            beauty_type: BeautyType::Bright,
            filter_enabled: false,
            filter_name: FilterName::Cyber,
            ..Default::default()
        };
        let decoded = parse_sei_unit(&build_sei_unit(&params)).unwrap();
        assert!(decoded.same_effect(&params));
    }

    #[test]
    fn test_large_record_uses_multi_byte_size() {
        // Records past 255 bytes need a 0xFF run in payloadSize
        let mut rbsp = Vec::new();
        let json = format!(
            "{{\"eb\":true,\"b\":10,\"pad\":\"{}\"}}",
            "x".repeat(400)
        );
        write_sei_varint(USER_DATA_UNREGISTERED, &mut rbsp);
        write_sei_varint(16 + json.len(), &mut rbsp);
        rbsp.extend_from_slice(fx_sei_identifier());
        rbsp.extend_from_slice(json.as_bytes());
        rbsp.push(RBSP_STOP);
        let mut nal = vec![SEI_NAL_HEADER];
        nal.extend(escape_emulation_prevention(&rbsp));

        let decoded = parse_sei_unit(&nal).unwrap();
        assert!(decoded.beauty_enabled);
        assert_eq!(decoded.beauty_strength, 10);
    }

    #[test]
    fn test_parse_rejects_foreign_units() {
        // Not an SEI unit
        assert!(parse_sei_unit(&[0x65, 0x88, 0x84]).is_none());
        // Too short
        assert!(parse_sei_unit(&[0x06]).is_none());

        // Foreign identifier
        let mut rbsp = Vec::new();
        write_sei_varint(USER_DATA_UNREGISTERED, &mut rbsp);
        write_sei_varint(18, &mut rbsp);
        rbsp.extend_from_slice(&[0xAA; 16]);
        rbsp.extend_from_slice(b"{}");
        rbsp.push(RBSP_STOP);
        let mut nal = vec![SEI_NAL_HEADER];
        nal.extend(escape_emulation_prevention(&rbsp));
        assert!(parse_sei_unit(&nal).is_none());
    }

    #[test]
    fn test_parse_rejects_truncated_payload() {
        let mut nal = build_sei_unit(&sample_params());
        nal.truncate(nal.len() / 2);
        assert!(parse_sei_unit(&nal).is_none());
    }

    #[test]
    fn test_parse_skips_preceding_messages() {
        // A recovery-point message (type 6, 1 byte) before ours
        let mut rbsp = vec![0x06, 0x01, 0x84];
        let record = SeiRecord::from_params(&sample_params()).to_rbsp();
        rbsp.extend_from_slice(&record);
        let mut nal = vec![SEI_NAL_HEADER];
        nal.extend(escape_emulation_prevention(&rbsp));

        let decoded = parse_sei_unit(&nal).unwrap();
        assert_eq!(decoded.filter_name, FilterName::Warm);
    }

    #[test]
    fn test_parse_tolerates_partial_record() {
        let mut rbsp = Vec::new();
        let json = br#"{"b":250,"f":"sparkle","bt":"unknown"}"#;
        write_sei_varint(USER_DATA_UNREGISTERED, &mut rbsp);
        write_sei_varint(16 + json.len(), &mut rbsp);
        rbsp.extend_from_slice(fx_sei_identifier());
        rbsp.extend_from_slice(json);
        rbsp.push(RBSP_STOP);
        let mut nal = vec![SEI_NAL_HEADER];
        nal.extend(escape_emulation_prevention(&rbsp));

        let decoded = parse_sei_unit(&nal).unwrap();
        assert_eq!(decoded.beauty_strength, 100);
        assert!(decoded.beauty_enabled);
        assert_eq!(decoded.filter_name, FilterName::None);
        assert!(!decoded.filter_enabled);
        assert_eq!(decoded.beauty_type, BeautyType::Natural);
    }

    /// SEI unit with the effect identifier but an undecodable record
    fn garbled_fx_unit() -> Vec<u8> {
        let mut rbsp = Vec::new();
        let json = b"{not json";
        write_sei_varint(USER_DATA_UNREGISTERED, &mut rbsp);
        write_sei_varint(16 + json.len(), &mut rbsp);
        rbsp.extend_from_slice(fx_sei_identifier());
        rbsp.extend_from_slice(json);
        rbsp.push(RBSP_STOP);
        let mut nal = vec![SEI_NAL_HEADER];
        nal.extend(escape_emulation_prevention(&rbsp));
        nal
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(parse_sei_unit(&garbled_fx_unit()).is_none());
    }

    #[test]
    fn test_extract_stops_at_first_tagged_unit() {
        let mut frame = START_CODE.to_vec();
        frame.extend(garbled_fx_unit());
        frame.extend_from_slice(&START_CODE);
        frame.extend(build_sei_unit(&sample_params()));
        frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00]);

        assert!(extract_from_frame(&frame).is_none());
    }

    #[test]
    fn test_inject_before_first_slice_annexb() {
        let frame = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f, // SPS
            0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x3c, 0x80, // PPS
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
        ];
        let sei = build_sei_unit(&sample_params());
        let out = inject_into_frame(&frame, &sei).unwrap();

        let types: Vec<u8> = find_annexb_units(&out)
            .unwrap()
            .iter()
            .map(|u| u.unit_type(&out))
            .collect();
        assert_eq!(types, vec![7, 8, 6, 5]);
        assert_eq!(&out[..16], &frame[..16]);
        assert_eq!(&out[out.len() - 8..], &frame[16..]);
    }

    #[test]
    fn test_inject_appends_without_slice() {
        let frame = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f];
        let sei = build_sei_unit(&sample_params());
        let out = inject_into_frame(&frame, &sei).unwrap();
        assert_eq!(&out[..frame.len()], &frame);
        assert_eq!(&out[frame.len()..frame.len() + 4], &START_CODE);
        assert_eq!(&out[frame.len() + 4..], sei.as_slice());
    }

    #[test]
    fn test_inject_length_prefixed() {
        let frame = [0x00, 0x00, 0x00, 0x03, 0x41, 0x9a, 0x02];
        let sei = build_sei_unit(&sample_params());
        let out = inject_into_frame(&frame, &sei).unwrap();

        let len = u32::from_be_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(len, sei.len());
        assert_eq!(&out[4..4 + len], sei.as_slice());
        assert_eq!(&out[4 + len..], &frame);

        let decoded = extract_from_frame(&out).unwrap();
        assert!(decoded.same_effect(&sample_params()));
    }

    #[test]
    fn test_inject_unknown_container() {
        let sei = build_sei_unit(&sample_params());
        assert!(inject_into_frame(&[0xDE, 0xAD, 0xBE, 0xEF], &sei).is_none());
        assert!(inject_into_frame(&[], &sei).is_none());
    }

    #[test]
    fn test_extract_without_sei() {
        let frame = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00];
        assert!(extract_from_frame(&frame).is_none());
    }
}
