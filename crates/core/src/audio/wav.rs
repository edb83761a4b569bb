//! Canonical WAV container
//!
//! The analysis backend only accepts the plain 44-byte RIFF/WAVE layout:
//!
//! | Offset | Field | Value |
//! |--------|-------|-------|
//! | 0 | ChunkID | "RIFF" |
//! | 4 | ChunkSize | 36 + data bytes |
//! | 8 | Format | "WAVE" |
//! | 12 | Subchunk1ID | "fmt " |
//! | 16 | Subchunk1Size | 16 |
//! | 20 | AudioFormat | 1 (PCM) |
//! | 22 | NumChannels | 1 |
//! | 24 | SampleRate | rate |
//! | 28 | ByteRate | rate * 2 |
//! | 32 | BlockAlign | 2 |
//! | 34 | BitsPerSample | 16 |
//! | 36 | Subchunk2ID | "data" |
//! | 40 | Subchunk2Size | samples * 2 |

/// Size of the canonical header
pub const WAV_HEADER_LEN: usize = 44;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

/// Convert a float sample to 16-bit PCM.
///
/// Samples are clamped to [-1, 1]; negative values scale by 0x8000 and
/// positive values by 0x7FFF so both extremes are representable.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode mono float samples as a 16-bit little-endian PCM WAV file.
pub fn encode_canonical_audio(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * BLOCK_ALIGN as usize) as u32;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&data_len.saturating_add(36).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&sample_rate.saturating_mul(BLOCK_ALIGN as u32).to_le_bytes());
    out.extend_from_slice(&BLOCK_ALIGN.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for &s in samples {
        out.extend_from_slice(&f32_to_pcm16(s).to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let wav = encode_canonical_audio(&[0.0; 10], 16000);
        assert_eq!(wav.len(), WAV_HEADER_LEN + 20);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 56);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 16000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 32000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 20);
    }

    #[test]
    fn test_pcm_conversion_extremes() {
        assert_eq!(f32_to_pcm16(1.0), 32767);
        assert_eq!(f32_to_pcm16(-1.0), -32768);
        assert_eq!(f32_to_pcm16(2.5), 32767);
        assert_eq!(f32_to_pcm16(-7.0), -32768);
        assert_eq!(f32_to_pcm16(0.0), 0);
        assert_eq!(f32_to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_readable_by_hound() {
        let samples: Vec<f32> = (0..1600)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect();
        let wav = encode_canonical_audio(&samples, 16000);

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), samples.len());
        assert_eq!(decoded[0], 0);
        assert_eq!(decoded[10], f32_to_pcm16(samples[10]));
    }

    #[test]
    fn test_byte_rate_saturates() {
        let wav = encode_canonical_audio(&[0.0], u32::MAX);
        assert_eq!(&wav[24..28], &u32::MAX.to_le_bytes());
        assert_eq!(&wav[28..32], &u32::MAX.to_le_bytes());
    }
}
