//! Block-averaging sample-rate conversion
//!
//! Capture devices run at 44.1/48 kHz while the analysis backend wants a
//! fixed 16 kHz. Each output sample averages the input samples whose index
//! falls in its ratio-scaled span, which doubles as a cheap low-pass.

/// Convert `samples` from `from_rate` to `to_rate`.
///
/// - Empty input yields empty output.
/// - Matching rates, or an unknown (0) input rate, return the input as is.
/// - Output length is `max(1, round(len / ratio))`.
/// - A span that contains no input sample (upsampling) yields 0.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == 0 || from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64 / ratio).round() as usize).max(1);
    let mut out = Vec::with_capacity(out_len);

    let mut span_start = 0usize;
    for i in 0..out_len {
        let span_end = (((i + 1) as f64) * ratio).round() as usize;
        let upper = span_end.min(samples.len());

        let value = if span_start < upper {
            let span = &samples[span_start..upper];
            span.iter().sum::<f32>() / span.len() as f32
        } else {
            0.0
        };
        out.push(value);
        span_start = span_end;
    }
    out
}
