// Canonical 44-byte RIFF/WAVE container for 16-bit PCM, plus the stereo
// interleaving used for the combined recording.

use std::io;

/// All captured audio is 16 kHz, 16-bit little-endian PCM
pub const SAMPLE_RATE: u32 = 16_000;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const HEADER_LEN: usize = 44;

const BYTES_PER_SAMPLE: usize = 2;

pub fn wav_header(data_size: u32, channels: u16) -> [u8; HEADER_LEN] {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = SAMPLE_RATE * block_align as u32;

    let mut header = [0u8; HEADER_LEN];

    // RIFF header
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&SAMPLE_RATE.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Header followed by `pcm`
pub fn encode_wav(pcm: &[u8], channels: u16) -> io::Result<Vec<u8>> {
    let data_size = u32::try_from(pcm.len())
        .ok()
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "PCM payload too large for WAV"))?;

    let mut buffer = Vec::with_capacity(HEADER_LEN + pcm.len());
    buffer.extend_from_slice(&wav_header(data_size, channels));
    buffer.extend_from_slice(pcm);
    Ok(buffer)
}

/// Interleave two mono streams into one stereo stream, sample by sample.
///
/// The shorter side is padded with silence so the result lasts as long as the
/// longer input. A trailing odd byte on either side is not a whole sample and
/// is dropped.
pub fn interleave_stereo(left: &[u8], right: &[u8]) -> Vec<u8> {
    let left_samples = left.len() / BYTES_PER_SAMPLE;
    let right_samples = right.len() / BYTES_PER_SAMPLE;
    let n = left_samples.max(right_samples);

    let mut out = vec![0u8; n * 2 * BYTES_PER_SAMPLE];

    for i in 0..n {
        let src = i * BYTES_PER_SAMPLE;
        let dst = i * 2 * BYTES_PER_SAMPLE;

        if i < left_samples {
            out[dst..dst + 2].copy_from_slice(&left[src..src + 2]);
        }
        if i < right_samples {
            out[dst + 2..dst + 4].copy_from_slice(&right[src..src + 2]);
        }
    }

    out
}

/// Combined payload for the session's channels in first-seen order.
///
/// Returns the channel count and PCM, or `None` when there is nothing to mix.
/// One channel is passed through as mono; otherwise the first two become
/// left and right.
pub fn mix_channels(channels: &[Vec<u8>]) -> Option<(u16, Vec<u8>)> {
    match channels {
        [] => None,
        [only] => Some((1, only.clone())),
        [left, right, ..] => Some((2, interleave_stereo(left, right))),
    }
}
