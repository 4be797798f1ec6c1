//! Audio decoder using Symphonia
//!
//! Decodes a complete in-memory clip (MP3, AAC, FLAC, Vorbis, WAV, ...)
//! into interleaved f32 samples.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{LipSyncError, Result};

use super::types::DecodedAudio;

/// Convert a symphonia codec type to a human-readable name
pub fn codec_type_to_name(codec: symphonia::core::codecs::CodecType) -> String {
    use symphonia::core::codecs::*;
    match codec {
        CODEC_TYPE_AAC => "AAC".to_string(),
        CODEC_TYPE_FLAC => "FLAC".to_string(),
        CODEC_TYPE_MP3 => "MP3".to_string(),
        CODEC_TYPE_OPUS => "Opus".to_string(),
        CODEC_TYPE_VORBIS => "Vorbis".to_string(),
        CODEC_TYPE_PCM_U8 => "PCM 8-bit".to_string(),
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM 16-bit".to_string(),
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM 24-bit".to_string(),
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM 32-bit".to_string(),
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM 32-bit Float".to_string(),
        CODEC_TYPE_PCM_F64LE | CODEC_TYPE_PCM_F64BE => "PCM 64-bit Float".to_string(),
        CODEC_TYPE_ALAC => "ALAC".to_string(),
        _ => "Audio".to_string(),
    }
}

/// Decode a whole clip into memory.
///
/// `format_hint` is a file extension ("mp3", "ogg", ...) that helps the
/// probe; the container is still sniffed from the bytes. Corrupt packets
/// are skipped. A clip that yields no samples at all is an error.
pub fn decode(bytes: Vec<u8>, format_hint: Option<&str>) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(LipSyncError::Decode("Empty audio buffer".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = format_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| LipSyncError::Decode(format!("Probe error: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LipSyncError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| LipSyncError::Decode(format!("Decoder creation error: {}", e)))?;

    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(44100);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut skipped: u64 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(LipSyncError::Decode(format!("Read error: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let capacity = decoded.capacity();

                // Decoder output wins over container headers (SBR, PS, ...)
                channels = spec.channels.count() as u16;
                sample_rate = spec.rate;

                if sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < capacity)
                {
                    sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(LipSyncError::Decode(format!("{}", e))),
        }
    }

    if skipped > 0 {
        log::debug!(
            "{}: skipped {} corrupt packet(s)",
            codec_type_to_name(codec_params.codec),
            skipped
        );
    }

    if samples.is_empty() {
        return Err(LipSyncError::Decode("No audio samples decoded".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}
