//! PCM WAV decoder backend
//!
//! Decodes the whole file at load time into interleaved 16-bit samples at
//! [`SAMPLE_RATE`], so `generate` is a plain copy on the render thread.

use std::io::Cursor;
use std::path::Path;

use super::{
    ChipDecoder, DecoderError, ModuleInfo, SAMPLE_RATE, SampleFormat, blocks_to_ms, ms_to_blocks,
};

/// WAV file decoder (8/16/24/32-bit integer or 32-bit float, mono or stereo)
#[derive(Debug, Default)]
pub struct WavDecoder {
    /// Interleaved samples at SAMPLE_RATE
    samples: Vec<i16>,
    /// 1 or 2 once loaded
    channels: usize,
    info: ModuleInfo,
    /// Current position in blocks
    position: u64,
    /// Block at which playback stops (song length or duration limit)
    end: u64,
    /// Silence detection threshold in blocks (0 = disabled)
    silence_limit: u64,
    /// Consecutive silent blocks generated
    silent_run: u64,
    loaded: bool,
}

impl WavDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total length in blocks
    pub fn len_blocks(&self) -> u64 {
        if self.channels == 0 {
            0
        } else {
            (self.samples.len() / self.channels) as u64
        }
    }

    fn write_sample(buffer: &mut [u8], sample: i16, format: SampleFormat) {
        match format {
            SampleFormat::U8 => buffer[0] = ((sample >> 8) + 128) as u8,
            SampleFormat::S16Le => buffer[..2].copy_from_slice(&sample.to_le_bytes()),
            SampleFormat::S16Be => buffer[..2].copy_from_slice(&sample.to_be_bytes()),
        }
    }
}

/// Read every sample of a WAV stream as i16
fn read_samples(module: &[u8]) -> Result<(hound::WavSpec, Vec<i16>), DecoderError> {
    let reader =
        hound::WavReader::new(Cursor::new(module)).map_err(|e| DecoderError::Format(e.to_string()))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if bits == 0 || bits > 32 {
                return Err(DecoderError::Unsupported(format!("{bits}-bit samples")));
            }
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|s| {
                        if bits > 16 {
                            (s >> (bits - 16)) as i16
                        } else {
                            (s << (16 - bits)) as i16
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|f| (f.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<Vec<_>, _>>(),
    }
    .map_err(|e| DecoderError::Format(e.to_string()))?;

    Ok((spec, samples))
}

/// Nearest-neighbour conversion of interleaved samples to SAMPLE_RATE
fn convert_rate(samples: Vec<i16>, channels: usize, rate: u32) -> Vec<i16> {
    if rate == SAMPLE_RATE {
        return samples;
    }
    let frames = (samples.len() / channels) as u64;
    let out_frames = frames * SAMPLE_RATE as u64 / rate as u64;
    let mut out = Vec::with_capacity(out_frames as usize * channels);
    for i in 0..out_frames {
        let src = (i * rate as u64 / SAMPLE_RATE as u64).min(frames - 1) as usize;
        out.extend_from_slice(&samples[src * channels..(src + 1) * channels]);
    }
    out
}

/// Filename without directory or extension
fn title_from_filename(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl ChipDecoder for WavDecoder {
    fn load(&mut self, filename: &str, module: &[u8]) -> Result<(), DecoderError> {
        self.loaded = false;
        if module.is_empty() {
            return Err(DecoderError::Empty);
        }

        let (spec, samples) = read_samples(module)?;
        if !(1..=2).contains(&spec.channels) {
            return Err(DecoderError::UnsupportedChannels(spec.channels));
        }
        if spec.sample_rate == 0 {
            return Err(DecoderError::Format("sample rate is zero".into()));
        }
        let channels = spec.channels as usize;
        if samples.len() < channels {
            return Err(DecoderError::Format("file contains no audio".into()));
        }

        self.samples = convert_rate(samples, channels, spec.sample_rate);
        self.channels = channels;
        let len = self.len_blocks();
        self.info = ModuleInfo {
            author: String::new(),
            title: title_from_filename(filename),
            date: String::new(),
            channels: channels as u8,
            default_song: 0,
            durations: vec![Some(blocks_to_ms(len))],
        };
        self.position = 0;
        self.end = len;
        self.silent_run = 0;
        self.loaded = true;
        Ok(())
    }

    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn play_song(&mut self, song: usize, duration_ms: Option<u32>) -> Result<(), DecoderError> {
        if !self.loaded {
            return Err(DecoderError::NotLoaded);
        }
        let songs = self.info.songs();
        if song >= songs {
            return Err(DecoderError::InvalidSong { song, songs });
        }
        let len = self.len_blocks();
        self.end = duration_ms.map_or(len, |ms| ms_to_blocks(ms).min(len));
        self.position = 0;
        self.silent_run = 0;
        Ok(())
    }

    fn generate(&mut self, buffer: &mut [u8], format: SampleFormat) -> usize {
        if !self.loaded {
            return 0;
        }
        let block_bytes = self.channels * format.bytes_per_sample();
        let wanted = (buffer.len() / block_bytes) as u64;
        let blocks = wanted.min(self.end.saturating_sub(self.position)) as usize;

        let start = self.position as usize * self.channels;
        for block in 0..blocks {
            let frame = &self.samples[start + block * self.channels..][..self.channels];
            for (ch, &sample) in frame.iter().enumerate() {
                let offset = block * block_bytes + ch * format.bytes_per_sample();
                Self::write_sample(&mut buffer[offset..], sample, format);
            }

            if self.silence_limit > 0 {
                if frame.iter().all(|&s| s == 0) {
                    self.silent_run += 1;
                    if self.silent_run >= self.silence_limit {
                        self.position += block as u64 + 1;
                        self.end = self.position;
                        return (block + 1) * block_bytes;
                    }
                } else {
                    self.silent_run = 0;
                }
            }
        }

        self.position += blocks as u64;
        blocks * block_bytes
    }

    fn seek(&mut self, position_ms: u32) {
        self.position = ms_to_blocks(position_ms).min(self.end);
        self.silent_run = 0;
    }

    fn position_ms(&self) -> u32 {
        blocks_to_ms(self.position)
    }

    fn blocks_played(&self) -> u64 {
        self.position
    }

    fn detect_silence(&mut self, seconds: u32) {
        self.silence_limit = seconds as u64 * SAMPLE_RATE as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a 16-bit WAV file in memory
    fn wav_i16(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_load_empty_module_fails() {
        let mut decoder = WavDecoder::new();
        assert_eq!(decoder.load("x.wav", &[]), Err(DecoderError::Empty));
        assert_eq!(decoder.play_song(0, None), Err(DecoderError::NotLoaded));
    }

    #[test]
    fn test_load_garbage_is_format_error() {
        let mut decoder = WavDecoder::new();
        let result = decoder.load("x.wav", b"definitely not RIFF data");
        assert!(matches!(result, Err(DecoderError::Format(_))));
    }

    #[test]
    fn test_load_mono_info() {
        let data = wav_i16(1, SAMPLE_RATE, &vec![0; SAMPLE_RATE as usize * 2]);
        let mut decoder = WavDecoder::new();
        decoder.load("music/Ode To Pokey.wav", &data).unwrap();

        let info = decoder.info();
        assert_eq!(info.channels, 1);
        assert_eq!(info.songs(), 1);
        assert_eq!(info.default_song, 0);
        assert_eq!(info.duration(0), Some(2000));
        assert_eq!(info.title, "Ode To Pokey");
    }

    #[test]
    fn test_too_many_channels_rejected() {
        let data = wav_i16(4, SAMPLE_RATE, &[0; 16]);
        let mut decoder = WavDecoder::new();
        assert_eq!(
            decoder.load("quad.wav", &data),
            Err(DecoderError::UnsupportedChannels(4))
        );
    }

    #[test]
    fn test_generate_u8_stereo() {
        let data = wav_i16(2, SAMPLE_RATE, &[i16::MIN, i16::MAX, 0, 256]);
        let mut decoder = WavDecoder::new();
        decoder.load("s.wav", &data).unwrap();
        decoder.play_song(0, None).unwrap();

        let mut buffer = [0u8; 4];
        assert_eq!(decoder.generate(&mut buffer, SampleFormat::U8), 4);
        assert_eq!(buffer, [0, 255, 128, 129]);
        assert_eq!(decoder.blocks_played(), 2);
    }

    #[test]
    fn test_generate_s16_formats() {
        let data = wav_i16(1, SAMPLE_RATE, &[0x1234]);
        let mut decoder = WavDecoder::new();
        decoder.load("m.wav", &data).unwrap();
        decoder.play_song(0, None).unwrap();

        let mut le = [0u8; 2];
        assert_eq!(decoder.generate(&mut le, SampleFormat::S16Le), 2);
        assert_eq!(le, [0x34, 0x12]);

        decoder.seek(0);
        let mut be = [0u8; 2];
        assert_eq!(decoder.generate(&mut be, SampleFormat::S16Be), 2);
        assert_eq!(be, [0x12, 0x34]);
    }

    #[test]
    fn test_generate_past_end_writes_partial_block() {
        let data = wav_i16(1, SAMPLE_RATE, &[100; 10]);
        let mut decoder = WavDecoder::new();
        decoder.load("m.wav", &data).unwrap();
        decoder.play_song(0, None).unwrap();

        let mut buffer = [0u8; 16];
        assert_eq!(decoder.generate(&mut buffer, SampleFormat::U8), 10);
        assert_eq!(decoder.generate(&mut buffer, SampleFormat::U8), 0);
    }

    #[test]
    fn test_seek_moves_position() {
        let data = wav_i16(1, SAMPLE_RATE, &vec![0; SAMPLE_RATE as usize * 10]);
        let mut decoder = WavDecoder::new();
        decoder.load("m.wav", &data).unwrap();
        decoder.play_song(0, None).unwrap();

        decoder.seek(5000);
        assert_eq!(decoder.position_ms(), 5000);
        assert_eq!(decoder.blocks_played(), 5 * SAMPLE_RATE as u64);

        // Seeking past the end clamps
        decoder.seek(60_000);
        assert_eq!(decoder.position_ms(), 10_000);
    }

    #[test]
    fn test_rate_conversion_preserves_duration() {
        let data = wav_i16(1, 22_050, &vec![0; 22_050]);
        let mut decoder = WavDecoder::new();
        decoder.load("half.wav", &data).unwrap();
        assert_eq!(decoder.len_blocks(), SAMPLE_RATE as u64);
        assert_eq!(decoder.info().duration(0), Some(1000));
    }

    #[test]
    fn test_play_song_duration_limit() {
        let data = wav_i16(1, SAMPLE_RATE, &vec![0; SAMPLE_RATE as usize]);
        let mut decoder = WavDecoder::new();
        decoder.load("m.wav", &data).unwrap();
        decoder.play_song(0, Some(10)).unwrap();

        let mut buffer = vec![0u8; 1024];
        assert_eq!(decoder.generate(&mut buffer, SampleFormat::U8), 441);
        assert_eq!(
            decoder.play_song(1, None),
            Err(DecoderError::InvalidSong { song: 1, songs: 1 })
        );
    }

    #[test]
    fn test_silence_detection_stops_playback() {
        let mut samples = vec![1000i16; 100];
        samples.extend(vec![0; SAMPLE_RATE as usize * 2]);
        let data = wav_i16(1, SAMPLE_RATE, &samples);
        let mut decoder = WavDecoder::new();
        decoder.load("m.wav", &data).unwrap();
        decoder.play_song(0, None).unwrap();
        decoder.detect_silence(1);

        let mut buffer = vec![0u8; SAMPLE_RATE as usize * 3];
        let written = decoder.generate(&mut buffer, SampleFormat::U8);
        assert_eq!(written, 100 + SAMPLE_RATE as usize);
        assert_eq!(decoder.generate(&mut buffer, SampleFormat::U8), 0);
    }
}
