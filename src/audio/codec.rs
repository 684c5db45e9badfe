use super::BufferError;
use crate::config::AudioConfig;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("ffmpeg not found ({0}); required for non-WAV audio")]
    FfmpegNotFound(String),
    #[error("ffmpeg error: {0}")]
    Ffmpeg(String),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decoded audio is malformed: {0}")]
    Buffer(#[from] BufferError),
}

/// Interleaved 16-bit samples as they come out of a decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Wav,
    Mp3,
}

impl OutputFormat {
    /// `.wav` targets stay WAV; anything else is MP3, gaining a `.mp3`
    /// extension if it lacks one.
    pub fn from_path(path: &Path) -> (OutputFormat, PathBuf) {
        match extension(path).as_str() {
            "wav" => (OutputFormat::Wav, path.to_path_buf()),
            "mp3" => (OutputFormat::Mp3, path.to_path_buf()),
            _ => {
                let mut name = path.as_os_str().to_owned();
                name.push(".mp3");
                (OutputFormat::Mp3, PathBuf::from(name))
            }
        }
    }
}

pub trait AudioCodec {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, CodecError>;

    fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        target: &Path,
        format: OutputFormat,
    ) -> Result<(), CodecError>;
}

/// WAV natively through hound; everything else through an ffmpeg
/// subprocess and a temporary WAV file.
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg: String,
    mp3_bitrate: u32,
    sample_rate: u32,
    channels: u16,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new(&AudioConfig::default())
    }
}

impl FfmpegCodec {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            mp3_bitrate: config.mp3_bitrate,
            sample_rate: config.sample_rate,
            channels: config.channels,
        }
    }

    fn check_ffmpeg(&self) -> Result<(), CodecError> {
        match Command::new(&self.ffmpeg).arg("-version").output() {
            Ok(_) => Ok(()),
            Err(_) => Err(CodecError::FfmpegNotFound(self.ffmpeg.clone())),
        }
    }

    fn run_ffmpeg(&self, args: &[&str]) -> Result<(), CodecError> {
        log::debug!("{} {}", self.ffmpeg, args.join(" "));
        let output = Command::new(&self.ffmpeg).args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CodecError::Ffmpeg(stderr.trim().to_string()));
        }
        Ok(())
    }

    /// Transcode `path` to a temporary 16-bit WAV and read it back.
    fn decode_via_ffmpeg(&self, path: &Path) -> Result<DecodedAudio, CodecError> {
        self.check_ffmpeg()?;
        // Removed when dropped, including on the error paths below.
        let tmp = tempfile::Builder::new()
            .prefix("splicer_in_")
            .suffix(".wav")
            .tempfile()?;

        let rate = self.sample_rate.to_string();
        let channels = self.channels.to_string();
        self.run_ffmpeg(&[
            "-i",
            &path.to_string_lossy(),
            "-f",
            "wav",
            "-acodec",
            "pcm_s16le",
            "-ar",
            &rate,
            "-ac",
            &channels,
            "-y",
            &tmp.path().to_string_lossy(),
        ])?;
        read_wav(tmp.path())
    }
}

impl AudioCodec for FfmpegCodec {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, CodecError> {
        if !path.is_file() {
            return Err(CodecError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }
        if extension(path) == "wav" {
            read_wav(path)
        } else {
            self.decode_via_ffmpeg(path)
        }
    }

    fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        target: &Path,
        format: OutputFormat,
    ) -> Result<(), CodecError> {
        match format {
            OutputFormat::Wav => write_wav(target, samples, sample_rate, channels),
            OutputFormat::Mp3 => {
                self.check_ffmpeg()?;
                let tmp = tempfile::Builder::new()
                    .prefix("splicer_out_")
                    .suffix(".wav")
                    .tempfile()?;
                write_wav(tmp.path(), samples, sample_rate, channels)?;

                let bitrate = format!("{}k", self.mp3_bitrate);
                self.run_ffmpeg(&[
                    "-i",
                    &tmp.path().to_string_lossy(),
                    "-b:a",
                    &bitrate,
                    "-f",
                    "mp3",
                    "-y",
                    &target.to_string_lossy(),
                ])
            }
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Read any PCM WAV, rescaling other bit depths to 16 bits.
pub fn read_wav(path: &Path) -> Result<DecodedAudio, CodecError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, bits @ 1..=32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| rescale_int(v, bits)))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(CodecError::UnsupportedFormat(format!(
                "{format:?} WAV with {bits} bits per sample"
            )));
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn rescale_int(v: i32, bits: u16) -> i16 {
    if bits > 16 {
        (v >> (bits - 16)) as i16
    } else {
        (v << (16 - bits)) as i16
    }
}

pub fn write_wav(
    path: &Path,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<(), CodecError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}
