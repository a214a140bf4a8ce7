//! Raw sample files written by the capture pipe.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::error::DecodeError;

const PCM_FORMAT: u16 = 1;

/// Sample layout from the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    fn bytes_per_frame(&self) -> u64 {
        u64::from(self.channels) * u64::from(self.bits_per_sample / 8)
    }
}

/// Header of a PCM WAV file (8-bit unsigned or 16-bit signed). The
/// samples themselves are read by the DSP toolkit.
#[derive(Debug, Clone)]
pub struct WavSource {
    path: PathBuf,
    format: WavFormat,
    data_len: u64,
}

impl WavSource {
    /// Parse the RIFF header of `path`.
    ///
    /// A `data` chunk whose declared length is zero or runs past the end of
    /// the file (a capture cut short) is read up to the end of the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let io_err = |source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();

        let mut riff = [0u8; 12];
        file.read_exact(&mut riff)
            .map_err(|_| DecodeError::invalid_wav(path, "file too short for a RIFF header"))?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(DecodeError::invalid_wav(path, "not a RIFF/WAVE file"));
        }

        let mut format = None;
        loop {
            let mut header = [0u8; 8];
            if file.read_exact(&mut header).is_err() {
                return Err(DecodeError::invalid_wav(path, "missing data chunk"));
            }
            let id = [header[0], header[1], header[2], header[3]];
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let size = u64::from(size);

            match &id {
                b"fmt " => {
                    if size < 16 {
                        return Err(DecodeError::invalid_wav(path, "fmt chunk too short"));
                    }
                    let mut fmt = [0u8; 16];
                    file.read_exact(&mut fmt).map_err(io_err)?;
                    format = Some(parse_format(path, &fmt)?);
                    skip(&mut file, pad(size) - 16).map_err(io_err)?;
                }
                b"data" => {
                    let format = format
                        .ok_or_else(|| DecodeError::invalid_wav(path, "data chunk before fmt"))?;
                    let data_offset = file.stream_position().map_err(io_err)?;
                    let available = file_len.saturating_sub(data_offset);
                    let data_len = if size == 0 || size > available {
                        available
                    } else {
                        size
                    };
                    return Ok(Self {
                        path: path.to_path_buf(),
                        format,
                        data_len,
                    });
                }
                _ => skip(&mut file, pad(size)).map_err(io_err)?,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> WavFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Number of sample frames (one sample per channel).
    pub fn frame_count(&self) -> u64 {
        self.data_len / self.format.bytes_per_frame()
    }
}

fn parse_format(path: &Path, fmt: &[u8; 16]) -> Result<WavFormat, DecodeError> {
    let audio_format = u16::from_le_bytes([fmt[0], fmt[1]]);
    let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
    let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
    let bits_per_sample = u16::from_le_bytes([fmt[14], fmt[15]]);

    if audio_format != PCM_FORMAT {
        return Err(DecodeError::invalid_wav(
            path,
            format!("unsupported audio format {}", audio_format),
        ));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(DecodeError::invalid_wav(path, "zero channels or sample rate"));
    }
    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(DecodeError::invalid_wav(
            path,
            format!("unsupported sample width {} bits", bits_per_sample),
        ));
    }

    Ok(WavFormat {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

// RIFF chunks are word aligned.
fn pad(size: u64) -> u64 {
    size + (size & 1)
}

fn skip(file: &mut File, n: u64) -> std::io::Result<()> {
    if n > 0 {
        file.seek(SeekFrom::Current(n as i64))?;
    }
    Ok(())
}
