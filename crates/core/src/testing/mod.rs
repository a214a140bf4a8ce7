//! Testing utilities and mock implementations.
//!
//! Mocks for every collaborator seam, so observations and periodic tasks
//! can be exercised without a tuner, a DSP toolkit or a DNS provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use groundstation_core::testing::{MockDsp, MockResultStore};
//!
//! let store = Arc::new(MockResultStore::new());
//! let dsp = MockDsp::new().with_frames(vec![vec![0; 256]; 3]);
//! ```

mod mock_ddns;
mod mock_dsp;
mod mock_result_store;

pub use mock_ddns::{MockDdnsClient, MockExternalIp};
pub use mock_dsp::MockDsp;
pub use mock_result_store::MockResultStore;

use std::path::{Path, PathBuf};

/// Encode a PCM WAV file with a canonical 44-byte header.
pub fn wav_bytes(channels: u16, sample_rate: u32, bits_per_sample: u16, data: &[u8]) -> Vec<u8> {
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * u32::from(block_align);

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Write stand-ins for `rtl_sdr` and `sox` into `dir`.
///
/// The tuner prints `payload` and exits; the converter copies its stdin
/// into the WAV path it is given (the 12th argument of the capture
/// command line).
#[cfg(unix)]
pub fn fake_capture_tools(dir: &Path, payload: &[u8]) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let fixture = dir.join("tuner-output.bin");
    std::fs::write(&fixture, payload).expect("write tuner fixture");

    let rtl_sdr = dir.join("fake-rtl_sdr");
    let sox = dir.join("fake-sox");
    let scripts = [
        (&rtl_sdr, format!("#!/bin/sh\nexec cat '{}'\n", fixture.display())),
        (&sox, "#!/bin/sh\nexec cat > \"${12}\"\n".to_string()),
    ];
    for (path, body) in scripts {
        std::fs::write(path, body).expect("write fake tool");
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .expect("make fake tool executable");
    }

    (rtl_sdr, sox)
}
