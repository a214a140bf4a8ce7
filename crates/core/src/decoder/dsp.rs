//! The DSP toolkit seam.
//!
//! The numerical blocks (filters, clock recovery, demodulators, framing)
//! live outside this crate. A decoder variant describes the chain it wants
//! as a [`ChainSpec`]; a [`Dsp`] implementation runs it over a
//! [`WavSource`] and yields synchronized frames.

use super::error::DecodeError;
use super::source::WavSource;

/// Frames produced by a running chain. Drained on a blocking thread.
pub type FrameStream = Box<dyn Iterator<Item = Result<Vec<u8>, DecodeError>> + Send>;

/// A DSP toolkit able to run decode chains.
pub trait Dsp: Send + Sync {
    /// Build a fresh chain instance over `source`.
    fn frames(&self, source: &WavSource, chain: &ChainSpec) -> Result<FrameStream, DecodeError>;

    /// Render LRPT frames into an encoded image. `None` when the frames
    /// contain no usable channel.
    fn render_image(&self, frames: &[Vec<u8>]) -> Result<Option<Vec<u8>>, DecodeError>;
}

/// Parameters of a decode chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainSpec {
    Lrpt(LrptChain),
    Bpsk(BpskChain),
}

impl ChainSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lrpt(_) => "lrpt",
            Self::Bpsk(_) => "bpsk",
        }
    }

    /// Chain parameters as `--key value` arguments.
    pub fn to_args(&self) -> Vec<String> {
        let pairs: Vec<(&str, String)> = match self {
            Self::Lrpt(c) => vec![
                ("sample-rate", c.sample_rate.to_string()),
                ("lowpass-cutoff", c.lowpass_cutoff_hz.to_string()),
                ("lowpass-transition", c.lowpass_transition_hz.to_string()),
                ("agc-rate", c.agc_rate.to_string()),
                ("agc-reference", c.agc_reference.to_string()),
                ("agc-gain", c.agc_gain.to_string()),
                ("agc-max-gain", c.agc_max_gain.to_string()),
                ("rrc-alpha", c.rrc_alpha.to_string()),
                ("rrc-taps", c.rrc_taps.to_string()),
                ("costas-bandwidth", c.costas_bandwidth.to_string()),
                ("costas-order", c.costas_order.to_string()),
                ("symbol-rate", c.symbol_rate.to_string()),
                ("clock-omega", c.clock_omega.to_string()),
                ("clock-gain-omega", c.clock_gain_omega.to_string()),
                ("clock-mu", c.clock_mu.to_string()),
                ("clock-gain-mu", c.clock_alpha.to_string()),
                ("clock-omega-relative-limit", c.clock_omega_relative_limit.to_string()),
                ("sync-word", format!("{:016x}", c.sync_word)),
                ("sync-threshold", c.sync_threshold.to_string()),
                ("frame-bits", c.frame_bits.to_string()),
            ],
            Self::Bpsk(c) => vec![
                ("sample-rate", c.sample_rate.to_string()),
                ("baud-rate", c.baud_rate.to_string()),
                ("decimation", c.decimation.to_string()),
                ("center-frequency", c.center_frequency_hz.to_string()),
                ("transition-width", c.transition_width_hz.to_string()),
                ("differential", c.differential.to_string()),
            ],
        };
        pairs
            .into_iter()
            .flat_map(|(k, v)| [format!("--{}", k), v])
            .collect()
    }
}

/// METEOR-M LRPT: QPSK with correlation-tag framing.
#[derive(Debug, Clone, PartialEq)]
pub struct LrptChain {
    pub sample_rate: u32,
    pub lowpass_cutoff_hz: f64,
    pub lowpass_transition_hz: f64,
    pub agc_rate: f64,
    pub agc_reference: f64,
    pub agc_gain: f64,
    pub agc_max_gain: f64,
    pub rrc_alpha: f64,
    pub rrc_taps: u32,
    pub costas_bandwidth: f64,
    pub costas_order: u32,
    pub symbol_rate: u32,
    pub clock_alpha: f64,
    pub clock_omega: f64,
    pub clock_gain_omega: f64,
    pub clock_mu: f64,
    pub clock_omega_relative_limit: f64,
    pub sync_word: u64,
    pub sync_threshold: u32,
    /// Soft bits per frame, including the sync marker.
    pub frame_bits: u32,
}

impl LrptChain {
    pub const SYMBOL_RATE: u32 = 72_000;
    pub const SYNC_WORD: u64 = 0x035d_49c2_4ff2_686b;

    pub fn new(sample_rate: u32) -> Self {
        Self::with_symbol_rate(sample_rate, Self::SYMBOL_RATE)
    }

    pub fn with_symbol_rate(sample_rate: u32, symbol_rate: u32) -> Self {
        let clock_alpha = 0.010;
        Self {
            sample_rate,
            lowpass_cutoff_hz: 50_000.0,
            lowpass_transition_hz: 1_000.0,
            agc_rate: 1000e-4,
            agc_reference: 0.5,
            agc_gain: 1.0,
            agc_max_gain: 4000.0,
            rrc_alpha: 0.6,
            rrc_taps: 361,
            costas_bandwidth: 0.020,
            costas_order: 4,
            symbol_rate,
            clock_alpha,
            clock_omega: f64::from(sample_rate) / f64::from(symbol_rate),
            clock_gain_omega: clock_alpha * clock_alpha / 4.0,
            clock_mu: 0.5,
            clock_omega_relative_limit: 0.005,
            sync_word: Self::SYNC_WORD,
            sync_threshold: 12,
            frame_bits: 8160 * 2 + 8 * 2,
        }
    }
}

/// Differential BPSK beacon demodulator.
#[derive(Debug, Clone, PartialEq)]
pub struct BpskChain {
    pub sample_rate: u32,
    pub baud_rate: u32,
    pub decimation: u32,
    pub center_frequency_hz: f64,
    pub transition_width_hz: f64,
    pub differential: bool,
}

impl BpskChain {
    /// JY1SAT downlink: 1200 baud, decimate by 5, centred, 2 kHz transition.
    pub fn jy1sat(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            baud_rate: 1200,
            decimation: 5,
            center_frequency_hz: 0.0,
            transition_width_hz: 2000.0,
            differential: true,
        }
    }
}
