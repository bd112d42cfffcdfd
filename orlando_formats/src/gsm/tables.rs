/// Upper nibble of every standard (non-WAV49) frame.
pub const GSM_MAGIC: u8 = 0xD;

/// Quantized long-term predictor gains indexed by `bc`.
pub const QLB: [i16; 4] = [3277, 11469, 21299, 32767];

/// Normalized inverse mantissa used by the APCM inverse quantizer.
pub const FAC: [i16; 8] = [18431, 20479, 22527, 24575, 26623, 28671, 30719, 32767];

/// Per-coefficient `B`, `MIC` and `INVA` used to decode log-area ratios.
pub const LAR_B: [i16; 8] = [0, 0, 2048, -2560, 94, -1792, -341, -1144];
pub const LAR_MIC: [i16; 8] = [-32, -32, -16, -16, -8, -8, -4, -4];
pub const LAR_INVA: [i16; 8] = [13107, 13107, 13107, 13107, 19223, 17476, 31454, 29708];

/// Bit widths of the encoded parameters, in stream order.
pub const LAR_BITS: [u32; 8] = [6, 6, 5, 5, 4, 4, 3, 3];
pub const NC_BITS: u32 = 7;
pub const BC_BITS: u32 = 2;
pub const MC_BITS: u32 = 2;
pub const XMAXC_BITS: u32 = 6;
pub const XMC_BITS: u32 = 3;

/// Pulses per RPE subframe.
pub const RPE_PULSES: usize = 13;
pub const SUBFRAMES: usize = 4;
pub const SUBFRAME_LEN: usize = 40;
