//! Bit-level unpacking of GSM 06.10 parameter frames.
//!
//! Standard frames are 33 bytes, MSB-first, led by the `0xD` magic nibble.
//! WAV49 (Microsoft GSM) packs two frames into 65 bytes, LSB-first, with no
//! magic; the first frame's trailing nibble is the start of the second.

use super::tables::{
    BC_BITS, LAR_BITS, MC_BITS, NC_BITS, RPE_PULSES, SUBFRAMES, XMAXC_BITS, XMC_BITS,
};

pub const STANDARD_FRAME_LEN: usize = 33;
pub const WAV49_FIRST_LEN: usize = 33;
pub const WAV49_SECOND_LEN: usize = 32;
pub const WAV49_PAIR_LEN: usize = WAV49_FIRST_LEN + WAV49_SECOND_LEN;

/// Decoded parameters of a single 20 ms frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameParams {
    pub larc: [i16; 8],
    pub nc: [i16; SUBFRAMES],
    pub bc: [i16; SUBFRAMES],
    pub mc: [i16; SUBFRAMES],
    pub xmaxc: [i16; SUBFRAMES],
    pub xmc: [i16; SUBFRAMES * RPE_PULSES],
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            larc: [0; 8],
            nc: [0; SUBFRAMES],
            bc: [0; SUBFRAMES],
            mc: [0; SUBFRAMES],
            xmaxc: [0; SUBFRAMES],
            xmc: [0; SUBFRAMES * RPE_PULSES],
        }
    }
}

trait BitSource {
    fn bits(&mut self, count: u32) -> i16;
}

struct MsbBits<'a> {
    data: &'a [u8],
    bit: usize,
}

impl BitSource for MsbBits<'_> {
    fn bits(&mut self, count: u32) -> i16 {
        let mut value = 0i16;
        for _ in 0..count {
            let byte = self.data.get(self.bit / 8).copied().unwrap_or(0);
            let bit = (byte >> (7 - self.bit % 8)) & 1;
            value = (value << 1) | i16::from(bit);
            self.bit += 1;
        }
        value
    }
}

struct LsbBits<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    available: u32,
}

impl BitSource for LsbBits<'_> {
    fn bits(&mut self, count: u32) -> i16 {
        while self.available < count {
            let byte = self.data.get(self.pos).copied().unwrap_or(0);
            self.acc |= u32::from(byte) << self.available;
            self.pos += 1;
            self.available += 8;
        }
        let value = self.acc & ((1 << count) - 1);
        self.acc >>= count;
        self.available -= count;
        value as i16
    }
}

fn read_params(source: &mut impl BitSource) -> FrameParams {
    let mut params = FrameParams::default();
    for (larc, &width) in params.larc.iter_mut().zip(LAR_BITS.iter()) {
        *larc = source.bits(width);
    }
    for sub in 0..SUBFRAMES {
        params.nc[sub] = source.bits(NC_BITS);
        params.bc[sub] = source.bits(BC_BITS);
        params.mc[sub] = source.bits(MC_BITS);
        params.xmaxc[sub] = source.bits(XMAXC_BITS);
        for pulse in &mut params.xmc[sub * RPE_PULSES..(sub + 1) * RPE_PULSES] {
            *pulse = source.bits(XMC_BITS);
        }
    }
    params
}

/// Unpack a standard frame, returning its magic nibble and parameters.
pub fn unpack_standard(frame: &[u8]) -> (u8, FrameParams) {
    let mut source = MsbBits { data: frame, bit: 0 };
    let magic = source.bits(4) as u8;
    (magic, read_params(&mut source))
}

/// Unpack the 33-byte half of a WAV49 pair; also returns the carried nibble.
pub fn unpack_wav49_first(frame: &[u8]) -> (FrameParams, u8) {
    let mut source = LsbBits {
        data: frame,
        pos: 0,
        acc: 0,
        available: 0,
    };
    let params = read_params(&mut source);
    (params, (source.acc & 0x0F) as u8)
}

/// Unpack the 32-byte half of a WAV49 pair, seeded with the carried nibble.
pub fn unpack_wav49_second(chain: u8, frame: &[u8]) -> FrameParams {
    let mut source = LsbBits {
        data: frame,
        pos: 0,
        acc: u32::from(chain & 0x0F),
        available: 4,
    };
    read_params(&mut source)
}


#[cfg(test)]
mod tests {
    use super::packing::{pack_standard, pack_wav49};
    use super::*;

    fn sample_params(seed: i16) -> FrameParams {
        let mut params = FrameParams::default();
        for (index, larc) in params.larc.iter_mut().enumerate() {
            *larc = (seed + index as i16) & ((1 << LAR_BITS[index]) - 1);
        }
        for sub in 0..SUBFRAMES {
            params.nc[sub] = 40 + seed + sub as i16;
            params.bc[sub] = (seed + sub as i16) & 3;
            params.mc[sub] = sub as i16 & 3;
            params.xmaxc[sub] = (seed * 3 + sub as i16) & 63;
        }
        for (index, pulse) in params.xmc.iter_mut().enumerate() {
            *pulse = (index as i16 + seed) & 7;
        }
        params
    }

    #[test]
    fn standard_frame_fields_unpack_in_order() {
        let params = sample_params(5);
        let frame = pack_standard(&params);
        assert_eq!(frame.len(), STANDARD_FRAME_LEN);
        let (magic, unpacked) = unpack_standard(&frame);
        assert_eq!(magic, 0xD);
        assert_eq!(unpacked, params);
    }

    #[test]
    fn wav49_pair_carries_a_nibble_between_frames() {
        let first = sample_params(1);
        let second = sample_params(9);
        let pair = pack_wav49(&first, &second);
        assert_eq!(pair.len(), WAV49_PAIR_LEN);

        let (unpacked_first, chain) = unpack_wav49_first(&pair[..WAV49_FIRST_LEN]);
        assert_eq!(unpacked_first, first);
        assert_eq!(chain, pair[WAV49_FIRST_LEN - 1] >> 4);
        let unpacked_second = unpack_wav49_second(chain, &pair[WAV49_FIRST_LEN..]);
        assert_eq!(unpacked_second, second);
    }

    #[test]
    fn empty_frame_unpacks_to_zeroed_params() {
        let (_, params) = unpack_standard(&[]);
        assert_eq!(params, FrameParams::default());
        assert_eq!(params.xmc.len(), SUBFRAMES * RPE_PULSES);
        assert!(params.xmc.iter().all(|&pulse| pulse == 0));
    }
}
