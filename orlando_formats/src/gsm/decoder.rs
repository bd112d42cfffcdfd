use anyhow::{Result, ensure};
use log::debug;

use super::arith::{MAX_WORD, MIN_WORD, add, asl, asr, mult_r, sub};
use super::tables::{
    FAC, GSM_MAGIC, LAR_B, LAR_INVA, LAR_MIC, QLB, RPE_PULSES, SUBFRAME_LEN, SUBFRAMES,
};
use super::unpack::{
    FrameParams, STANDARD_FRAME_LEN, WAV49_FIRST_LEN, WAV49_SECOND_LEN, unpack_standard,
    unpack_wav49_first, unpack_wav49_second,
};

/// PCM samples produced by one frame (20 ms at 8 kHz).
pub const SAMPLES_PER_FRAME: usize = 160;

/// How frames are packed in the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GsmLayout {
    /// 33-byte MSB-first frames led by the `0xD` magic nibble.
    #[default]
    Standard,
    /// Microsoft GSM: 65-byte pairs, LSB-first.
    Wav49,
}

#[derive(Debug, Clone)]
struct SynthesisState {
    /// Reconstructed residual history; `dp0[120..160]` is the current subframe.
    dp0: [i16; 280],
    larpp: [[i16; 8]; 2],
    j: usize,
    nrp: i16,
    v: [i16; 9],
    msr: i16,
}

impl Default for SynthesisState {
    fn default() -> Self {
        Self {
            dp0: [0; 280],
            larpp: [[0; 8]; 2],
            j: 0,
            nrp: 40,
            v: [0; 9],
            msr: 0,
        }
    }
}

/// Stateful GSM 06.10 full-rate decoder producing 16-bit PCM.
#[derive(Debug, Clone, Default)]
pub struct GsmDecoder {
    state: SynthesisState,
    layout: GsmLayout,
    wav49_second_half: bool,
    frame_chain: u8,
    frames_decoded: u64,
}

impl GsmDecoder {
    pub fn new(layout: GsmLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn layout(&self) -> GsmLayout {
        self.layout
    }

    /// Switch packing layout; only allowed before the first frame.
    pub fn set_layout(&mut self, layout: GsmLayout) -> Result<()> {
        ensure!(
            self.frames_decoded == 0,
            "cannot change GSM layout after {} frames",
            self.frames_decoded
        );
        self.layout = layout;
        Ok(())
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Byte length of the next frame this decoder will consume.
    pub fn next_frame_len(&self) -> usize {
        match self.layout {
            GsmLayout::Standard => STANDARD_FRAME_LEN,
            GsmLayout::Wav49 if self.wav49_second_half => WAV49_SECOND_LEN,
            GsmLayout::Wav49 => WAV49_FIRST_LEN,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.layout);
    }

    /// Decode one frame into `out`, returning the number of input bytes consumed.
    pub fn decode_frame(
        &mut self,
        input: &[u8],
        out: &mut [i16; SAMPLES_PER_FRAME],
    ) -> Result<usize> {
        let needed = self.next_frame_len();
        ensure!(
            input.len() >= needed,
            "GSM frame needs {needed} bytes, got {}",
            input.len()
        );

        let params = match self.layout {
            GsmLayout::Standard => {
                let (magic, params) = unpack_standard(&input[..needed]);
                if magic != GSM_MAGIC {
                    debug!(
                        "GSM frame {} has magic {magic:#x}; decoding anyway",
                        self.frames_decoded
                    );
                }
                params
            }
            GsmLayout::Wav49 if self.wav49_second_half => {
                self.wav49_second_half = false;
                unpack_wav49_second(self.frame_chain, &input[..needed])
            }
            GsmLayout::Wav49 => {
                let (params, chain) = unpack_wav49_first(&input[..needed]);
                self.frame_chain = chain;
                self.wav49_second_half = true;
                params
            }
        };

        self.state.decode(&params, out);
        self.frames_decoded += 1;
        Ok(needed)
    }

    /// Decode every whole frame in `data`. Trailing partial bytes are dropped.
    pub fn decode_all(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        let mut samples = Vec::with_capacity(data.len() / STANDARD_FRAME_LEN * SAMPLES_PER_FRAME);
        let mut frame = [0i16; SAMPLES_PER_FRAME];
        let mut offset = 0;
        while data.len() - offset >= self.next_frame_len() {
            offset += self.decode_frame(&data[offset..], &mut frame)?;
            samples.extend_from_slice(&frame);
        }
        if offset < data.len() {
            debug!(
                "ignoring {} trailing GSM bytes after {} frames",
                data.len() - offset,
                self.frames_decoded
            );
        }
        Ok(samples)
    }
}

impl SynthesisState {
    fn decode(&mut self, params: &FrameParams, out: &mut [i16; SAMPLES_PER_FRAME]) {
        let mut wt = [0i16; SAMPLES_PER_FRAME];
        for sub in 0..SUBFRAMES {
            let pulses = &params.xmc[sub * RPE_PULSES..(sub + 1) * RPE_PULSES];
            let erp = rpe_decoding(params.xmaxc[sub], params.mc[sub], pulses);
            self.long_term_synthesis(params.nc[sub], params.bc[sub], &erp);
            wt[sub * SUBFRAME_LEN..(sub + 1) * SUBFRAME_LEN]
                .copy_from_slice(&self.dp0[120..120 + SUBFRAME_LEN]);
        }
        self.short_term_synthesis(&params.larc, &wt, out);
        self.postprocess(out);
    }

    fn long_term_synthesis(&mut self, ncr: i16, bcr: i16, erp: &[i16; SUBFRAME_LEN]) {
        let lag = if !(40..=120).contains(&ncr) {
            self.nrp
        } else {
            ncr
        };
        self.nrp = lag;
        let gain = QLB[(bcr & 3) as usize];
        let lag = lag as usize;

        for k in 0..SUBFRAME_LEN {
            let predicted = mult_r(gain, self.dp0[120 + k - lag]);
            self.dp0[120 + k] = add(erp[k], predicted);
        }
        self.dp0.copy_within(40..160, 0);
    }

    fn short_term_synthesis(
        &mut self,
        larc: &[i16; 8],
        wt: &[i16; SAMPLES_PER_FRAME],
        out: &mut [i16; SAMPLES_PER_FRAME],
    ) {
        let current = self.j;
        self.j ^= 1;
        let previous = self.j;
        self.larpp[current] = decode_lars(larc);
        let (prev, cur) = (self.larpp[previous], self.larpp[current]);

        let segments: [(usize, usize, fn(i16, i16) -> i16); 4] = [
            (0, 13, |p, c| add(add(p >> 2, c >> 2), p >> 1)),
            (13, 27, |p, c| add(p >> 1, c >> 1)),
            (27, 40, |p, c| add(add(p >> 2, c >> 2), c >> 1)),
            (40, SAMPLES_PER_FRAME, |_, c| c),
        ];
        for (start, end, interpolate) in segments {
            let mut rp = [0i16; 8];
            for i in 0..8 {
                rp[i] = larp_to_rp(interpolate(prev[i], cur[i]));
            }
            self.synthesis_filter(&rp, &wt[start..end], &mut out[start..end]);
        }
    }

    fn synthesis_filter(&mut self, rrp: &[i16; 8], wt: &[i16], sr: &mut [i16]) {
        for (sample, &residual) in sr.iter_mut().zip(wt) {
            let mut sri = residual;
            for i in (0..8).rev() {
                sri = sub(sri, mult_r(rrp[i], self.v[i]));
                self.v[i + 1] = add(self.v[i], mult_r(rrp[i], sri));
            }
            self.v[0] = sri;
            *sample = sri;
        }
    }

    /// De-emphasis, upscaling and truncation to 13 significant bits.
    fn postprocess(&mut self, samples: &mut [i16; SAMPLES_PER_FRAME]) {
        let mut msr = self.msr;
        for sample in samples.iter_mut() {
            let feedback = mult_r(msr, 28180);
            msr = add(*sample, feedback);
            *sample = add(msr, msr) & (0xFFF8u16 as i16);
        }
        self.msr = msr;
    }
}

fn decode_lars(larc: &[i16; 8]) -> [i16; 8] {
    let mut larpp = [0i16; 8];
    for i in 0..8 {
        let mut temp = add(larc[i], LAR_MIC[i]).wrapping_shl(10);
        temp = sub(temp, LAR_B[i].wrapping_shl(1));
        temp = mult_r(LAR_INVA[i], temp);
        larpp[i] = add(temp, temp);
    }
    larpp
}

fn larp_to_rp(larp: i16) -> i16 {
    let magnitude = if larp == MIN_WORD {
        MAX_WORD
    } else {
        larp.abs()
    };
    let rp = if magnitude < 11059 {
        magnitude << 1
    } else if magnitude < 20070 {
        magnitude + 11059
    } else {
        add(magnitude >> 2, 26112)
    };
    if larp < 0 { -rp } else { rp }
}

/// Split the block maximum code into its exponent and mantissa.
fn xmaxc_to_exp_mant(xmaxc: i16) -> (i16, i16) {
    let mut exp = 0i16;
    if xmaxc > 15 {
        exp = (xmaxc >> 3) - 1;
    }
    let mut mant = xmaxc - (exp << 3);

    if mant == 0 {
        exp = -4;
        mant = 7;
    } else {
        while mant <= 7 {
            mant = (mant << 1) | 1;
            exp -= 1;
        }
        mant -= 8;
    }
    (exp, mant)
}

fn apcm_inverse_quantization(xmc: &[i16], exp: i16, mant: i16) -> [i16; RPE_PULSES] {
    let temp1 = FAC[mant as usize];
    let temp2 = sub(6, exp);
    let temp3 = asl(1, i32::from(sub(temp2, 1)));

    let mut xmp = [0i16; RPE_PULSES];
    for (out, &code) in xmp.iter_mut().zip(xmc) {
        let mut temp = ((code << 1) - 7) << 12;
        temp = mult_r(temp1, temp);
        temp = add(temp, temp3);
        *out = asr(temp, i32::from(temp2));
    }
    xmp
}

fn rpe_decoding(xmaxc: i16, mc: i16, xmc: &[i16]) -> [i16; SUBFRAME_LEN] {
    let (exp, mant) = xmaxc_to_exp_mant(xmaxc);
    let xmp = apcm_inverse_quantization(xmc, exp, mant);

    let mut erp = [0i16; SUBFRAME_LEN];
    let grid = (mc & 3) as usize;
    for (i, &pulse) in xmp.iter().enumerate() {
        erp[grid + 3 * i] = pulse;
    }
    erp
}

#[cfg(test)]
mod tests {
    use super::super::unpack::packing::{pack_standard, pack_wav49};
    use super::*;

    fn voiced_params(seed: i16) -> FrameParams {
        let mut params = FrameParams {
            larc: [40, 20, 18, 9, 10, 6, 4, 3],
            nc: [60, 61, 120, 10],
            bc: [3, 2, 1, 0],
            mc: [0, 1, 2, 3],
            xmaxc: [63, 40, 16, 1],
            ..FrameParams::default()
        };
        for (index, pulse) in params.xmc.iter_mut().enumerate() {
            *pulse = (index as i16 * 5 + seed) & 7;
        }
        params
    }

    #[test]
    fn zero_frame_yields_a_full_block() {
        let mut decoder = GsmDecoder::new(GsmLayout::Standard);
        let mut out = [1i16; SAMPLES_PER_FRAME];
        assert_eq!(decoder.decode_frame(&[0u8; 33], &mut out).unwrap(), 33);
        assert_eq!(decoder.frames_decoded(), 1);
        assert!(out.iter().all(|sample| sample & 7 == 0));
    }

    #[test]
    fn short_input_is_an_error() {
        let mut decoder = GsmDecoder::default();
        let mut out = [0i16; SAMPLES_PER_FRAME];
        assert!(decoder.decode_frame(&[0xD0; 10], &mut out).is_err());
    }

    #[test]
    fn exponent_and_mantissa_cover_the_code_range() {
        assert_eq!(xmaxc_to_exp_mant(0), (-4, 7));
        assert_eq!(xmaxc_to_exp_mant(1), (-3, 7));
        assert_eq!(xmaxc_to_exp_mant(15), (0, 7));
        assert_eq!(xmaxc_to_exp_mant(16), (1, 0));
        assert_eq!(xmaxc_to_exp_mant(63), (6, 7));
        for code in 0..64 {
            let (exp, mant) = xmaxc_to_exp_mant(code);
            assert!((-4..=6).contains(&exp));
            assert!((0..=7).contains(&mant));
        }
    }

    #[test]
    fn out_of_range_lag_reuses_previous_lag() {
        let mut state = SynthesisState::default();
        let erp = [0i16; SUBFRAME_LEN];
        state.long_term_synthesis(77, 0, &erp);
        assert_eq!(state.nrp, 77);
        state.long_term_synthesis(5, 0, &erp);
        assert_eq!(state.nrp, 77);
        state.long_term_synthesis(121, 0, &erp);
        assert_eq!(state.nrp, 77);
    }

    #[test]
    fn reflection_coefficients_keep_sign() {
        assert_eq!(larp_to_rp(100), 200);
        assert_eq!(larp_to_rp(-100), -200);
        assert_eq!(larp_to_rp(15000), 26059);
        assert_eq!(larp_to_rp(MIN_WORD), -32767);
    }

    #[test]
    fn standard_and_wav49_layouts_decode_identically() {
        let frames: Vec<FrameParams> = (0..4).map(voiced_params).collect();

        let mut standard = Vec::new();
        for params in &frames {
            standard.extend(pack_standard(params));
        }
        let mut wav49 = Vec::new();
        for pair in frames.chunks(2) {
            wav49.extend(pack_wav49(&pair[0], &pair[1]));
        }

        let from_standard = GsmDecoder::new(GsmLayout::Standard)
            .decode_all(&standard)
            .unwrap();
        let from_wav49 = GsmDecoder::new(GsmLayout::Wav49)
            .decode_all(&wav49)
            .unwrap();
        assert_eq!(from_standard.len(), 4 * SAMPLES_PER_FRAME);
        assert_eq!(from_standard, from_wav49);
        assert!(from_standard.iter().any(|&sample| sample != 0));
    }

    #[test]
    fn decoding_is_deterministic_and_stateful() {
        let frame = pack_standard(&voiced_params(3));
        let mut stream = frame.clone();
        stream.extend_from_slice(&frame);
        stream.push(0xD0);

        let samples = GsmDecoder::default().decode_all(&stream).unwrap();
        assert_eq!(samples.len(), 2 * SAMPLES_PER_FRAME);
        let again = GsmDecoder::default().decode_all(&stream).unwrap();
        assert_eq!(samples, again);
        assert_ne!(
            samples[..SAMPLES_PER_FRAME],
            samples[SAMPLES_PER_FRAME..],
            "filter memory should carry across frames"
        );
    }

    #[test]
    fn layout_is_fixed_once_decoding_starts() {
        let mut decoder = GsmDecoder::default();
        decoder.set_layout(GsmLayout::Wav49).unwrap();
        assert_eq!(decoder.next_frame_len(), 33);
        let mut out = [0i16; SAMPLES_PER_FRAME];
        decoder.decode_frame(&[0u8; 33], &mut out).unwrap();
        assert_eq!(decoder.next_frame_len(), 32);
        assert!(decoder.set_layout(GsmLayout::Standard).is_err());
        decoder.reset();
        assert_eq!(decoder.next_frame_len(), 33);
        assert_eq!(decoder.layout(), GsmLayout::Wav49);
    }
}
