pub const MIN_WORD: i16 = i16::MIN;
pub const MAX_WORD: i16 = i16::MAX;
pub const MIN_LONGWORD: i32 = i32::MIN;
pub const MAX_LONGWORD: i32 = i32::MAX;

#[inline]
pub fn add(a: i16, b: i16) -> i16 {
    a.saturating_add(b)
}

#[inline]
pub fn sub(a: i16, b: i16) -> i16 {
    a.saturating_sub(b)
}

#[inline]
pub fn l_add(a: i32, b: i32) -> i32 {
    a.saturating_add(b)
}

/// Rounded Q15 product, `(a * b + 2^14) >> 15`.
#[inline]
pub fn mult_r(a: i16, b: i16) -> i16 {
    if a == MIN_WORD && b == MIN_WORD {
        return MAX_WORD;
    }
    (l_add(i32::from(a) * i32::from(b), 16384) >> 15) as i16
}

/// Arithmetic shift right; negative counts shift left.
#[inline]
pub fn asr(a: i16, n: i32) -> i16 {
    if n >= 16 {
        return if a < 0 { -1 } else { 0 };
    }
    if n <= -16 {
        return 0;
    }
    if n < 0 {
        return a.wrapping_shl((-n) as u32);
    }
    a >> n
}

/// Arithmetic shift left; negative counts shift right.
#[inline]
pub fn asl(a: i16, n: i32) -> i16 {
    if n >= 16 {
        return 0;
    }
    if n <= -16 {
        return if a < 0 { -1 } else { 0 };
    }
    if n < 0 {
        return asr(a, -n);
    }
    a.wrapping_shl(n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_sub_clamp_to_word_range() {
        let samples = [MIN_WORD, -20000, -1, 0, 1, 20000, MAX_WORD];
        for &a in &samples {
            for &b in &samples {
                let wide = i32::from(a) + i32::from(b);
                assert_eq!(i32::from(add(a, b)), wide.clamp(-32768, 32767));
                let wide = i32::from(a) - i32::from(b);
                assert_eq!(i32::from(sub(a, b)), wide.clamp(-32768, 32767));
            }
        }
        assert_eq!(l_add(MAX_LONGWORD, 1), MAX_LONGWORD);
        assert_eq!(l_add(MIN_LONGWORD, -1), MIN_LONGWORD);
    }

    #[test]
    fn mult_r_rounds_and_saturates() {
        assert_eq!(mult_r(MIN_WORD, MIN_WORD), MAX_WORD);
        assert_eq!(mult_r(16384, 16384), 8192);
        assert_eq!(mult_r(MAX_WORD, MAX_WORD), 32766);
        assert_eq!(mult_r(1, 16384), 1);
        assert_eq!(mult_r(-1, 16384), 0);
    }

    #[test]
    fn shifts_handle_out_of_range_counts() {
        assert_eq!(asr(-5, 16), -1);
        assert_eq!(asr(5, 16), 0);
        assert_eq!(asr(-8, 2), -2);
        assert_eq!(asr(3, -2), 12);
        assert_eq!(asl(1, 9), 512);
        assert_eq!(asl(1, -1), 0);
        assert_eq!(asl(-4, -16), -1);
        assert_eq!(asl(7, 16), 0);
    }
}
