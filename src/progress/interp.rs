// src/progress/interp.rs

//! Linear interpolation helpers for nested sub-progress ranges.

/// `interp(lo, hi, frac) = lo + (hi - lo) * frac / 100`.
///
/// `frac` is a percentage in `0..=100`; out-of-range values are clamped so a
/// noisy tool line can never push the reported progress outside the range.
pub fn interp(lo: f64, hi: f64, frac: f64) -> f64 {
    let frac = frac.clamp(0.0, 100.0);
    lo + (hi - lo) * frac / 100.0
}

/// Fractional completion (0..=100) of item `index` of `total`, where the
/// current item itself is `inner_frac` percent complete.
///
/// `index` is 1-based: item 1 of 4 at 50% is 12.5% overall. Returns `None`
/// when `total` or `index` is zero, which callers treat as "fall back to the
/// outer milestone only".
pub fn frac_within(index: u32, total: u32, inner_frac: f64) -> Option<f64> {
    if total == 0 || index == 0 {
        return None;
    }
    let done = (index - 1) as f64;
    let inner = inner_frac.clamp(0.0, 100.0) / 100.0;
    Some(((done + inner) / total as f64) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interp_endpoints() {
        assert_eq!(interp(24.0, 50.0, 0.0), 24.0);
        assert_eq!(interp(24.0, 50.0, 100.0), 50.0);
    }

    #[test]
    fn interp_clamps_out_of_range_fractions() {
        assert_eq!(interp(10.0, 20.0, -5.0), 10.0);
        assert_eq!(interp(10.0, 20.0, 250.0), 20.0);
    }

    #[test]
    fn frac_within_midpoints() {
        // Item 1 of 2 fully done -> 50%.
        assert_eq!(frac_within(1, 2, 100.0), Some(50.0));
        // Item 3 of 4 at 0% -> 50% (two of four done).
        assert_eq!(frac_within(3, 4, 0.0), Some(50.0));
    }

    #[test]
    fn frac_within_zero_is_fallback() {
        assert_eq!(frac_within(0, 4, 50.0), None);
        assert_eq!(frac_within(2, 0, 50.0), None);
    }
}
