// tests/property_progress.rs

//! Property tests for the interpolation primitives and the acceptance rule.

use proptest::prelude::*;

use fragrun::driver::{acceptance, Acceptance};
use fragrun::progress::{frac_within, interp};

proptest! {
    #[test]
    fn interp_stays_inside_the_range(
        lo in 0.0f64..100.0,
        span in 0.0f64..100.0,
        frac in -50.0f64..150.0,
    ) {
        let hi = (lo + span).min(100.0);
        let value = interp(lo, hi, frac);
        prop_assert!(value >= lo - 1e-9, "{value} < {lo}");
        prop_assert!(value <= hi + 1e-9, "{value} > {hi}");
    }

    #[test]
    fn interp_is_monotonic_in_the_fraction(
        lo in 0.0f64..100.0,
        span in 0.0f64..100.0,
        a in 0.0f64..=100.0,
        b in 0.0f64..=100.0,
    ) {
        let hi = (lo + span).min(100.0);
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(interp(lo, hi, small) <= interp(lo, hi, large) + 1e-9);
    }

    #[test]
    fn interp_endpoints_hit_the_bounds(lo in 0.0f64..100.0, span in 0.0f64..100.0) {
        let hi = (lo + span).min(100.0);
        prop_assert_eq!(interp(lo, hi, 0.0), lo);
        prop_assert!((interp(lo, hi, 100.0) - hi).abs() < 1e-9);
    }

    #[test]
    fn frac_within_nests_between_neighbouring_steps(
        index in 1u32..50,
        total in 1u32..50,
        inner in 0.0f64..=100.0,
    ) {
        prop_assume!(index <= total);
        let value = frac_within(index, total, inner).expect("valid counters");

        // The nested fraction never leaves the step it belongs to.
        let step_lo = (index - 1) as f64 / total as f64 * 100.0;
        let step_hi = index as f64 / total as f64 * 100.0;
        prop_assert!(value >= step_lo - 1e-9);
        prop_assert!(value <= step_hi + 1e-9);
    }

    #[test]
    fn zero_counters_never_interpolate(inner in 0.0f64..=100.0) {
        prop_assert!(frac_within(0, 10, inner).is_none());
        prop_assert!(frac_within(1, 0, inner).is_none());
    }

    #[test]
    fn acceptance_is_monotonic_in_produced(expected in 1u64..100_000, produced in 0u64..100_000) {
        let here = acceptance(expected, produced);
        let more = acceptance(expected, produced + 1);
        let rank = |a: Acceptance| match a {
            Acceptance::Reject => 0,
            Acceptance::AcceptWithWarning => 1,
            Acceptance::Accept => 2,
        };
        prop_assert!(rank(more) >= rank(here));
    }

    #[test]
    fn surplus_is_always_accepted(expected in 0u64..100_000, surplus in 0u64..1000) {
        prop_assert_eq!(acceptance(expected, expected + surplus), Acceptance::Accept);
    }
}
