//! Algebraic laws of the delay lattice, checked over generated values.

use proptest::prelude::*;
use raceme_pipeline::Delay;

fn delays() -> impl Strategy<Value = Delay> {
    prop_oneof![
        Just(Delay::Invalid),
        (0u64..1_000).prop_map(Delay::Known),
        (0u64..1_000).prop_map(Delay::Unknown),
    ]
}

/// Proven lower bound in cycles, for monotonicity checks.
fn floor(delay: Delay) -> Option<u64> {
    match delay {
        Delay::Invalid => None,
        Delay::Known(n) | Delay::Unknown(n) => Some(n),
    }
}

proptest! {
    #[test]
    fn merge_commutes(a in delays(), b in delays()) {
        prop_assert_eq!(a.merge(b), b.merge(a));
    }

    #[test]
    fn merge_associates(a in delays(), b in delays(), c in delays()) {
        prop_assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
    }

    #[test]
    fn concat_associates(a in delays(), b in delays(), c in delays()) {
        prop_assert_eq!(a.concat(b).concat(c), a.concat(b.concat(c)));
    }

    #[test]
    fn invalid_is_merge_identity(a in delays()) {
        prop_assert_eq!(Delay::Invalid.merge(a), a);
        prop_assert_eq!(a.merge(Delay::Invalid), a);
    }

    #[test]
    fn invalid_absorbs_concat(a in delays()) {
        prop_assert_eq!(Delay::Invalid.concat(a), Delay::Invalid);
        prop_assert_eq!(a.concat(Delay::Invalid), Delay::Invalid);
    }

    #[test]
    fn concat_sums_lower_bounds(a in delays(), b in delays()) {
        match (floor(a), floor(b)) {
            (Some(fa), Some(fb)) => {
                prop_assert_eq!(floor(a.concat(b)), Some(fa + fb));
            }
            _ => prop_assert_eq!(floor(a.concat(b)), None),
        }
    }

    #[test]
    fn merge_never_lowers_a_bound(a in delays(), b in delays()) {
        if let (Some(fa), Some(fb)) = (floor(a), floor(b)) {
            let merged = floor(a.merge(b)).unwrap();
            prop_assert!(merged >= fa.max(fb));
        }
    }

    #[test]
    fn exactness_survives_only_exact_operands(a in delays(), b in delays()) {
        if a.concat(b).is_exact() {
            prop_assert!(a.is_exact() && b.is_exact());
        }
    }
}
