//! Property-based tests for vdw-crunch
//!
//! - Aggregation invariants (V, interior rates, ordering)
//! - Key predicates and the VDW key test
//! - Record encoding
//! - Run with ProptestConfig::with_cases(100)

use std::collections::BTreeMap;

use proptest::prelude::*;
use vdw_crunch::fit::{FittedCurve, Model};
use vdw_crunch::key::KeyDomain;
use vdw_crunch::meta::FitRecord;
use vdw_crunch::predicate::KeyPredicate;
use vdw_crunch::rate::RateSeries;
use vdw_crunch::trial::TrialRecord;

// ============================================================================
// Strategies
// ============================================================================

/// One valid trial record for key 13
fn arb_trial() -> impl Strategy<Value = TrialRecord> {
    (1u64..40, 1u64..50)
        .prop_flat_map(|(n, attempts)| (Just(n), Just(attempts), 0..=attempts))
        .prop_map(|(n, attempts, successes)| {
            TrialRecord::new(13, n, attempts, successes).unwrap()
        })
}

fn arb_trials() -> impl Strategy<Value = Vec<TrialRecord>> {
    proptest::collection::vec(arb_trial(), 0..30)
}

fn pooled(trials: &[TrialRecord]) -> BTreeMap<u64, (u64, u64)> {
    let mut map: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
    for t in trials {
        let cell = map.entry(t.n).or_default();
        cell.0 += t.attempts;
        cell.1 += t.successes;
    }
    map
}

// ============================================================================
// Aggregation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: V is the smallest n whose pooled trials all succeeded
    #[test]
    fn prop_v_is_min_total_success(trials in arb_trials()) {
        let series = RateSeries::aggregate(13, &trials);
        let expected = pooled(&trials)
            .into_iter()
            .filter(|(_, (a, s))| a == s)
            .map(|(n, _)| n)
            .min();
        prop_assert_eq!(series.first_total_success(), expected);
    }

    /// Property: kept points are exactly the pooled interior rates
    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn prop_interior_rates_exact(trials in arb_trials()) {
        let series = RateSeries::aggregate(13, &trials);
        let expected: Vec<(u64, f64)> = pooled(&trials)
            .into_iter()
            .filter(|(_, (a, s))| *s > 0 && s < a)
            .map(|(n, (a, s))| (n, s as f64 / a as f64))
            .collect();
        prop_assert_eq!(series.points(), expected.as_slice());
    }

    /// Property: no exact 0 or 1 rate survives, and n strictly increases
    #[test]
    fn prop_points_interior_and_sorted(trials in arb_trials()) {
        let series = RateSeries::aggregate(13, &trials);
        for &(_, rate) in series.points() {
            prop_assert!(rate > 0.0 && rate < 1.0);
        }
        for pair in series.points().windows(2) {
            prop_assert!(pair[0].0 < pair[1].0);
        }
    }

    /// Property: record order does not change the result
    #[test]
    fn prop_aggregation_order_independent(trials in arb_trials()) {
        let mut reversed = trials.clone();
        reversed.reverse();
        prop_assert_eq!(
            RateSeries::aggregate(13, &trials),
            RateSeries::aggregate(13, &reversed)
        );
    }
}

// ============================================================================
// Keys and predicates
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: a pattern is a VDW key iff key + 1 is a power of two
    #[test]
    fn prop_vdw_key_matches_power_of_two(key in 1u64..1_000_000) {
        prop_assert_eq!(
            KeyDomain::Pattern.is_vdw_key(key),
            (key + 1).is_power_of_two()
        );
        prop_assert!(KeyDomain::Length.is_vdw_key(key));
    }

    /// Property: the plain progression of length kW has length kW
    #[test]
    fn prop_key_for_length_inverts_progression_length(kw in 1u32..64) {
        let key = KeyDomain::Pattern.key_for_length(kw).unwrap();
        prop_assert!(KeyDomain::Pattern.is_vdw_key(key));
        prop_assert_eq!(KeyDomain::Pattern.progression_length(key), Some(kw));
    }

    /// Property: `p > c` agrees with integer comparison
    #[test]
    fn prop_threshold_predicate(key in 0u64..10_000, threshold in 0u64..10_000) {
        let pred = KeyPredicate::parse(&format!("p > {threshold}")).unwrap();
        prop_assert_eq!(pred.matches(key), key > threshold);
    }

    /// Property: `NOT` flips every defined result
    #[test]
    fn prop_not_flips(key in 0u64..10_000, modulus in 1u64..50) {
        let pred = KeyPredicate::parse(&format!("p % {modulus} = 0")).unwrap();
        let negated = KeyPredicate::parse(&format!("NOT (p % {modulus} = 0)")).unwrap();
        prop_assert_ne!(pred.matches(key), negated.matches(key));
    }
}

// ============================================================================
// Records
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: a fitted record survives JSON encoding
    #[test]
    fn prop_record_json_round_trip(
        key in 1u64..100_000,
        v in proptest::option::of(1u64..10_000),
        params in proptest::collection::vec(
            any::<f64>().prop_filter("finite", |v| v.is_finite()),
            4,
        ),
    ) {
        let curve = FittedCurve::new(Model::Logistic, params).unwrap();
        let record = FitRecord::fitted(key, KeyDomain::Pattern, v, 4, &curve);

        let json = serde_json::to_string(&record).unwrap();
        let decoded: FitRecord = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(decoded, record);
    }
}
