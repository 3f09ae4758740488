use presence_identity::{compose_root, FactorHolder};
use proptest::prelude::*;

fn factor() -> impl Strategy<Value = String> {
    "[0-9a-f]{8,64}"
}

proptest! {
    #[test]
    fn composition_is_deterministic(factors in prop::collection::vec(factor(), 1..5)) {
        prop_assert_eq!(compose_root(&factors).unwrap(), compose_root(&factors).unwrap());
    }

    /// Swapping two distinct factors always changes the root.
    #[test]
    fn swapping_distinct_factors_changes_the_root(
        factors in prop::collection::vec(factor(), 2..5),
        i in 0usize..5,
        j in 0usize..5,
    ) {
        let i = i % factors.len();
        let j = j % factors.len();
        prop_assume!(factors[i] != factors[j]);
        let mut swapped = factors.clone();
        swapped.swap(i, j);
        prop_assert_ne!(compose_root(&factors).unwrap(), compose_root(&swapped).unwrap());
    }

    /// Surrounding whitespace never changes the root.
    #[test]
    fn padding_is_ignored(factors in prop::collection::vec(factor(), 1..5), pad in "[ \t\n]{0,3}") {
        let padded: Vec<String> = factors.iter().map(|f| format!("{pad}{f}{pad}")).collect();
        prop_assert_eq!(compose_root(&factors).unwrap(), compose_root(&padded).unwrap());
    }

    #[test]
    fn holder_matches_direct_composition(factors in prop::collection::vec(factor(), 1..5)) {
        let mut holder = FactorHolder::new();
        for (i, f) in factors.iter().enumerate() {
            holder.insert(format!("f{i}"), f.clone());
        }
        prop_assert_eq!(holder.compose().unwrap(), compose_root(&factors).unwrap());
    }
}
