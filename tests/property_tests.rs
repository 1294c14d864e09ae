use guild_scorer::data::{InteractionProfile, InteractionProfileStore, Relation};
use guild_scorer::phylo::{PhyloTree, TipMapping};
use guild_scorer::utils::{count_shared_organisms, Breakpoints, METRIC_PERCENTILES};
use guild_scorer::{percentile_normalize, CalibrationTable, PhylogeneticDistanceIndex};
use proptest::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

const MAX_LEAVES: usize = 12;
const ORGANISMS: [&str; 6] = ["Apis", "Bombus", "Osmia", "Andrena", "Eristalis", "Vespula"];

fn plant_id(leaf: usize) -> String {
    format!("wfo-{leaf:02}")
}

/// Random rooted binary tree over `n` leaves as Newick, built by merging
/// clades in the order given by `picks`
fn random_newick(n: usize, picks: &[usize], lengths: &[f64]) -> String {
    let mut clades: Vec<String> = (0..n).map(|i| format!("T{i}:{}", lengths[i])).collect();
    let mut step = 0;
    while clades.len() > 1 {
        let a = clades.remove(picks[step] % clades.len());
        let b = clades.remove(picks[step + 1] % clades.len());
        let length = lengths[n + step];
        let merged = if clades.is_empty() {
            format!("({a},{b})")
        } else {
            format!("({a},{b}):{length}")
        };
        clades.push(merged);
        step += 1;
    }
    format!("{};", clades[0])
}

fn tree_strategy() -> impl Strategy<Value = (usize, PhylogeneticDistanceIndex)> {
    (2usize..=MAX_LEAVES).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(0usize..64, 2 * n),
            prop::collection::vec(0.01f64..50.0, 2 * n),
        )
            .prop_map(|(n, picks, lengths)| {
                let tree = PhyloTree::from_newick(&random_newick(n, &picks, &lengths))
                    .expect("generated Newick parses");
                let tips = TipMapping::from_pairs((0..n).map(|i| (plant_id(i), format!("T{i}"))));
                (n, PhylogeneticDistanceIndex::new(tree, tips))
            })
    })
}

fn breakpoints_strategy() -> impl Strategy<Value = Breakpoints> {
    prop::collection::vec(-100.0f64..100.0, METRIC_PERCENTILES.len()).prop_map(|mut values| {
        values.sort_by(|a, b| a.total_cmp(b));
        let points = METRIC_PERCENTILES.iter().copied().zip(values).collect();
        Breakpoints::new(points).expect("sorted values are valid breakpoints")
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn faiths_pd_ignores_member_order(
        (n, index) in tree_strategy(),
        seed in any::<u64>(),
    ) {
        let ids: Vec<String> = (0..n).map(plant_id).collect();
        let mut shuffled = ids.clone();
        let rotation = (seed as usize) % n;
        shuffled.rotate_left(rotation);
        shuffled.reverse();
        prop_assert_eq!(index.faiths_pd(&ids), index.faiths_pd(&shuffled));
    }

    #[test]
    fn faiths_pd_grows_with_members((n, index) in tree_strategy(), cut in 1usize..MAX_LEAVES) {
        let cut = cut.min(n - 1);
        let ids: Vec<String> = (0..n).map(plant_id).collect();
        let smaller = index.faiths_pd(&ids[..cut]);
        let larger = index.faiths_pd(&ids[..cut + 1]);
        prop_assert!(larger >= smaller - 1e-9, "pd shrank: {} -> {}", smaller, larger);
    }

    #[test]
    fn faiths_pd_of_single_plant_is_zero((n, index) in tree_strategy(), leaf in 0usize..MAX_LEAVES) {
        let id = plant_id(leaf % n);
        prop_assert_eq!(index.faiths_pd(&[id]), 0.0);
    }

    #[test]
    fn percentile_is_monotonic_and_bounded(
        breakpoints in breakpoints_strategy(),
        a in -200.0f64..200.0,
        b in -200.0f64..200.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p_lo = breakpoints.percentile_of(lo);
        let p_hi = breakpoints.percentile_of(hi);
        prop_assert!((0.0..=100.0).contains(&p_lo));
        prop_assert!((0.0..=100.0).contains(&p_hi));
        prop_assert!(p_lo <= p_hi + 1e-9, "not monotonic: {} -> {}, {} -> {}", lo, p_lo, hi, p_hi);
    }

    #[test]
    fn percentile_clamps_outside_range(breakpoints in breakpoints_strategy(), offset in 0.0f64..1e6) {
        prop_assert_eq!(breakpoints.percentile_of(breakpoints.min() - offset), 0.0);
        prop_assert_eq!(breakpoints.percentile_of(breakpoints.max() + offset), 100.0);
    }

    #[test]
    fn inverted_normalization_mirrors(breakpoints in breakpoints_strategy(), raw in -200.0f64..200.0) {
        let mut metrics = BTreeMap::new();
        metrics.insert("m1".to_string(), breakpoints);
        let mut tiers = BTreeMap::new();
        tiers.insert("tier".to_string(), metrics);
        let table = CalibrationTable::new(tiers);

        let direct = percentile_normalize(raw, "m1", &table, "tier", false).unwrap();
        let inverted = percentile_normalize(raw, "m1", &table, "tier", true).unwrap();
        prop_assert!((direct + inverted - 100.0).abs() < 1e-9);
    }

    #[test]
    fn shared_counts_lie_within_guild_size(
        memberships in prop::collection::vec(prop::collection::vec(any::<bool>(), ORGANISMS.len()), 0..8),
    ) {
        let mut organisms = FxHashMap::default();
        for (i, present) in memberships.iter().enumerate() {
            let pollinators = ORGANISMS
                .iter()
                .zip(present)
                .filter(|(_, keep)| **keep)
                .map(|(name, _)| name.to_string())
                .collect();
            organisms.insert(plant_id(i), InteractionProfile { pollinators, ..Default::default() });
        }
        let store = InteractionProfileStore::new(organisms, FxHashMap::default());
        let ids: Vec<String> = (0..memberships.len()).map(plant_id).collect();

        let counts = count_shared_organisms(&store, &ids, &[Relation::Pollinators]);
        if ids.is_empty() {
            prop_assert!(counts.is_empty());
        }
        for (organism, count) in &counts {
            prop_assert!(*count >= 1 && *count <= ids.len(), "{} counted {} times", organism, count);
            if ids.len() == 1 {
                prop_assert_eq!(*count, 1);
            }
        }
    }
}
