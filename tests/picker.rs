mod common;

use meshgate::balancer::{Candidate, WeightedPicker};
use meshgate::Code;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

fn candidates(weights: &[(&str, u32)]) -> Vec<Candidate<String>> {
    weights
        .iter()
        .map(|(id, w)| Candidate::new(*id, format!("conn-{id}"), *w).unwrap())
        .collect()
}

fn tally(picker: &WeightedPicker<String>, n: usize) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for _ in 0..n {
        let picked = picker.pick().unwrap();
        *counts.entry(picked.id().to_owned()).or_insert(0) += 1;
    }
    counts
}

#[test]
fn every_window_of_total_weight_matches_weights() {
    common::init_tracing();
    let mut rng = StdRng::seed_from_u64(7);
    let ids = ["a", "b", "c", "d", "e"];

    for _ in 0..50 {
        let size = rng.random_range(1..=ids.len());
        let weights: Vec<(&str, u32)> =
            ids[..size].iter().map(|id| (*id, rng.random_range(1..=9))).collect();
        let total: u32 = weights.iter().map(|(_, w)| w).sum();

        let picker = WeightedPicker::new();
        picker.rebuild(candidates(&weights));

        for _round in 0..3 {
            let counts = tally(&picker, total as usize);
            for (id, w) in &weights {
                assert_eq!(counts.get(*id).copied().unwrap_or(0), *w, "weights {weights:?}");
            }
        }
    }
}

#[test]
fn heavy_candidate_is_interleaved() {
    let picker = WeightedPicker::new();
    picker.rebuild(candidates(&[("a", 5), ("b", 1), ("c", 1)]));

    let seq: Vec<String> = (0..7).map(|_| picker.pick().unwrap().id().to_owned()).collect();
    assert_eq!(seq, ["a", "a", "a", "b", "a", "a", "c"]);
}

#[test]
fn empty_set_is_unavailable_not_a_crash() {
    let picker: WeightedPicker<String> = WeightedPicker::new();
    for _ in 0..3 {
        let err = picker.pick().unwrap_err();
        assert!(err.is_no_candidate());
        assert_eq!(err.code(), Code::Unavailable);
    }

    picker.rebuild(candidates(&[("a", 1)]));
    picker.rebuild(Vec::new());
    assert!(picker.pick().is_err());
}

#[test]
fn rebuild_restarts_the_schedule() {
    let picker = WeightedPicker::new();
    picker.rebuild(candidates(&[("a", 2), ("b", 1)]));
    assert_eq!(picker.pick().unwrap().id(), "a");

    picker.rebuild(candidates(&[("a", 2), ("b", 1)]));
    let seq: Vec<String> = (0..3).map(|_| picker.pick().unwrap().id().to_owned()).collect();
    assert_eq!(seq, ["a", "a", "b"]);
}

#[test]
fn concurrent_picks_keep_exact_proportions() {
    let picker = Arc::new(WeightedPicker::new());
    picker.rebuild(candidates(&[("a", 3), ("b", 2), ("c", 1)]));
    let threads = 4;
    let per_thread = 6 * 25;

    let merged = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let picker = picker.clone();
                scope.spawn(move || tally(&picker, per_thread))
            })
            .collect();

        let mut merged: HashMap<String, u32> = HashMap::new();
        for handle in handles {
            for (id, n) in handle.join().unwrap() {
                *merged.entry(id).or_insert(0) += n;
            }
        }
        merged
    });

    assert_eq!(merged["a"], 300);
    assert_eq!(merged["b"], 200);
    assert_eq!(merged["c"], 100);
}

#[test]
fn discovery_metadata_defaults_bad_weights() {
    let mut meta = HashMap::new();
    meta.insert("weight".to_owned(), "zero?".to_owned());
    let odd = Candidate::from_metadata("odd", "conn-odd".to_owned(), &meta).unwrap();
    meta.insert("weight".to_owned(), "3".to_owned());
    let heavy = Candidate::from_metadata("heavy", "conn-heavy".to_owned(), &meta).unwrap();
    assert_eq!(odd.weight(), 1);
    assert_eq!(heavy.weight(), 3);

    let picker = WeightedPicker::new();
    picker.rebuild(vec![odd, heavy]);
    let counts = tally(&picker, 8);
    assert_eq!(counts["heavy"], 6);
    assert_eq!(counts["odd"], 2);
}
