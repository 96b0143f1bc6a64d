use crate::error::{Error, Result};
use crate::index::Posting;
use std::cmp::Ordering;

enum Task {
    Select { items: Vec<Posting>, k: usize },
    Emit(Vec<Posting>),
}

/// Returns the `min(k, items.len())` highest-weighted postings, best first.
/// Equal weights keep input order, so this equals a stable descending sort cut to `k`.
pub fn top_k(items: Vec<Posting>, k: usize) -> Result<Vec<Posting>> {
    if k == 0 {
        return Err(Error::ZeroK { what: "top-k selection" });
    }
    let mut out = Vec::with_capacity(k.min(items.len()));
    let mut stack = vec![Task::Select { items, k }];
    while let Some(task) = stack.pop() {
        let (items, k) = match task {
            Task::Emit(run) => {
                out.extend(run);
                continue;
            }
            Task::Select { items, k } => (items, k),
        };
        if k == 0 || items.is_empty() { continue; }
        if items.len() == 1 {
            out.extend(items);
            continue;
        }

        let pivot = items[items.len() / 2].weight;
        let mut greater = Vec::new();
        let mut equal = Vec::new();
        let mut less = Vec::new();
        for p in items {
            match p.weight.total_cmp(&pivot) {
                Ordering::Greater => greater.push(p),
                Ordering::Equal => equal.push(p),
                Ordering::Less => less.push(p),
            }
        }

        // pushed in reverse output order
        let g = greater.len();
        if g >= k {
            stack.push(Task::Select { items: greater, k });
        } else if g + equal.len() >= k {
            equal.truncate(k - g);
            stack.push(Task::Emit(equal));
            stack.push(Task::Select { items: greater, k: g });
        } else {
            let rest = k - g - equal.len();
            stack.push(Task::Select { items: less, k: rest });
            stack.push(Task::Emit(equal));
            stack.push(Task::Select { items: greater, k: g });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn list(pairs: &[(u32, f64)]) -> Vec<Posting> { pairs.iter().map(|&(d, w)| Posting::new(d, w)).collect() }

    fn reference(mut items: Vec<Posting>, k: usize) -> Vec<Posting> {
        items.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        items.truncate(k);
        items
    }

    #[test]
    fn picks_highest_scores() {
        let items = list(&[(3, 5.0), (2, 2.0), (1, 7.0), (11, 9.0)]);
        assert_eq!(top_k(items, 3).unwrap(), list(&[(11, 9.0), (1, 7.0), (3, 5.0)]));
    }

    #[test]
    fn ties_keep_input_order() {
        let items = list(&[(1, 0.0), (2, 0.0), (3, 2.521)]);
        assert_eq!(top_k(items, 3).unwrap(), list(&[(3, 2.521), (1, 0.0), (2, 0.0)]));
    }

    #[test]
    fn k_larger_than_input() {
        let items = list(&[(1, 1.0), (2, 3.0)]);
        assert_eq!(top_k(items, 10).unwrap(), list(&[(2, 3.0), (1, 1.0)]));
        assert!(top_k(Vec::new(), 5).unwrap().is_empty());
    }

    #[test]
    fn zero_k_is_a_configuration_error() {
        assert!(matches!(top_k(list(&[(1, 1.0)]), 0), Err(Error::ZeroK { .. })));
    }

    #[test]
    fn matches_sort_then_truncate() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [1usize, 2, 5, 17, 100, 1000] {
            // few distinct values so ties are common
            let items: Vec<Posting> = (0..n).map(|d| Posting::new(d as u32 + 1, rng.random_range(0..20) as f64 / 4.0)).collect();
            for k in [1, 2, 3, n / 2 + 1, n, n + 3] {
                assert_eq!(top_k(items.clone(), k).unwrap(), reference(items.clone(), k), "n={n} k={k}");
            }
        }
    }

    #[test]
    fn large_uniform_input_does_not_blow_the_stack() {
        let items: Vec<Posting> = (1..=200_000).map(|d| Posting::new(d, (d % 3) as f64)).collect();
        let top = top_k(items, 5).unwrap();
        assert_eq!(top.len(), 5);
        assert!(top.iter().all(|p| p.weight == 2.0));
        assert_eq!(top[0].doc_id, 3);
    }

    #[test]
    fn sorted_input_is_fine() {
        let items: Vec<Posting> = (1..=50_000).map(|d| Posting::new(d, d as f64)).collect();
        let top = top_k(items, 50_000).unwrap();
        assert!(top.windows(2).all(|w| w[0].weight > w[1].weight));
    }
}
