use crate::error::{Error, Result};
use crate::index::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One benchmark line: `<query text>\t<space-separated relevant ids>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkQuery {
    pub query: String,
    pub relevant: BTreeSet<DocId>,
}

impl BenchmarkQuery {
    /// `line_no` is 1-based and only used for error messages.
    pub fn parse_line(line_no: usize, line: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedBenchmarkLine { line: line_no, reason: reason.to_string() };
        let (query, ids) = line.trim_end_matches(['\r', '\n']).split_once('\t').ok_or_else(|| malformed("missing tab separator"))?;
        let relevant = ids
            .split_whitespace()
            .map(|id| id.parse::<DocId>().map_err(|_| malformed(&format!("bad document id '{id}'"))))
            .collect::<Result<BTreeSet<_>>>()?;
        if relevant.is_empty() {
            return Err(malformed("no relevant document ids"));
        }
        Ok(Self { query: query.to_string(), relevant })
    }
}

/// Parses a whole benchmark file, skipping blank lines.
pub fn parse_benchmark(text: &str) -> Result<Vec<BenchmarkQuery>> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| BenchmarkQuery::parse_line(i + 1, l))
        .collect()
}

/// Fraction of the first `k` results that are relevant. Missing positions
/// count as misses.
pub fn precision_at_k(results: &[DocId], relevant: &BTreeSet<DocId>, k: usize) -> Result<f64> {
    if k == 0 {
        return Err(Error::ZeroK { what: "precision@k" });
    }
    let hits = results.iter().take(k).filter(|id| relevant.contains(id)).count();
    Ok(hits as f64 / k as f64)
}

/// Mean of P@i over the ranks `i` holding a relevant document, divided by
/// the number of relevant documents.
pub fn average_precision(results: &[DocId], relevant: &BTreeSet<DocId>) -> Result<f64> {
    if relevant.is_empty() {
        return Err(Error::EmptyRelevantSet);
    }
    let mut found = 0usize;
    let mut sum = 0.0;
    for (i, id) in results.iter().enumerate() {
        if relevant.contains(id) {
            found += 1;
            sum += found as f64 / (i + 1) as f64;
        }
    }
    Ok(sum / relevant.len() as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "mp@3")]
    pub mp_at_3: f64,
    #[serde(rename = "mp@r")]
    pub mp_at_r: f64,
    pub map: f64,
}

impl Metrics {
    /// `lambda * self + (1 - lambda) * other`, metric by metric.
    pub fn blend(&self, other: &Metrics, lambda: f64) -> Result<Metrics> {
        if !(0.0..=1.0).contains(&lambda) {
            return Err(Error::InvalidBlend(lambda));
        }
        let mix = |a: f64, b: f64| lambda * a + (1.0 - lambda) * b;
        Ok(Metrics { mp_at_3: mix(self.mp_at_3, other.mp_at_3), mp_at_r: mix(self.mp_at_r, other.mp_at_r), map: mix(self.map, other.map) })
    }
}

/// Runs `rank` for every query and averages P@3, P@R and AP. A query whose
/// ranking fails is scored as an empty result list.
pub fn evaluate<F>(queries: &[BenchmarkQuery], mut rank: F) -> Result<Metrics>
where
    F: FnMut(&BenchmarkQuery) -> Result<Vec<DocId>>,
{
    if queries.is_empty() {
        return Err(Error::EmptyBenchmark);
    }
    let mut total = Metrics::default();
    for q in queries {
        let results = rank(q).unwrap_or_else(|err| {
            tracing::warn!(query = %q.query, %err, "query failed, scoring as empty");
            Vec::new()
        });
        total.mp_at_3 += precision_at_k(&results, &q.relevant, 3)?;
        total.mp_at_r += precision_at_k(&results, &q.relevant, q.relevant.len())?;
        total.map += average_precision(&results, &q.relevant)?;
    }
    let n = queries.len() as f64;
    Ok(Metrics { mp_at_3: total.mp_at_3 / n, mp_at_r: total.mp_at_r / n, map: total.map / n })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[DocId]) -> BTreeSet<DocId> { ids.iter().copied().collect() }

    #[test]
    fn precision_at_k_examples() {
        let rel = set(&[0, 2, 5, 6, 7, 8]);
        assert_eq!(precision_at_k(&[0, 1, 2, 5, 6], &rel, 4).unwrap(), 0.75);
        assert_eq!(precision_at_k(&[0, 1], &rel, 4).unwrap(), 0.25);
        assert_eq!(precision_at_k(&[], &rel, 1).unwrap(), 0.0);
        assert_eq!(precision_at_k(&[0], &rel, 0), Err(Error::ZeroK { what: "precision@k" }));
    }

    #[test]
    fn average_precision_example() {
        let ap = average_precision(&[582, 17, 5666, 10003, 10], &set(&[10, 582, 877, 10003])).unwrap();
        assert!((ap - 0.525).abs() < 1e-12);
        assert_eq!(average_precision(&[1], &set(&[])), Err(Error::EmptyRelevantSet));
    }

    #[test]
    fn metrics_stay_in_unit_interval() {
        let rel = set(&[1, 2, 3]);
        for results in [vec![], vec![1, 2, 3], vec![4, 5, 1], vec![1, 1, 1, 1]] {
            for k in 1..6 {
                let p = precision_at_k(&results, &rel, k).unwrap();
                assert!((0.0..=1.0).contains(&p));
            }
            let ap = average_precision(&results, &rel).unwrap();
            assert!((0.0..=1.0).contains(&ap), "{results:?}: {ap}");
        }
    }

    #[test]
    fn parses_benchmark_lines() {
        let qs = parse_benchmark("web surfing\t1 3 4\n\nbeach\t5 6\r\n").unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].query, "web surfing");
        assert_eq!(qs[0].relevant, set(&[1, 3, 4]));
        assert_eq!(qs[1].relevant, set(&[5, 6]));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(matches!(parse_benchmark("no tab here"), Err(Error::MalformedBenchmarkLine { line: 1, .. })));
        assert!(matches!(parse_benchmark("ok\t1\nbad\tx"), Err(Error::MalformedBenchmarkLine { line: 2, .. })));
        assert!(matches!(parse_benchmark("empty\t  "), Err(Error::MalformedBenchmarkLine { line: 1, .. })));
    }

    #[test]
    fn evaluate_averages_and_survives_failures() {
        let qs = parse_benchmark("a\t1 2\nb\t3").unwrap();
        let m = evaluate(&qs, |q| if q.query == "a" { Ok(vec![1, 5, 2]) } else { Err(Error::ZeroK { what: "test" }) }).unwrap();
        // a: P@3 = 2/3, P@R = 1/2, AP = (1 + 2/3) / 2; b: all zero
        assert!((m.mp_at_3 - (2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((m.mp_at_r - 0.25).abs() < 1e-12);
        assert!((m.map - (5.0 / 6.0) / 2.0).abs() < 1e-12);
        assert_eq!(evaluate(&[], |_| Ok(vec![])), Err(Error::EmptyBenchmark));
    }

    #[test]
    fn blending() {
        let v = Metrics { mp_at_3: 1.0, mp_at_r: 0.5, map: 0.2 };
        let l = Metrics { mp_at_3: 0.0, mp_at_r: 0.5, map: 0.6 };
        let b = v.blend(&l, 0.25).unwrap();
        assert_eq!(b.mp_at_3, 0.25);
        assert_eq!(b.mp_at_r, 0.5);
        assert!((b.map - 0.5).abs() < 1e-12);
        assert_eq!(v.blend(&l, 1.5), Err(Error::InvalidBlend(1.5)));
    }
}
