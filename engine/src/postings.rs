use crate::index::{DocId, Posting};
use std::cmp::Ordering;

/// Union of two lists; weights of shared documents are added.
pub fn merge(a: &[Posting], b: &[Posting]) -> Vec<Posting> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                out.push(Posting::new(a[i].doc_id, a[i].weight + b[j].weight));
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Zipper intersection; weights of matching documents are added.
pub fn intersect(a: &[Posting], b: &[Posting]) -> Vec<Posting> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                out.push(Posting::new(a[i].doc_id, a[i].weight + b[j].weight));
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    out
}

/// Intersection that walks the shorter list and gallops through the longer
/// one. Same output as [`intersect`]; faster when the lengths differ a lot.
pub fn intersect_galloping(a: &[Posting], b: &[Posting]) -> Vec<Posting> {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut out = Vec::with_capacity(short.len());
    let mut lo = 0;
    for p in short {
        if lo >= long.len() { break; }
        let mut step = 1;
        let mut hi = lo;
        while hi < long.len() && long[hi].doc_id < p.doc_id {
            lo = hi;
            hi += step;
            step *= 2;
        }
        let hi = hi.min(long.len() - 1) + 1;
        match search(&long[lo..hi], p.doc_id) {
            Ok(off) => {
                out.push(Posting::new(p.doc_id, p.weight + long[lo + off].weight));
                lo += off + 1;
            }
            Err(off) => lo += off,
        }
    }
    out
}

fn search(list: &[Posting], doc_id: DocId) -> Result<usize, usize> { list.binary_search_by_key(&doc_id, |p| p.doc_id) }

/// Union of any number of lists, folded left to right.
pub fn merge_all<'a, I>(lists: I) -> Vec<Posting>
where
    I: IntoIterator<Item = &'a [Posting]>,
{
    lists.into_iter().fold(Vec::new(), |acc, list| merge(&acc, list))
}

/// Intersection of any number of lists; empty when no list is given.
pub fn intersect_all<'a, I>(lists: I) -> Vec<Posting>
where
    I: IntoIterator<Item = &'a [Posting]>,
{
    let mut iter = lists.into_iter();
    let Some(first) = iter.next() else { return Vec::new() };
    iter.fold(first.to_vec(), |acc, list| intersect_galloping(&acc, list))
}
