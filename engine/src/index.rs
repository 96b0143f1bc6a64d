use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TermId = u32;
/// Documents are numbered from 1 in input order.
pub type DocId = u32;

/// Raw posting: how often a term occurs in one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosting {
    pub doc_id: DocId,
    pub tf: u32,
}

/// Weighted posting produced by [`crate::bm25`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub weight: f64,
}

impl Posting {
    pub fn new(doc_id: DocId, weight: f64) -> Self { Self { doc_id, weight } }
}

/// Anything that can sit in a posting list.
pub trait PostingEntry {
    fn doc_id(&self) -> DocId;
    fn value(&self) -> f64;
}

impl PostingEntry for RawPosting {
    fn doc_id(&self) -> DocId { self.doc_id }
    fn value(&self) -> f64 { self.tf as f64 }
}

impl PostingEntry for Posting {
    fn doc_id(&self) -> DocId { self.doc_id }
    fn value(&self) -> f64 { self.weight }
}

/// Read access shared by the raw and the weighted index.
pub trait TermLists {
    type Entry: PostingEntry;
    fn terms(&self) -> &[String];
    fn postings(&self, term_id: TermId) -> &[Self::Entry];
    fn num_docs(&self) -> u32;
}

/// Collection statistics returned once by [`IndexBuilder::finish`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub num_docs: u32,
    pub total_tokens: u64,
    pub avg_doc_length: f64,
    /// Token count per document, indexed by `doc_id - 1`.
    pub doc_lengths: Vec<u32>,
}

impl CollectionStats {
    pub fn doc_length(&self, doc_id: DocId) -> u32 { self.doc_lengths[(doc_id - 1) as usize] }
}

/// Term -> postings with raw frequencies. Term ids follow first occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvertedIndex {
    pub dictionary: HashMap<String, TermId>,
    pub terms: Vec<String>,
    pub postings: Vec<Vec<RawPosting>>, // postings sorted by doc_id
    pub stats: CollectionStats,
}

impl InvertedIndex {
    pub fn from_documents<I, D, S>(docs: I) -> Result<Self>
    where
        I: IntoIterator<Item = D>,
        D: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = IndexBuilder::new();
        for doc in docs {
            builder.add_document(doc);
        }
        builder.finish()
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> { self.dictionary.get(term).copied() }

    pub fn get(&self, term: &str) -> Option<&[RawPosting]> {
        self.term_id(term).map(|tid| self.postings[tid as usize].as_slice())
    }

    pub fn num_terms(&self) -> usize { self.terms.len() }

    pub fn document_frequency(&self, term_id: TermId) -> u32 { self.postings[term_id as usize].len() as u32 }
}

impl TermLists for InvertedIndex {
    type Entry = RawPosting;
    fn terms(&self) -> &[String] { &self.terms }
    fn postings(&self, term_id: TermId) -> &[RawPosting] { &self.postings[term_id as usize] }
    fn num_docs(&self) -> u32 { self.stats.num_docs }
}

/// Single-pass builder. Documents must be added in id order; the duplicate
/// check only looks at the tail of each list.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dictionary: HashMap<String, TermId>,
    terms: Vec<String>,
    postings: Vec<Vec<RawPosting>>,
    doc_lengths: Vec<u32>,
    total_tokens: u64,
}

impl IndexBuilder {
    pub fn new() -> Self { Self::default() }

    /// Adds the next document and returns its id.
    pub fn add_document<D, S>(&mut self, tokens: D) -> DocId
    where
        D: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let doc_id = self.doc_lengths.len() as DocId + 1;
        let mut len = 0u32;
        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() { continue; }
            len += 1;
            let tid = match self.dictionary.get(token) {
                Some(&tid) => tid,
                None => {
                    let tid = self.terms.len() as TermId;
                    self.dictionary.insert(token.to_string(), tid);
                    self.terms.push(token.to_string());
                    self.postings.push(Vec::new());
                    tid
                }
            };
            let list = &mut self.postings[tid as usize];
            match list.last_mut() {
                Some(last) if last.doc_id == doc_id => last.tf += 1,
                _ => list.push(RawPosting { doc_id, tf: 1 }),
            }
        }
        self.doc_lengths.push(len);
        self.total_tokens += len as u64;
        doc_id
    }

    pub fn num_docs(&self) -> usize { self.doc_lengths.len() }

    pub fn finish(self) -> Result<InvertedIndex> {
        if self.doc_lengths.is_empty() {
            return Err(Error::EmptyCollection);
        }
        let num_docs = self.doc_lengths.len() as u32;
        let avg_doc_length = self.total_tokens as f64 / num_docs as f64;
        tracing::info!(num_docs, num_terms = self.terms.len(), avg_doc_length, "built inverted index");
        Ok(InvertedIndex {
            dictionary: self.dictionary,
            terms: self.terms,
            postings: self.postings,
            stats: CollectionStats { num_docs, total_tokens: self.total_tokens, avg_doc_length, doc_lengths: self.doc_lengths },
        })
    }
}
