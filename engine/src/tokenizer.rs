use crate::config::TokenizerConfig;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref SPLIT: Regex = Regex::new(r"\W+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","did","do","does","doing","down","during",
            "each","few","for","from","further","had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself","me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very","was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Splits text on non-word characters and lower-cases what is left.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self { Self { config } }

    pub fn config(&self) -> &TokenizerConfig { &self.config }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = if self.config.nfkc {
            text.nfkc().collect::<String>().to_lowercase()
        } else {
            text.to_lowercase()
        };
        let mut tokens = Vec::new();
        for word in SPLIT.split(&lowered) {
            if word.is_empty() || word.chars().count() < self.config.min_len { continue; }
            if self.config.stopwords && STOPWORDS.contains(word) { continue; }
            if self.config.stem {
                tokens.push(STEMMER.stem(word).into_owned());
            } else {
                tokens.push(word.to_string());
            }
        }
        tokens
    }
}

/// Tokenize with the default rule: NFKC, lowercase, split on `\W+`.
pub fn tokenize(text: &str) -> Vec<String> { Tokenizer::default().tokenize(text) }
