//! Ticker universe and its reproducible identity.
//!
//! The universe hash is the identity aggregate series are stored under, so
//! two configurations naming the same tickers in any order, case or
//! repetition share one stored history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("ticker list is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Universe {
    /// Tickers in configuration order, upper-cased and de-duplicated.
    pub tickers: Vec<String>,
    pub set_hash: String,
}

impl Universe {
    pub fn new(tickers: Vec<String>) -> Result<Self, UniverseError> {
        if tickers.is_empty() {
            return Err(UniverseError::Empty);
        }
        let set_hash = set_hash(&tickers);
        Ok(Self { tickers, set_hash })
    }

    pub fn count(&self) -> usize {
        self.tickers.len()
    }
}

/// Canonical ticker list stored under a set hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecuritySet {
    pub set_hash: String,
    pub tickers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Split a comma-separated list, keeping first-seen order. Blank tokens and
/// repeats are dropped.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let ticker = token.trim().to_uppercase();
        if ticker.is_empty() {
            continue;
        }
        if seen.insert(ticker.clone()) {
            tickers.push(ticker);
        }
    }

    if tickers.is_empty() {
        return Err(UniverseError::Empty);
    }
    Ok(tickers)
}

/// Trim, upper-case, drop blanks, de-duplicate and sort.
pub fn canonicalize<S: AsRef<str>>(tickers: &[S]) -> Vec<String> {
    let unique: BTreeSet<String> = tickers
        .iter()
        .map(|t| t.as_ref().trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    unique.into_iter().collect()
}

/// Lowercase hex SHA-256 of the canonical list joined with `,`.
pub fn set_hash<S: AsRef<str>>(tickers: &[S]) -> String {
    let canonical = canonicalize(tickers).join(",");
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
