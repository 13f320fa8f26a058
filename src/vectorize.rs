//! Bag-of-words vectorization and cosine ranking.
//!
//! Vectors are raw term counts over a [`Vocabulary`] whose term order is
//! first-seen order across the texts it was built from. Two vectors are only
//! comparable when they were built against the same vocabulary.

use indexmap::IndexSet;

/// Lower-case, drop everything outside `[a-z0-9\s]`, split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Distinct terms in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    terms: IndexSet<String>,
}

impl Vocabulary {
    /// Every distinct token across `texts`, in first-seen order.
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Self {
        let terms = texts
            .iter()
            .flat_map(|text| tokenize(text.as_ref()))
            .collect();
        Self { terms }
    }

    pub fn from_terms(terms: impl IntoIterator<Item = String>) -> Self {
        Self {
            terms: terms.into_iter().collect(),
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Raw count of each vocabulary term in `text`. Tokens outside the vocabulary are ignored.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.terms.len()];
        for token in tokenize(text) {
            if let Some(i) = self.terms.get_index_of(&token) {
                counts[i] += 1.0;
            }
        }
        counts
    }
}

/// `dot(a, b) / (‖a‖ · ‖b‖)`.
///
/// `NaN` when either vector is all-zero, the lengths differ, or both are
/// empty. Callers treat `NaN` as "no match".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::NAN;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    // 0/0 is NaN, which is what an all-zero side should produce.
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Indices and scores of the `k` most similar candidates, best first.
///
/// `NaN` scores are dropped before sorting; ties keep candidate order.
pub fn rank_top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .filter(|(_, score)| !score.is_nan())
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}
