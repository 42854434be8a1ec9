//! Score aggregation over one query's collected hits.
//!
//! # Reciprocal rank
//!
//! Every occurrence of a key contributes `1 / (rank + 1)`, where `rank` is the
//! 0-based position of that occurrence in the list of the operand that
//! returned it. The fused score multiplies the summed contribution by the
//! number of occurrences, rewarding agreement between operands as well as
//! high placement within each:
//!
//! ```text
//! rank_score(key) = Σ 1 / (rank + 1)
//! count(key)      = occurrences of key
//! fused(key)      = count(key) * rank_score(key)
//! ```
//!
//! # Softmax
//!
//! Used by votes whose operands report a `similarity`. Each operand's scores
//! for the query are softmax-normalized, so every operand casts a total weight
//! of one; a key's fused score is its summed weight divided by the number of
//! operands in the composition.
//!
//! Incoming `similarity` values never pass through unchanged: both
//! aggregators recompute the score from scratch.

use crate::collect::Hit;
use anyhow::Result;
use braid_core::{Document, Key};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Aggregated state for one distinct key within one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: Key,
    /// The first occurrence, which is the copy emitted downstream.
    pub document: Document,
    /// Position of the first occurrence in the collected hit list.
    pub first_seen: usize,
    pub rank_score: f64,
    pub count: usize,
    /// Fused score under whichever aggregator built the table.
    pub score: f64,
    operands: Vec<usize>,
}

impl Entry {
    /// Number of distinct operands that returned this key.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    fn observe(&mut self, hit: &Hit) {
        self.rank_score += reciprocal_rank(hit.rank);
        self.count += 1;
        if let Err(slot) = self.operands.binary_search(&hit.operand) {
            self.operands.insert(slot, hit.operand);
        }
    }
}

/// Per-query score table: key → fused score and occurrence count, in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    entries: Vec<Entry>,
    index: HashMap<Key, usize>,
}

impl ScoreTable {
    /// Aggregate `hits` with the reciprocal-rank formula.
    ///
    /// # Errors
    ///
    /// Returns [`braid_core::FusionError::MissingKey`] when a hit lacks the
    /// key field.
    pub fn reciprocal_rank(hits: &[Hit], key_field: &str) -> Result<Self> {
        let mut table = Self::tally(hits, key_field)?;
        for entry in &mut table.entries {
            entry.score = count_as_f64(entry.count) * entry.rank_score;
        }
        Ok(table)
    }

    /// Aggregate `hits` with per-operand softmax over reported similarity.
    ///
    /// Returns `None` when any hit has no numeric similarity; callers fall
    /// back to [`ScoreTable::reciprocal_rank`].
    ///
    /// # Errors
    ///
    /// Returns [`braid_core::FusionError::MissingKey`] when a hit lacks the
    /// key field.
    pub fn softmax(hits: &[Hit], key_field: &str, operand_count: usize) -> Result<Option<Self>> {
        let Some(similarities) = hits
            .iter()
            .map(|hit| hit.document.similarity())
            .collect::<Option<Vec<f64>>>()
        else {
            return Ok(None);
        };

        let mut table = Self::tally(hits, key_field)?;

        let mut by_operand: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (position, hit) in hits.iter().enumerate() {
            by_operand.entry(hit.operand).or_default().push(position);
        }

        for positions in by_operand.values() {
            let max = positions
                .iter()
                .map(|&p| similarities[p])
                .fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = positions
                .iter()
                .map(|&p| (similarities[p] - max).exp())
                .collect();
            let total: f64 = exps.iter().sum();
            if !total.is_finite() || total <= 0.0 {
                continue;
            }
            for (&position, weight) in positions.iter().zip(exps) {
                let key = hits[position].document.require_key(key_field, "softmax")?;
                if let Some(&slot) = table.index.get(&key) {
                    table.entries[slot].score += weight / total;
                }
            }
        }

        let divisor = count_as_f64(operand_count.max(1));
        for entry in &mut table.entries {
            entry.score /= divisor;
        }
        Ok(Some(table))
    }

    fn tally(hits: &[Hit], key_field: &str) -> Result<Self> {
        let mut table = Self::default();
        for (position, hit) in hits.iter().enumerate() {
            let key = hit
                .document
                .require_key(key_field, &format!("operand #{}", hit.operand))?;
            if let Some(&slot) = table.index.get(&key) {
                table.entries[slot].observe(hit);
                continue;
            }
            let mut entry = Entry {
                key: key.clone(),
                document: hit.document.clone(),
                first_seen: position,
                rank_score: 0.0,
                count: 0,
                score: 0.0,
                operands: Vec::new(),
            };
            entry.observe(hit);
            table.index.insert(key, table.entries.len());
            table.entries.push(entry);
        }
        Ok(table)
    }

    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Entry> {
        self.index.get(key).map(|&slot| &self.entries[slot])
    }

    /// Entries in first-seen order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by descending fused score; ties keep first-seen order.
    #[must_use]
    pub fn into_ranked(self) -> Vec<Entry> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        entries
    }
}

#[must_use]
pub fn reciprocal_rank(rank: usize) -> f64 {
    1.0 / count_as_f64(rank + 1)
}

#[allow(clippy::cast_precision_loss)]
fn count_as_f64(value: usize) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(operand: usize, rank: usize, id: i64) -> Hit {
        Hit {
            operand,
            rank,
            document: Document::new().with("id", id),
        }
    }

    fn scored(operand: usize, rank: usize, id: i64, similarity: f64) -> Hit {
        Hit {
            operand,
            rank,
            document: Document::new().with("id", id).with_similarity(similarity),
        }
    }

    fn assert_approx_eq(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn reciprocal_rank_uses_per_operand_position() {
        // A = [0, 1], B = [1]
        let hits = [hit(0, 0, 0), hit(0, 1, 1), hit(1, 0, 1)];
        let table = ScoreTable::reciprocal_rank(&hits, "id").expect("aggregate");

        let zero = table.get(&Key::from(0_i64)).expect("key 0");
        assert_eq!(zero.count, 1);
        assert_approx_eq(zero.score, 1.0);

        let one = table.get(&Key::from(1_i64)).expect("key 1");
        assert_eq!(one.count, 2);
        assert_eq!(one.operand_count(), 2);
        assert_approx_eq(one.rank_score, 1.5);
        assert_approx_eq(one.score, 3.0);
    }

    #[test]
    fn three_operand_table_matches_hand_computation() {
        // A = [a, b, c], B = [c, a], C = [b]
        let hits = [
            hit(0, 0, 10),
            hit(0, 1, 11),
            hit(0, 2, 12),
            hit(1, 0, 12),
            hit(1, 1, 10),
            hit(2, 0, 11),
        ];
        let table = ScoreTable::reciprocal_rank(&hits, "id").expect("aggregate");

        // a: 2 * (1 + 1/2) = 3
        assert_approx_eq(table.get(&Key::from(10_i64)).expect("a").score, 3.0);
        // b: 2 * (1/2 + 1) = 3
        assert_approx_eq(table.get(&Key::from(11_i64)).expect("b").score, 3.0);
        // c: 2 * (1/3 + 1) = 8/3
        assert_approx_eq(table.get(&Key::from(12_i64)).expect("c").score, 8.0 / 3.0);

        let order: Vec<usize> = table.into_ranked().iter().map(|e| e.first_seen).collect();
        assert_eq!(order, [0, 1, 2]);
    }

    #[test]
    fn duplicates_within_one_operand_count_once_per_operand() {
        let hits = [hit(0, 0, 1), hit(0, 1, 1)];
        let table = ScoreTable::reciprocal_rank(&hits, "id").expect("aggregate");
        let entry = table.get(&Key::from(1_i64)).expect("key");
        assert_eq!(entry.count, 2);
        assert_eq!(entry.operand_count(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn first_occurrence_is_kept() {
        let hits = [
            Hit {
                operand: 0,
                rank: 0,
                document: Document::new().with("id", 1).with("source", "first"),
            },
            Hit {
                operand: 1,
                rank: 0,
                document: Document::new().with("id", 1).with("source", "second"),
            },
        ];
        let table = ScoreTable::reciprocal_rank(&hits, "id").expect("aggregate");
        assert_eq!(
            table.entries()[0].document.get("source"),
            Some(&serde_json::Value::from("first"))
        );
    }

    #[test]
    fn missing_key_is_an_error() {
        let hits = [Hit {
            operand: 0,
            rank: 0,
            document: Document::new().with("title", "no key"),
        }];
        assert!(ScoreTable::reciprocal_rank(&hits, "id").is_err());
    }

    #[test]
    fn softmax_weights_sum_to_one_per_operand() {
        let hits = [
            scored(0, 0, 1, 2.0),
            scored(0, 1, 2, 1.0),
            scored(1, 0, 2, 5.0),
        ];
        let table = ScoreTable::softmax(&hits, "id", 2)
            .expect("aggregate")
            .expect("all scored");

        let e = std::f64::consts::E;
        let w1 = e / (e + 1.0);
        let w2 = 1.0 / (e + 1.0);
        assert_approx_eq(table.get(&Key::from(1_i64)).expect("1").score, w1 / 2.0);
        assert_approx_eq(
            table.get(&Key::from(2_i64)).expect("2").score,
            (w2 + 1.0) / 2.0,
        );

        let total: f64 = table.entries().iter().map(|entry| entry.score).sum();
        assert_approx_eq(total, 1.0);
    }

    #[test]
    fn softmax_declines_unscored_hits() {
        let hits = [scored(0, 0, 1, 0.5), hit(1, 0, 2)];
        assert!(
            ScoreTable::softmax(&hits, "id", 2)
                .expect("aggregate")
                .is_none()
        );
    }

    #[test]
    fn ranking_breaks_ties_by_first_seen() {
        let hits = [hit(0, 0, 1), hit(1, 0, 2)];
        let ranked = ScoreTable::reciprocal_rank(&hits, "id")
            .expect("aggregate")
            .into_ranked();
        assert_eq!(ranked[0].key, Key::from(1_i64));
        assert_eq!(ranked[1].key, Key::from(2_i64));
    }
}
