//! Competition ranking ("1224") of scored entities.

use crate::{RankedEntry, Scored};
use anyhow::{Result, anyhow};
use itertools::Itertools;
use std::collections::HashSet;

/// Sort entities by score (highest first) and assign competition ranks.
///
/// Entities with equal scores share the rank of the first of them and the
/// next lower score resumes at its 1-based position, so `[50, 50, 30]`
/// ranks as `[1, 1, 3]`.
///
/// The sort is stable and has no secondary key: tied entities keep the order
/// they arrived in. Ids are not checked for uniqueness here, see
/// [`resolve_strict`].
pub fn resolve<T: Scored + Clone>(entities: &[T]) -> Vec<RankedEntry<T>> {
    let sorted = entities
        .iter()
        .cloned()
        .sorted_by(|a, b| b.score().cmp(&a.score()));

    let mut ranked: Vec<RankedEntry<T>> = Vec::with_capacity(entities.len());
    for (index, entity) in sorted.enumerate() {
        let rank = match ranked.last() {
            Some(prev) if prev.entity.score() == entity.score() => prev.rank,
            _ => position_rank(index),
        };
        ranked.push(RankedEntry { entity, rank });
    }
    ranked
}

/// Same as [`resolve`], but refuses input with a repeated id.
///
/// # Errors
/// Returns an error naming the first id that appears more than once.
pub fn resolve_strict<T: Scored + Clone>(entities: &[T]) -> Result<Vec<RankedEntry<T>>> {
    let mut seen = HashSet::with_capacity(entities.len());
    for entity in entities {
        if !seen.insert(entity.id()) {
            return Err(anyhow!("Duplicate id {:?} in ranking input", entity.id()));
        }
    }
    Ok(resolve(entities))
}

#[allow(clippy::cast_possible_truncation)]
fn position_rank(index: usize) -> u32 {
    (index + 1).min(u32::MAX as usize) as u32
}

/// Remembers the last input and its ranking so repeated refreshes with
/// unchanged data skip the sort. The input is compared by value, so a
/// changed score always triggers a recompute.
#[derive(Debug, Clone)]
pub struct RankCache<T> {
    input: Vec<T>,
    output: Vec<RankedEntry<T>>,
    recomputes: usize,
}

impl<T> Default for RankCache<T> {
    fn default() -> Self {
        Self {
            input: Vec::new(),
            output: Vec::new(),
            recomputes: 0,
        }
    }
}

impl<T: Scored + Clone + PartialEq> RankCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the ranking for `entities`, recomputing only when they differ from last time.
    pub fn resolve(&mut self, entities: &[T]) -> &[RankedEntry<T>] {
        if self.recomputes == 0 || self.input.as_slice() != entities {
            self.input = entities.to_vec();
            self.output = resolve(entities);
            self.recomputes += 1;
            log::debug!(
                "Recomputed ranking for {} entities ({} recomputes)",
                entities.len(),
                self.recomputes
            );
        }
        &self.output
    }

    /// How many times the ranking has actually been computed.
    pub fn recomputes(&self) -> usize {
        self.recomputes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScoredEntity, UnitRecord};

    fn entities(scores: &[u32]) -> Vec<ScoredEntity> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| ScoredEntity::new(format!("unit-{i}"), *s))
            .collect()
    }

    fn ranks(ranked: &[RankedEntry]) -> Vec<u32> {
        ranked.iter().map(|r| r.rank).collect()
    }

    #[test_log::test]
    fn test_resolve_empty() {
        let ranked = resolve::<ScoredEntity>(&[]);
        assert!(ranked.is_empty());
    }

    #[test_log::test]
    fn test_resolve_tie_skips_next_rank() {
        let ranked = resolve(&entities(&[50, 50, 30]));
        assert_eq!(ranks(&ranked), vec![1, 1, 3]);
    }

    #[test_log::test]
    fn test_resolve_all_tied() {
        let ranked = resolve(&entities(&[10, 10, 10]));
        assert_eq!(ranks(&ranked), vec![1, 1, 1]);
    }

    #[test_log::test]
    fn test_resolve_strict_order() {
        let ranked = resolve(&entities(&[30, 20, 10]));
        assert_eq!(ranks(&ranked), vec![1, 2, 3]);
    }

    #[test_log::test]
    fn test_resolve_sorts_descending() {
        let ranked = resolve(&entities(&[5, 40, 15, 40, 0]));
        let scores: Vec<u32> = ranked.iter().map(|r| r.entity.score).collect();
        assert_eq!(scores, vec![40, 40, 15, 5, 0]);
        assert_eq!(ranks(&ranked), vec![1, 1, 3, 4, 5]);
    }

    #[test_log::test]
    fn test_resolve_tie_in_the_middle() {
        let ranked = resolve(&entities(&[90, 70, 70, 70, 20, 20, 10]));
        assert_eq!(ranks(&ranked), vec![1, 2, 2, 2, 5, 5, 7]);
    }

    #[test_log::test]
    fn test_resolve_ranks_never_decrease() {
        let ranked = resolve(&entities(&[3, 9, 9, 1, 7, 3, 3, 12, 0, 7]));
        for pair in ranked.windows(2) {
            assert!(pair[0].rank <= pair[1].rank);
            assert!(pair[0].entity.score >= pair[1].entity.score);
        }
    }

    #[test_log::test]
    fn test_resolve_ties_keep_input_order() {
        let input = vec![
            ScoredEntity::new("b", 10),
            ScoredEntity::new("a", 20),
            ScoredEntity::new("c", 10),
        ];
        let ranked = resolve(&input);
        let ids: Vec<&str> = ranked.iter().map(|r| r.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let reversed: Vec<ScoredEntity> = input.into_iter().rev().collect();
        let ranked = resolve(&reversed);
        let ids: Vec<&str> = ranked.iter().map(|r| r.entity.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test_log::test]
    fn test_resolve_is_idempotent() {
        let input = entities(&[4, 8, 8, 2]);
        assert_eq!(resolve(&input), resolve(&input));
    }

    #[test_log::test]
    fn test_resolve_keeps_unit_records() {
        let units = vec![
            UnitRecord {
                id: "u1".to_string(),
                name: "Eagles".to_string(),
                score: 12,
            },
            UnitRecord {
                id: "u2".to_string(),
                name: "Wolves".to_string(),
                score: 30,
            },
        ];
        let ranked = resolve(&units);
        assert_eq!(ranked[0].entity.name, "Wolves");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test_log::test]
    fn test_resolve_strict_rejects_duplicate_ids() {
        let input = vec![ScoredEntity::new("a", 1), ScoredEntity::new("a", 2)];
        let err = resolve_strict(&input).unwrap_err();
        assert!(err.to_string().contains("\"a\""));
    }

    #[test_log::test]
    fn test_resolve_strict_matches_resolve() {
        let input = entities(&[50, 50, 30]);
        assert_eq!(resolve_strict(&input).unwrap(), resolve(&input));
    }

    #[test_log::test]
    fn test_rank_cache_skips_unchanged_input() {
        let mut cache = RankCache::new();
        let input = entities(&[3, 2, 1]);

        let first = cache.resolve(&input).to_vec();
        let second = cache.resolve(&input).to_vec();

        assert_eq!(first, second);
        assert_eq!(cache.recomputes(), 1);
    }

    #[test_log::test]
    fn test_rank_cache_recomputes_on_score_change() {
        let mut cache = RankCache::new();
        let mut input = entities(&[3, 2, 1]);
        cache.resolve(&input);

        input[2].score = 10;
        let ranked = cache.resolve(&input);

        assert_eq!(ranked[0].entity.id, "unit-2");
        assert_eq!(cache.recomputes(), 2);
    }

    #[test_log::test]
    fn test_rank_cache_handles_empty_first_input() {
        let mut cache = RankCache::<ScoredEntity>::new();
        assert!(cache.resolve(&[]).is_empty());
        assert_eq!(cache.recomputes(), 1);
    }
}
