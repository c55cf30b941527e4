//! Source-diversity reranking.
//!
//! Picks at most `k` candidates from a relevance-ordered pool so that no
//! source contributes more than `quota` of them. Sources take turns: every
//! source's best candidate first, then every source's second-best, then the
//! remaining slots go to the most relevant leftovers whose source is still
//! under quota. A pool with a single source yields at most `quota` results.

use std::collections::HashMap;

use tracing::warn;

use kbq_core::types::Candidate;

pub const DEFAULT_QUOTA: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiversityReranker {
    quota: usize,
}

impl Default for DiversityReranker {
    fn default() -> Self { Self::new(DEFAULT_QUOTA) }
}

impl DiversityReranker {
    /// A quota of 0 is treated as 1.
    pub fn new(quota: usize) -> Self { Self { quota: quota.max(1) } }

    pub fn quota(&self) -> usize { self.quota }

    /// Select up to `k` candidates from `pool`, which must be sorted best first.
    /// Output is in selection order. Never fails: if selection cannot be
    /// completed the unmodified top-`k` prefix is returned.
    pub fn rerank(&self, pool: Vec<Candidate>, k: usize) -> Vec<Candidate> {
        if k == 0 || pool.is_empty() { return Vec::new(); }
        let k = k.min(pool.len());
        let picks = match self.select(&pool, k) {
            Ok(picks) => picks,
            Err(reason) => {
                warn!(reason, pool = pool.len(), k, "diversity selection failed, using relevance order");
                return pool.into_iter().take(k).collect();
            }
        };
        let mut slots: Vec<Option<Candidate>> = pool.into_iter().map(Some).collect();
        picks.into_iter().filter_map(|i| slots.get_mut(i).and_then(Option::take)).collect()
    }

    /// Pool positions to keep, in selection order.
    fn select(&self, pool: &[Candidate], k: usize) -> Result<Vec<usize>, &'static str> {
        // Groups in order of first appearance; members stay relevance-ordered.
        let mut group_of = Vec::with_capacity(pool.len());
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut by_label: HashMap<&str, usize> = HashMap::new();
        for (pos, candidate) in pool.iter().enumerate() {
            let g = *by_label.entry(candidate.source_label.as_str()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(pos);
            group_of.push(g);
        }

        if groups.len() == 1 {
            return Ok(groups[0].iter().copied().take(self.quota.min(k)).collect());
        }

        let mut tally = Tally { picks: Vec::with_capacity(pool.len()), taken: vec![false; pool.len()], counts: vec![0; groups.len()] };

        for members in &groups {
            if tally.picks.len() >= k { break; }
            tally.take(members[0], group_of[members[0]]);
        }
        for members in &groups {
            if tally.picks.len() >= k { break; }
            if let Some(&second) = members.get(1) {
                let g = group_of[second];
                if tally.counts[g] < self.quota { tally.take(second, g); }
            }
        }
        for (pos, &g) in group_of.iter().enumerate() {
            if tally.picks.len() >= k { break; }
            if !tally.taken[pos] && tally.counts[g] < self.quota { tally.take(pos, g); }
        }

        let picks = tally.picks;
        self.check(&picks, &group_of, k)?;
        Ok(picks)
    }

    fn check(&self, picks: &[usize], group_of: &[usize], k: usize) -> Result<(), &'static str> {
        if picks.len() > k { return Err("selected more than k candidates"); }
        let mut seen = vec![false; group_of.len()];
        let mut per_group: HashMap<usize, usize> = HashMap::new();
        for &pos in picks {
            if std::mem::replace(&mut seen[pos], true) { return Err("candidate selected twice"); }
            let n = per_group.entry(group_of[pos]).or_default();
            *n += 1;
            if *n > self.quota { return Err("source quota exceeded"); }
        }
        Ok(())
    }
}

struct Tally {
    picks: Vec<usize>,
    taken: Vec<bool>,
    counts: Vec<usize>,
}

impl Tally {
    fn take(&mut self, pos: usize, group: usize) {
        self.taken[pos] = true;
        self.counts[group] += 1;
        self.picks.push(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbq_core::types::Chunk;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn pool(labels: &[&str]) -> Vec<Candidate> {
        let n = labels.len() as f32;
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| Candidate {
                chunk: Arc::new(Chunk {
                    id: format!("c{i}"),
                    text: String::new(),
                    embedding: Vec::new(),
                    metadata: Default::default(),
                }),
                similarity_score: 1.0 - i as f32 / n,
                source_label: (*label).to_string(),
            })
            .collect()
    }

    fn labels(selected: &[Candidate]) -> Vec<&str> { selected.iter().map(|c| c.source_label.as_str()).collect() }

    fn count(selected: &[Candidate], label: &str) -> usize {
        selected.iter().filter(|c| c.source_label == label).count()
    }

    #[test]
    fn three_sources_share_five_slots() {
        // X leads the pool, Y and Z trail.
        let mut input = vec!["x"; 10];
        input.extend(["y"; 6]);
        input.extend(["z"; 4]);
        let selected = DiversityReranker::default().rerank(pool(&input), 5);
        assert_eq!(selected.len(), 5);
        assert_eq!(count(&selected, "x"), 2);
        assert_eq!(count(&selected, "y"), 2);
        assert_eq!(count(&selected, "z"), 1);
        assert_eq!(labels(&selected), ["x", "y", "z", "x", "y"]);
    }

    #[test]
    fn single_source_is_capped_at_quota() {
        let selected = DiversityReranker::default().rerank(pool(&["x"; 20]), 5);
        let ids: Vec<_> = selected.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1"]);
    }

    #[test]
    fn single_source_respects_small_k() {
        let selected = DiversityReranker::new(3).rerank(pool(&["x"; 4]), 1);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn interleaved_pool_fills_from_relevance_order() {
        let input = ["a", "b", "a", "a", "c", "b", "b", "c"];
        let selected = DiversityReranker::default().rerank(pool(&input), 6);
        let ids: Vec<_> = selected.iter().map(|c| c.chunk.id.as_str()).collect();
        // pass 1: c0 c1 c4, pass 2: c2 c5 c7
        assert_eq!(ids, ["c0", "c1", "c4", "c2", "c5", "c7"]);
    }

    #[test]
    fn no_candidate_is_selected_twice() {
        let input = ["a", "a", "b", "c", "c", "d", "a", "b", "b", "d"];
        for k in 1..=input.len() {
            let selected = DiversityReranker::default().rerank(pool(&input), k);
            let unique: HashSet<_> = selected.iter().map(|c| c.chunk.id.clone()).collect();
            assert_eq!(unique.len(), selected.len(), "k={k}");
        }
    }

    #[test]
    fn quota_of_one_takes_one_per_source() {
        let input = ["a", "a", "b", "b", "c"];
        let selected = DiversityReranker::new(1).rerank(pool(&input), 5);
        assert_eq!(labels(&selected), ["a", "b", "c"]);
    }

    #[test]
    fn short_pool_and_zero_k() {
        let reranker = DiversityReranker::default();
        assert!(reranker.rerank(Vec::new(), 5).is_empty());
        assert!(reranker.rerank(pool(&["a", "b"]), 0).is_empty());
        assert_eq!(reranker.rerank(pool(&["a", "b"]), 5).len(), 2);
    }

    #[test]
    fn oversized_k_is_bounded_by_pool() {
        let reranker = DiversityReranker::default();
        let selected = reranker.rerank(pool(&["a", "b", "a", "b", "a"]), usize::MAX);
        assert_eq!(labels(&selected), ["a", "b", "a", "b"]);
        assert!(reranker.rerank(Vec::new(), usize::MAX).is_empty());
        assert_eq!(reranker.rerank(pool(&["a"; 3]), usize::MAX).len(), 2);
    }
}
