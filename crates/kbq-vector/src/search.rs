use std::cmp::Ordering;

use kbq_core::traits::Retriever;
use kbq_core::types::ScoredChunk;
use kbq_core::{Error, Result};

use crate::VectorIndex;

pub fn l2_norm(v: &[f32]) -> f32 { v.iter().map(|x| x * x).sum::<f32>().sqrt() }

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

impl Retriever for VectorIndex {
    fn len(&self) -> usize { self.chunks.len() }

    fn retrieve(&self, query_vec: &[f32], breadth: usize) -> Result<Vec<ScoredChunk>> {
        if breadth == 0 || self.chunks.is_empty() { return Ok(Vec::new()); }
        if query_vec.len() != self.dim {
            return Err(Error::Retrieval(format!(
                "query has {} dimensions, index has {}",
                query_vec.len(),
                self.dim
            )));
        }
        if query_vec.iter().any(|x| !x.is_finite()) {
            return Err(Error::Retrieval("query embedding contains non-finite values".to_string()));
        }
        let q_norm = l2_norm(query_vec);
        if q_norm == 0.0 {
            return Err(Error::Retrieval("query embedding has zero norm".to_string()));
        }

        // Cosine similarity; a zero-norm chunk scores 0.
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(pos, (chunk, &norm))| {
                let s = if norm == 0.0 { 0.0 } else { dot(query_vec, &chunk.embedding) / (q_norm * norm) };
                (pos, if s.is_finite() { s } else { 0.0 })
            })
            .collect();
        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) { Ordering::Equal => a.0.cmp(&b.0), o => o });
        scored.truncate(breadth);

        Ok(scored.into_iter().map(|(pos, score)| ScoredChunk { chunk: self.chunks[pos].clone(), score }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbq_core::types::Chunk;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk { id: id.to_string(), text: format!("text {id}"), embedding, metadata: Default::default() }
    }

    #[test]
    fn ranks_by_cosine_descending() {
        let index = VectorIndex::from_chunks(vec![
            chunk("a", vec![0.0, 1.0]),
            chunk("b", vec![1.0, 0.0]),
            chunk("c", vec![1.0, 1.0]),
        ])
        .expect("index");
        let hits = index.retrieve(&[2.0, 0.0], 3).expect("retrieve");
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::from_chunks(vec![
            chunk("z", vec![1.0, 0.0]),
            chunk("y", vec![2.0, 0.0]),
            chunk("x", vec![0.5, 0.0]),
        ])
        .expect("index");
        let hits = index.retrieve(&[1.0, 0.0], 2).expect("retrieve");
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, ["z", "y"]);
    }

    #[test]
    fn rejects_dimension_mismatch_and_zero_query() {
        let index = VectorIndex::from_chunks(vec![chunk("a", vec![1.0, 0.0])]).expect("index");
        assert!(matches!(index.retrieve(&[1.0, 0.0, 0.0], 1), Err(Error::Retrieval(_))));
        assert!(matches!(index.retrieve(&[0.0, 0.0], 1), Err(Error::Retrieval(_))));
    }

    #[test]
    fn empty_index_and_zero_breadth_return_nothing() {
        let empty = VectorIndex::from_chunks(Vec::new()).expect("index");
        assert!(empty.retrieve(&[1.0], 5).expect("retrieve").is_empty());
        let index = VectorIndex::from_chunks(vec![chunk("a", vec![1.0])]).expect("index");
        assert!(index.retrieve(&[1.0], 0).expect("retrieve").is_empty());
    }
}
