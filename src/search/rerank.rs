//! Second-stage reordering of planner candidates by pairwise relevance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::models::SearchCandidate;
use crate::embedder::identifier_tokens;
use crate::error::Result;

/// Scores how well each passage answers the query. Higher is better.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Offline BM25 over identifier-aware tokens, with the candidate set as the
/// corpus.
#[derive(Debug, Clone)]
pub struct LexicalScorer {
    k1: f32,
    b: f32,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl RelevanceScorer for LexicalScorer {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let query_terms: HashSet<String> = identifier_tokens(query).into_iter().collect();
        if passages.is_empty() || query_terms.is_empty() {
            return Ok(vec![0.0; passages.len()]);
        }

        let docs: Vec<HashMap<String, usize>> = passages
            .iter()
            .map(|p| {
                let mut tf = HashMap::new();
                for token in identifier_tokens(p) {
                    *tf.entry(token).or_insert(0) += 1;
                }
                tf
            })
            .collect();
        let lengths: Vec<f32> = docs.iter().map(|d| d.values().sum::<usize>() as f32).collect();
        let avg_len = (lengths.iter().sum::<f32>() / docs.len() as f32).max(1.0);
        let n = docs.len() as f32;

        let idf: HashMap<&str, f32> = query_terms
            .iter()
            .map(|term| {
                let df = docs.iter().filter(|d| d.contains_key(term)).count() as f32;
                (term.as_str(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        Ok(docs
            .iter()
            .zip(&lengths)
            .map(|(tf, &len)| {
                idf.iter()
                    .map(|(term, idf)| {
                        let f = tf.get(*term).copied().unwrap_or(0) as f32;
                        let norm = self.k1 * (1.0 - self.b + self.b * len / avg_len);
                        idf * f * (self.k1 + 1.0) / (f + norm)
                    })
                    .sum()
            })
            .collect())
    }
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Reorder `candidates` by relevance to `query` and keep the best
    /// `final_k`. Equal scores keep their similarity order. If scoring
    /// fails, the similarity order is kept.
    pub fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<SearchCandidate>,
        final_k: usize,
    ) -> Vec<SearchCandidate> {
        if candidates.is_empty() || final_k == 0 {
            candidates.truncate(final_k);
            return candidates;
        }

        let passages: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        match self.scorer.score(query, &passages) {
            Ok(scores) if scores.len() == candidates.len() => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.rerank_score = Some(score);
                }
                // sort_by is stable.
                candidates.sort_by(|a, b| {
                    let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
                    let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
                    b.total_cmp(&a)
                });
                debug!("reranked {} candidates", candidates.len());
            }
            Ok(scores) => warn!(
                "scorer returned {} scores for {} candidates, keeping similarity order",
                scores.len(),
                candidates.len()
            ),
            Err(e) => warn!("reranking failed, keeping similarity order: {e}"),
        }

        candidates.truncate(final_k);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::search::planner::tests::candidate;

    struct Fixed(Vec<f32>);

    impl RelevanceScorer for Fixed {
        fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl RelevanceScorer for Broken {
        fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            Err(Error::InvalidQuery("scorer offline".into()))
        }
    }

    fn ids(candidates: &[SearchCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    fn pool() -> Vec<SearchCandidate> {
        (0..4).map(|i| candidate(i, 20, 1.0 - i as f32 / 10.0)).collect()
    }

    #[test]
    fn test_reorders_by_score_and_truncates() {
        let reranker = Reranker::new(Arc::new(Fixed(vec![0.1, 0.9, 0.5, 0.7])));

        let got = reranker.rerank("q", pool(), 3);

        assert_eq!(ids(&got), vec!["demo:f.py#1", "demo:f.py#3", "demo:f.py#2"]);
        assert_eq!(got[0].rerank_score, Some(0.9));
    }

    #[test]
    fn test_ties_keep_similarity_order() {
        let reranker = Reranker::new(Arc::new(Fixed(vec![0.5, 0.5, 0.9, 0.5])));

        let got = reranker.rerank("q", pool(), 4);

        assert_eq!(
            ids(&got),
            vec!["demo:f.py#2", "demo:f.py#0", "demo:f.py#1", "demo:f.py#3"]
        );
    }

    #[test]
    fn test_scorer_failure_keeps_similarity_order() {
        let got = Reranker::new(Arc::new(Broken)).rerank("q", pool(), 2);
        assert_eq!(ids(&got), vec!["demo:f.py#0", "demo:f.py#1"]);
        assert!(got.iter().all(|c| c.rerank_score.is_none()));

        let got = Reranker::new(Arc::new(Fixed(vec![1.0]))).rerank("q", pool(), 2);
        assert_eq!(ids(&got), vec!["demo:f.py#0", "demo:f.py#1"]);
    }

    #[test]
    fn test_lexical_prefers_matching_identifiers() {
        let mut candidates = pool();
        candidates[0].content = "fn render_navbar(ctx: &Ctx) {}".to_string();
        candidates[1].content = "fn load_config(path: &Path) -> Config { parse(path) }".to_string();
        candidates[2].content = "struct Widget;".to_string();
        candidates[3].content = "// nothing here".to_string();

        let got = Reranker::new(Arc::new(LexicalScorer::default())).rerank(
            "where is the config loaded",
            candidates,
            2,
        );

        assert_eq!(got[0].chunk_id, "demo:f.py#1");
        assert!(got[0].rerank_score.unwrap() > 0.0);
    }

    #[test]
    fn test_lexical_empty_query_scores_zero() {
        let scores = LexicalScorer::default().score("?!", &["a", "b"]).unwrap();
        assert_eq!(scores, vec![0.0, 0.0]);
    }
}
