//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)

use std::collections::HashMap;

use docrag_core::types::SearchCandidate;

/// Fuses ranked candidate lists into one list, best first.
///
/// Ranks are 1-based. Scores are divided by the best possible fused score
/// (`lists.len() / (k + 1)`) so they stay in `[0, 1]`. An empty list still
/// counts: a candidate only one retriever found never scores above
/// `1 / lists.len()`. Metadata comes from the first list that returned the id;
/// ties keep first-seen order.
pub fn fuse(lists: &[Vec<SearchCandidate>], k: u32) -> Vec<SearchCandidate> {
    if lists.iter().all(Vec::is_empty) {
        return Vec::new();
    }
    let k = f64::from(k);
    let mut order: Vec<SearchCandidate> = Vec::new();
    let mut scores: Vec<f64> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for (rank, candidate) in list.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let rrf = 1.0 / (k + (rank + 1) as f64);
            match position.get(&candidate.id) {
                Some(&i) => scores[i] += rrf,
                None => {
                    position.insert(candidate.id.clone(), order.len());
                    order.push(candidate.clone());
                    scores.push(rrf);
                }
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let best = lists.len() as f64 / (k + 1.0);
    let mut fused: Vec<SearchCandidate> = order
        .into_iter()
        .zip(scores)
        .map(|(mut c, s)| {
            #[allow(clippy::cast_possible_truncation)]
            let normalized = (s / best) as f32;
            c.score = normalized;
            c
        })
        .collect();
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::types::Meta;

    fn list(ids: &[&str]) -> Vec<SearchCandidate> { ids.iter().map(|id| SearchCandidate::new(*id, 0.0, Meta::new())).collect() }

    #[test]
    fn items_in_both_lists_rank_first() {
        let fused = fuse(&[list(&["a", "b", "c"]), list(&["c", "d"])], 60);
        assert_eq!(fused[0].id, "c");
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert!(fused.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    }

    #[test]
    fn top_of_every_list_scores_one() {
        let fused = fuse(&[list(&["a"]), list(&["a"])], 60);
        assert!((fused[0].score - 1.0).abs() < 1e-6);
        assert!(fuse(&[Vec::new(), Vec::new()], 60).is_empty());
    }

    #[test]
    fn a_missing_list_caps_scores() {
        let fused = fuse(&[list(&["weak", "weaker"]), Vec::new()], 60);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - 0.5).abs() < 1e-6);
        assert!(fused[1].score < fused[0].score);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let fused = fuse(&[list(&["x"]), list(&["y"])], 60);
        let ids: Vec<&str> = fused.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }
}
