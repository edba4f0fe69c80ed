//! Answer span selection from start/end logits.
//!
use std::ops::Range;

/// Inclusive token positions of an answer and its probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Pick the span within `window` that maximizes `start + end` logits.
///
/// Spans must not end before they start and are at most `max_len` tokens
/// long. The score is the product of the start and end probabilities, with
/// the softmax taken over `window` only.
pub fn best_span(
    start_logits: &[f32],
    end_logits: &[f32],
    window: Range<usize>,
    max_len: usize,
) -> Option<Span> {
    let window = window.start..window.end.min(start_logits.len()).min(end_logits.len());
    if window.is_empty() || max_len == 0 {
        return None;
    }

    let start_probs = softmax(&start_logits[window.clone()]);
    let end_probs = softmax(&end_logits[window.clone()]);

    let mut best: Option<(f32, usize, usize)> = None;
    for start in window.clone() {
        for end in start..window.end.min(start + max_len) {
            let logit = start_logits[start] + end_logits[end];
            if best.map_or(true, |(best_logit, _, _)| logit > best_logit) {
                best = Some((logit, start, end));
            }
        }
    }

    best.map(|(_, start, end)| Span {
        start,
        end,
        score: start_probs[start - window.start] * end_probs[end - window.start],
    })
}
