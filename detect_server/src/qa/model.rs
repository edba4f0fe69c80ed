//! Extractive question answering with a BERT model.
//!
use std::path::Path;

use anyhow::{bail, Result};
use ndarray::Array2;
use tract_onnx::prelude::*;

use super::{
    span::best_span,
    tokenizer::{Token, WordPieceTokenizer},
    Answer, QaModel,
};
use crate::nn::NnModel;

/// Model inputs of one question/context pair, padded to a fixed length.
#[derive(Clone, Debug, PartialEq)]
pub struct Encoding {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    /// Position of the first context token.
    pub context_offset: usize,
    /// Context tokens that fit into the sequence.
    pub context_tokens: Vec<Token>,
}

/// Lay out `[CLS] question [SEP] context [SEP]` and pad to `max_seq_len`.
///
/// Context tokens that do not fit are cut off.
pub fn encode_pair(
    tokenizer: &WordPieceTokenizer,
    question: &str,
    context: &str,
    max_seq_len: usize,
) -> Result<Encoding> {
    let special = tokenizer.special_tokens();
    let question_tokens = tokenizer.tokenize(question);
    let mut context_tokens = tokenizer.tokenize(context);

    let budget = max_seq_len.saturating_sub(question_tokens.len() + 3);
    if budget == 0 {
        bail!(
            "question of {} tokens leaves no room for context in {} tokens",
            question_tokens.len(),
            max_seq_len
        );
    }
    if context_tokens.len() > budget {
        log::debug!("Truncating context from {} to {} tokens", context_tokens.len(), budget);
        context_tokens.truncate(budget);
    }

    let mut input_ids = Vec::with_capacity(max_seq_len);
    input_ids.push(special.cls);
    input_ids.extend(question_tokens.iter().map(|t| t.id));
    input_ids.push(special.sep);
    let context_offset = input_ids.len();
    input_ids.extend(context_tokens.iter().map(|t| t.id));
    input_ids.push(special.sep);

    let used = input_ids.len();
    let mut attention_mask = vec![1; used];
    let mut token_type_ids = vec![0; context_offset];
    token_type_ids.resize(used, 1);

    input_ids.resize(max_seq_len, special.pad);
    attention_mask.resize(max_seq_len, 0);
    token_type_ids.resize(max_seq_len, 0);

    Ok(Encoding {
        input_ids,
        attention_mask,
        token_type_ids,
        context_offset,
        context_tokens,
    })
}

/// BERT exported to ONNX with inputs `input_ids`, `attention_mask`,
/// `token_type_ids` and outputs `start_logits`, `end_logits`.
pub struct BertQaModel {
    model: NnModel,
    tokenizer: WordPieceTokenizer,
    max_seq_len: usize,
    max_answer_len: usize,
}

impl BertQaModel {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer: WordPieceTokenizer,
        max_seq_len: usize,
        max_answer_len: usize,
    ) -> Result<Self> {
        let fact = InferenceFact::dt_shape(i64::datum_type(), tvec!(1, max_seq_len));
        let model = tract_onnx::onnx()
            .model_for_path(model_path.as_ref())?
            .with_input_fact(0, fact.clone())?
            .with_input_fact(1, fact.clone())?
            .with_input_fact(2, fact)?
            .into_optimized()?
            .into_runnable()?;
        log::info!(
            "Loaded question answering model {} with sequence length {}",
            model_path.as_ref().display(),
            max_seq_len
        );

        Ok(Self {
            model,
            tokenizer,
            max_seq_len,
            max_answer_len,
        })
    }
}

fn as_input(values: Vec<i64>) -> Result<TValue> {
    let len = values.len();
    let tensor: Tensor = Array2::from_shape_vec((1, len), values)?.into();
    Ok(tensor.into())
}

impl QaModel for BertQaModel {
    fn predict(&self, question: &str, context: &str) -> Result<Answer> {
        let encoding = encode_pair(&self.tokenizer, question, context, self.max_seq_len)?;
        let Encoding {
            input_ids,
            attention_mask,
            token_type_ids,
            context_offset,
            context_tokens,
        } = encoding;

        let outputs = self.model.run(tvec!(
            as_input(input_ids)?,
            as_input(attention_mask)?,
            as_input(token_type_ids)?,
        ))?;
        if outputs.len() < 2 {
            bail!("model returned {} outputs, expected start and end logits", outputs.len());
        }
        let start_logits: Vec<f32> = outputs[0].to_array_view::<f32>()?.iter().cloned().collect();
        let end_logits: Vec<f32> = outputs[1].to_array_view::<f32>()?.iter().cloned().collect();

        Ok(extract_answer(
            context,
            &context_tokens,
            context_offset,
            &start_logits,
            &end_logits,
            self.max_answer_len,
        ))
    }
}

/// Cut the best scoring span out of `context`.
///
/// The logits cover the whole sequence, `context_tokens` start at
/// `context_offset` within it and carry byte offsets into `context`.
pub fn extract_answer(
    context: &str,
    context_tokens: &[Token],
    context_offset: usize,
    start_logits: &[f32],
    end_logits: &[f32],
    max_answer_len: usize,
) -> Answer {
    let window = context_offset..context_offset + context_tokens.len();
    let Some(span) = best_span(start_logits, end_logits, window, max_answer_len) else {
        return Answer::default();
    };

    let first = context_tokens[span.start - context_offset];
    let last = context_tokens[span.end - context_offset];
    Answer {
        text: context.get(first.start..last.end).unwrap_or_default().to_owned(),
        score: span.score,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokenizer() -> WordPieceTokenizer {
        let vocab = [
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "who", "won", "?", "denver", "broncos", "did",
        ];
        WordPieceTokenizer::from_tokens(vocab, true).expect("vocab")
    }

    #[test]
    fn test_pair_layout() -> Result<()> {
        let encoding = encode_pair(&tokenizer(), "Who won?", "Denver Broncos did", 10)?;

        assert_eq!(encoding.input_ids, vec![2, 4, 5, 6, 3, 7, 8, 9, 3, 0]);
        assert_eq!(encoding.attention_mask, vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 0]);
        assert_eq!(encoding.token_type_ids, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 0]);
        assert_eq!(encoding.context_offset, 5);
        assert_eq!(encoding.context_tokens.len(), 3);

        Ok(())
    }

    #[test]
    fn test_context_is_truncated() -> Result<()> {
        let encoding = encode_pair(&tokenizer(), "Who won?", "Denver Broncos did", 8)?;

        assert_eq!(encoding.input_ids, vec![2, 4, 5, 6, 3, 7, 8, 3]);
        assert_eq!(encoding.context_tokens.len(), 2);

        Ok(())
    }

    /// Logits of `len` positions peaking at `start` and `end`.
    fn peaked_logits(len: usize, start: usize, end: usize) -> (Vec<f32>, Vec<f32>) {
        let mut start_logits = vec![0.0; len];
        let mut end_logits = vec![0.0; len];
        start_logits[start] = 8.0;
        end_logits[end] = 8.0;
        (start_logits, end_logits)
    }

    #[test]
    fn test_answer_keeps_original_text() -> Result<()> {
        let vocab = [
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "wo", "?", "das", "café", "liegt", "in", "münchen", ".",
        ];
        let tokenizer = WordPieceTokenizer::from_tokens(vocab, true)?;
        let context = "Das Café liegt in München.";
        let encoding = encode_pair(&tokenizer, "Wo?", context, 16)?;
        assert_eq!(encoding.context_offset, 4);

        // "München" is the fifth context token
        let (start_logits, end_logits) = peaked_logits(16, 8, 8);
        let answer = extract_answer(
            context,
            &encoding.context_tokens,
            encoding.context_offset,
            &start_logits,
            &end_logits,
            30,
        );
        assert_eq!(answer.text, "München");
        assert!(answer.score > 0.5);

        let (start_logits, end_logits) = peaked_logits(16, 5, 6);
        let answer = extract_answer(
            context,
            &encoding.context_tokens,
            encoding.context_offset,
            &start_logits,
            &end_logits,
            30,
        );
        assert_eq!(answer.text, "Café liegt");

        Ok(())
    }

    #[test]
    fn test_no_context_gives_empty_answer() {
        let (start_logits, end_logits) = peaked_logits(8, 2, 2);
        let answer = extract_answer("", &[], 4, &start_logits, &end_logits, 30);

        assert_eq!(answer, Answer::default());
    }

    #[test]
    fn test_question_too_long() {
        assert!(encode_pair(&tokenizer(), "Who won?", "Denver", 6).is_err());
    }
}
