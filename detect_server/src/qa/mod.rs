//! Question answering over a given context.
//!
use anyhow::Result;

pub mod model;
pub mod span;
pub mod tokenizer;

/// `deepset/bert-base-cased-squad2` is trained on cased text.
pub const DEFAULT_LOWER_CASE: bool = false;
pub const DEFAULT_MAX_SEQ_LEN: usize = 384;
pub const DEFAULT_MAX_ANSWER_LEN: usize = 30;

/// Vocabulary of `deepset/bert-base-cased-squad2`.
pub const BERT_SQUAD2_VOCAB_URL: &str =
    "https://huggingface.co/deepset/bert-base-cased-squad2/resolve/main/vocab.txt";

/// Span of the context answering a question.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Answer {
    pub text: String,
    pub score: f32,
}

pub trait QaModel: Send + Sync {
    fn predict(&self, question: &str, context: &str) -> Result<Answer>;
}
