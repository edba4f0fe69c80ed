//! WordPiece tokenization for BERT question answering models.
//!
use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Result};

/// Words longer than this are mapped to the unknown token.
const MAX_CHARS_PER_WORD: usize = 100;

/// A vocabulary id together with the byte range of the text it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub id: i64,
    pub start: usize,
    pub end: usize,
}

/// Ids of the special tokens used to frame a question/context pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: i64,
    pub sep: i64,
    pub pad: i64,
    pub unk: i64,
}

pub struct WordPieceTokenizer {
    vocab: HashMap<String, i64>,
    special: SpecialTokens,
    lower_case: bool,
}

impl WordPieceTokenizer {
    /// Load a `vocab.txt` with one token per line, the line number being its id.
    pub fn from_vocab_file(path: impl AsRef<Path>, lower_case: bool) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_tokens(content.lines(), lower_case)
    }

    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>, lower_case: bool) -> Result<Self> {
        let vocab: HashMap<String, i64> = tokens
            .into_iter()
            .enumerate()
            .map(|(id, token)| (token.trim_end().to_owned(), id as i64))
            .collect();

        let lookup = |token: &str| {
            vocab
                .get(token)
                .copied()
                .ok_or_else(|| anyhow!("vocabulary has no {} token", token))
        };
        let special = SpecialTokens {
            cls: lookup("[CLS]")?,
            sep: lookup("[SEP]")?,
            pad: lookup("[PAD]")?,
            unk: lookup("[UNK]")?,
        };

        Ok(Self {
            vocab,
            special,
            lower_case,
        })
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    /// Split `text` into vocabulary tokens, keeping byte offsets into `text`.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        split_words(text)
            .into_iter()
            .flat_map(|(start, end)| self.word_pieces(&text[start..end], start))
            .collect()
    }

    /// Greedy longest-match-first split of one word.
    fn word_pieces(&self, word: &str, offset: usize) -> Vec<Token> {
        let normalized = if self.lower_case {
            word.to_lowercase()
        } else {
            word.to_owned()
        };
        let whole_word = Token {
            id: self.special.unk,
            start: offset,
            end: offset + word.len(),
        };

        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() > MAX_CHARS_PER_WORD {
            return vec![whole_word];
        }
        // Offsets of pieces can only be mapped back when normalization kept the char count
        let original_offsets: Option<Vec<usize>> = (word.chars().count() == chars.len()).then(|| {
            word.char_indices()
                .map(|(i, _)| offset + i)
                .chain(std::iter::once(offset + word.len()))
                .collect()
        });

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found = None;
            while start < end {
                let mut candidate: String = chars[start..end].iter().collect();
                if start > 0 {
                    candidate.insert_str(0, "##");
                }
                if let Some(id) = self.vocab.get(&candidate) {
                    found = Some(*id);
                    break;
                }
                end -= 1;
            }

            let Some(id) = found else {
                return vec![whole_word];
            };
            let (piece_start, piece_end) = match &original_offsets {
                Some(offsets) => (offsets[start], offsets[end]),
                None => (whole_word.start, whole_word.end),
            };
            pieces.push(Token {
                id,
                start: piece_start,
                end: piece_end,
            });
            start = end;
        }

        pieces
    }
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace() && !c.is_control())
}

/// Byte ranges of whitespace separated words, with punctuation split off.
fn split_words(text: &str) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut word_start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() || c.is_control() || is_punctuation(c) {
            if let Some(start) = word_start.take() {
                words.push((start, i));
            }
            if is_punctuation(c) {
                words.push((i, i + c.len_utf8()));
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        words.push((start, text.len()));
    }

    words
}
