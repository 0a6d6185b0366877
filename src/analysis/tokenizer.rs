use unicode_segmentation::UnicodeSegmentation;
use crate::analysis::token::Token;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Standard Unicode tokenizer
#[derive(Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;

        // unicode_words drops the separators, so indices are tracked with
        // the bounds variant to keep byte offsets.
        for (offset, word) in text.unicode_word_indices() {
            if word.len() > self.max_token_length {
                continue;
            }
            tokens.push(Token::new(
                word.to_string(),
                position,
                offset as u32,
                word.len() as u32,
            ));
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_positions() {
        let tokens = StandardTokenizer::default().tokenize("hello,  big world");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "hello");
        assert_eq!(tokens[0].byte_offset, 0);
        assert_eq!(tokens[1].text, "big");
        assert_eq!(tokens[1].position, 1);
        assert_eq!(tokens[2].text, "world");
        assert_eq!(tokens[2].byte_offset, 13);
    }
}
