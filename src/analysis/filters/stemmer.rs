use rust_stemmers::{Algorithm, Stemmer};
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct StemmerFilter {
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter {
            stemmer: Stemmer::create(algorithm),
        }
    }
}

impl TokenFilter for StemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut token| {
                let stemmed = self.stemmer.stem(&token.text);
                if stemmed != token.text {
                    token.raw = Some(token.text.clone());
                    token.text = stemmed.to_string();
                }
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "stemmer"
    }
}
