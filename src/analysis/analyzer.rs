use rust_stemmers::Algorithm;
use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::types::Language;

/// Text analysis pipeline
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

impl Analyzer {
    pub fn new(name: String, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
            name,
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        tokens
    }

    /// The index-time analyzer: lowercase + language stemming. Stems replace
    /// the surface form so the query-time expander lands on the same terms.
    pub fn for_language(language: Language) -> Self {
        let base = Analyzer::new(
            format!("standard_{:?}", language).to_lowercase(),
            Box::new(StandardTokenizer::default()),
        )
        .add_filter(Box::new(LowercaseFilter));
        match stemmer_algorithm(language) {
            Some(alg) => base.add_filter(Box::new(StemmerFilter::new(alg))),
            None => base,
        }
    }

    /// Variant used by fields flagged NoStem.
    pub fn verbatim() -> Self {
        Analyzer::new("verbatim".to_string(), Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter))
    }

    pub fn with_stopwords(self, words: Vec<String>) -> Self {
        self.add_filter(Box::new(StopWordFilter::new(words)))
    }
}

pub fn stemmer_algorithm(language: Language) -> Option<Algorithm> {
    match language {
        Language::English => Some(Algorithm::English),
        Language::French => Some(Algorithm::French),
        Language::German => Some(Algorithm::German),
        Language::Spanish => Some(Algorithm::Spanish),
        Language::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stemming_analyzer() {
        let analyzer = Analyzer::for_language(Language::English);
        let tokens = analyzer.analyze("Running runners ran");
        assert_eq!(tokens[0].text, "run");
        assert_eq!(tokens[0].raw.as_deref(), Some("running"));
        assert_eq!(tokens[1].text, "runner");
    }

    #[test]
    fn test_verbatim_analyzer() {
        let analyzer = Analyzer::verbatim();
        let tokens = analyzer.analyze("Running");
        assert_eq!(tokens[0].text, "running");
        assert!(tokens[0].raw.is_none());
    }

    #[test]
    fn test_stopword_analyzer() {
        let analyzer =
            Analyzer::verbatim().with_stopwords(vec!["the".to_string(), "a".to_string()]);
        let tokens = analyzer.analyze("the quick fox");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "quick");
        // Dropped stopword leaves a position gap.
        assert_eq!(tokens[0].position, 1);
    }
}
