use rust_stemmers::Stemmer;
use crate::analysis::analyzer::stemmer_algorithm;
use crate::core::types::Language;
use crate::query::ast::{PhoneticPref, QueryNode, QueryNodeKind};
use crate::schema::Schema;

/// Pluggable query-term expander. Returns the extra terms a token should
/// union with (never the token itself).
pub trait QueryExpander: Send + Sync {
    fn name(&self) -> &str;
    fn expand(&self, term: &str, language: Language) -> Vec<String>;
}

/// The default expander: unions each token with its language stem, which is
/// the form the index-time analyzer stores.
pub struct StemmerExpander;

impl QueryExpander for StemmerExpander {
    fn name(&self) -> &str {
        "stemmer"
    }

    fn expand(&self, term: &str, language: Language) -> Vec<String> {
        let Some(alg) = stemmer_algorithm(language) else {
            return Vec::new();
        };
        let stem = Stemmer::create(alg).stem(term).to_string();
        if stem != term {
            vec![stem]
        } else {
            Vec::new()
        }
    }
}

/// Should the phonetic expander fire for this node: an explicit per-node
/// ask wins; otherwise it fires only when some masked field is declared
/// phonetic.
pub fn phonetic_applies(node: &QueryNode, schema: &Schema) -> bool {
    match node.opts.phonetic {
        PhoneticPref::Enabled => true,
        PhoneticPref::Disabled => false,
        PhoneticPref::Default => schema
            .fields
            .iter()
            .any(|f| f.phonetic && f.mask_bit() & node.opts.field_mask != 0),
    }
}

/// Walk the tree, expanding token nodes and the children of unions and
/// inexact phrases. Verbatim subtrees are left alone.
pub fn expand_query(
    node: &mut QueryNode,
    expander: &dyn QueryExpander,
    phonetic: Option<&dyn QueryExpander>,
    schema: &Schema,
    language: Language,
) {
    if node.opts.verbatim {
        return;
    }
    match &node.kind {
        QueryNodeKind::Token { term, expanded } => {
            if *expanded {
                return;
            }
            let term = term.clone();
            let mut variants = expander.expand(&term, language);
            if let Some(ph) = phonetic {
                if phonetic_applies(node, schema) {
                    variants.extend(ph.expand(&term, language));
                }
            }
            variants.retain(|v| *v != term);
            variants.dedup();
            if variants.is_empty() {
                return;
            }

            let opts = node.opts.clone();
            let mut children = Vec::with_capacity(variants.len() + 1);
            let mut original = QueryNode::token(&term);
            original.opts = opts.clone();
            children.push(original);
            for v in variants {
                let mut vn = QueryNode::new(QueryNodeKind::Token {
                    term: v,
                    expanded: true,
                });
                vn.opts = opts.clone();
                children.push(vn);
            }
            let mut union = QueryNode::union(children);
            union.opts = opts;
            *node = union;
        }
        QueryNodeKind::Union => {
            for child in &mut node.children {
                expand_query(child, expander, phonetic, schema, language);
            }
        }
        QueryNodeKind::Phrase { exact } if !*exact => {
            for child in &mut node.children {
                expand_query(child, expander, phonetic, schema, language);
            }
        }
        _ => {}
    }
}
