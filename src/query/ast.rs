use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, FieldMask, FIELD_MASK_ALL};
use crate::index::geo::GeoFilter;
use crate::index::numeric::NumericFilter;

/// Per-node phonetic preference. Default defers to the field's flag;
/// Enabled and Disabled override it either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhoneticPref {
    #[default]
    Default,
    Enabled,
    Disabled,
}

/// Modifiers that can apply to any node of the query tree.
#[derive(Debug, Clone)]
pub struct QueryNodeOptions {
    pub field_mask: FieldMask,
    /// Verbatim nodes are never rewritten by expanders.
    pub verbatim: bool,
    pub max_slop: i32,
    pub in_order: bool,
    pub weight: f64,
    pub phonetic: PhoneticPref,
}

impl Default for QueryNodeOptions {
    fn default() -> Self {
        QueryNodeOptions {
            field_mask: FIELD_MASK_ALL,
            verbatim: false,
            max_slop: -1,
            in_order: false,
            weight: 1.0,
            phonetic: PhoneticPref::Default,
        }
    }
}

/// The payload of one query node. Each variant carries only its own data;
/// options and children live on the envelope.
#[derive(Debug, Clone)]
pub enum QueryNodeKind {
    /// Intersection of children; exact phrases force slop 0 and order.
    Phrase { exact: bool },
    Union,
    Token { term: String, expanded: bool },
    Numeric { filter: NumericFilter },
    Not,
    Optional,
    Geo { filter: GeoFilter },
    Prefix { prefix: String },
    Ids { ids: Vec<DocId> },
    Wildcard,
    Tag { field: String },
    Fuzzy { term: String, max_dist: u8 },
    LexRange {
        begin: Option<String>,
        include_begin: bool,
        end: Option<String>,
        include_end: bool,
    },
    Null,
}

#[derive(Debug, Clone)]
pub struct QueryNode {
    pub kind: QueryNodeKind,
    pub opts: QueryNodeOptions,
    pub children: Vec<QueryNode>,
}

impl QueryNode {
    pub fn new(kind: QueryNodeKind) -> Self {
        QueryNode {
            kind,
            opts: QueryNodeOptions::default(),
            children: Vec::new(),
        }
    }

    pub fn token(term: &str) -> Self {
        QueryNode::new(QueryNodeKind::Token {
            term: term.to_string(),
            expanded: false,
        })
    }

    pub fn phrase(exact: bool, children: Vec<QueryNode>) -> Self {
        let mut n = QueryNode::new(QueryNodeKind::Phrase { exact });
        n.children = children;
        n
    }

    pub fn union(children: Vec<QueryNode>) -> Self {
        let mut n = QueryNode::new(QueryNodeKind::Union);
        n.children = children;
        n
    }

    pub fn add_child(&mut self, child: QueryNode) {
        // Tag nodes only accept the variants a tag lookup can resolve.
        if matches!(self.kind, QueryNodeKind::Tag { .. }) {
            let ok = matches!(
                child.kind,
                QueryNodeKind::Token { .. }
                    | QueryNodeKind::Phrase { .. }
                    | QueryNodeKind::Prefix { .. }
                    | QueryNodeKind::LexRange { .. }
            );
            if !ok {
                return;
            }
        }
        self.children.push(child);
    }

    /// Recursive intersect of a field mask, as applied by `@field:(...)`.
    pub fn set_field_mask(&mut self, mask: FieldMask) {
        self.opts.field_mask &= mask;
        for child in &mut self.children {
            child.set_field_mask(mask);
        }
    }

    pub fn apply_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid =
            || Error::new(ErrorKind::Syntax, format!("invalid value `{value}` for `${name}`"));
        match name.to_ascii_lowercase().as_str() {
            "slop" => {
                let n: i64 = value.parse().map_err(|_| invalid())?;
                if n < -1 {
                    return Err(invalid());
                }
                self.opts.max_slop = n as i32;
            }
            "inorder" => {
                self.opts.in_order = parse_bool(value).ok_or_else(invalid)?;
            }
            "weight" => {
                let w: f64 = value.parse().map_err(|_| invalid())?;
                if w < 0.0 {
                    return Err(invalid());
                }
                self.opts.weight = w;
            }
            "phonetic" => {
                self.opts.phonetic = if parse_bool(value).ok_or_else(invalid)? {
                    PhoneticPref::Enabled
                } else {
                    PhoneticPref::Disabled
                };
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::NoOption,
                    format!("invalid attribute ${name}"),
                ));
            }
        }
        Ok(())
    }

    pub fn apply_attributes(&mut self, attrs: &[(String, String)]) -> Result<()> {
        for (name, value) in attrs {
            self.apply_attribute(name, value)?;
        }
        Ok(())
    }

    pub fn num_tokens(&self) -> usize {
        let own = usize::from(matches!(self.kind, QueryNodeKind::Token { .. }));
        own + self.children.iter().map(|c| c.num_tokens()).sum::<usize>()
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// A parsed query. Filters arriving outside the query string (FILTER,
/// GEOFILTER, id allow-lists) are folded into the root here.
#[derive(Debug, Clone)]
pub struct QueryAst {
    pub root: QueryNode,
    pub raw: String,
}

impl QueryAst {
    pub fn new(root: QueryNode, raw: &str) -> Self {
        QueryAst {
            root,
            raw: raw.to_string(),
        }
    }

    pub fn num_tokens(&self) -> usize {
        self.root.num_tokens()
    }

    /// Insert a high-selectivity filter as the leading child of the root
    /// intersection, wrapping the root in a new one if needed.
    fn set_filter_node(&mut self, node: QueryNode) {
        if matches!(self.root.kind, QueryNodeKind::Phrase { .. }) {
            self.root.children.insert(0, node);
        } else {
            let old_root = std::mem::replace(&mut self.root, QueryNode::phrase(false, Vec::new()));
            self.root.children.push(node);
            self.root.children.push(old_root);
        }
    }

    pub fn set_global_numeric_filter(&mut self, filter: NumericFilter) {
        self.set_filter_node(QueryNode::new(QueryNodeKind::Numeric { filter }));
    }

    pub fn set_global_geo_filter(&mut self, filter: GeoFilter) {
        self.set_filter_node(QueryNode::new(QueryNodeKind::Geo { filter }));
    }

    pub fn set_global_id_filter(&mut self, ids: Vec<DocId>) {
        self.set_filter_node(QueryNode::new(QueryNodeKind::Ids { ids }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_mask_intersects_recursively() {
        let mut n = QueryNode::union(vec![QueryNode::token("a"), QueryNode::token("b")]);
        n.children[0].opts.field_mask = 0b110;
        n.set_field_mask(0b010);
        assert_eq!(n.opts.field_mask, 0b010);
        assert_eq!(n.children[0].opts.field_mask, 0b010);
        assert_eq!(n.children[1].opts.field_mask, 0b010);
    }

    #[test]
    fn test_attributes() {
        let mut n = QueryNode::token("x");
        n.apply_attributes(&[
            ("slop".to_string(), "2".to_string()),
            ("inorder".to_string(), "true".to_string()),
            ("weight".to_string(), "0.5".to_string()),
        ])
        .unwrap();
        assert_eq!(n.opts.max_slop, 2);
        assert!(n.opts.in_order);
        assert_eq!(n.opts.weight, 0.5);

        assert_eq!(
            n.apply_attribute("slop", "-3").unwrap_err().kind,
            ErrorKind::Syntax
        );
        assert_eq!(
            n.apply_attribute("bogus", "1").unwrap_err().kind,
            ErrorKind::NoOption
        );
    }

    #[test]
    fn test_global_filter_wraps_non_phrase_root() {
        let mut ast = QueryAst::new(QueryNode::token("x"), "x");
        ast.set_global_numeric_filter(NumericFilter::new("price", 1.0, 2.0));
        assert!(matches!(ast.root.kind, QueryNodeKind::Phrase { exact: false }));
        assert!(matches!(
            ast.root.children[0].kind,
            QueryNodeKind::Numeric { .. }
        ));
        assert_eq!(ast.root.children.len(), 2);
    }

    #[test]
    fn test_global_filter_prepends_to_phrase_root() {
        let mut ast = QueryAst::new(
            QueryNode::phrase(false, vec![QueryNode::token("x"), QueryNode::token("y")]),
            "x y",
        );
        ast.set_global_id_filter(vec![DocId(1)]);
        assert_eq!(ast.root.children.len(), 3);
        assert!(matches!(ast.root.children[0].kind, QueryNodeKind::Ids { .. }));
    }

    #[test]
    fn test_tag_rejects_foreign_children() {
        let mut tag = QueryNode::new(QueryNodeKind::Tag {
            field: "tags".to_string(),
        });
        tag.add_child(QueryNode::new(QueryNodeKind::Wildcard));
        assert!(tag.children.is_empty());
        tag.add_child(QueryNode::token("a"));
        assert_eq!(tag.children.len(), 1);
    }
}
