use std::cell::RefCell;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char as nchar, multispace0};
use nom::combinator::{map, opt};
use nom::multi::{many0, many1};
use nom::number::complete::double;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::geo::{GeoFilter, GeoUnit};
use crate::index::numeric::NumericFilter;
use crate::query::ast::{QueryAst, QueryNode, QueryNodeKind};
use crate::schema::{FieldType, Schema};

/// How juxtaposed terms combine when no operator is written between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOperator {
    Or,
    And,
}

/// Query-language parser. Produces the typed tree the evaluator consumes.
///
/// Supported syntax: bare terms, `"exact phrase"`, `(...)` grouping, `|`
/// union, `-` negation, `~` optional, `term*` prefix, `%term%` fuzzy (one
/// `%` pair per allowed edit), `*` match-all, `@field:expr` masking,
/// `@tags:{a | b}`, `@num:[10 20]` (with `(` for exclusive bounds and
/// `inf`/`-inf`), `@geo:[lon lat radius unit]`, and `=> {$attr: v; ...}`
/// attribute blocks.
pub struct QueryParser {
    pub default_operator: DefaultOperator,
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser {
            default_operator: DefaultOperator::Or,
        }
    }
}

impl QueryParser {
    pub fn new(default_operator: DefaultOperator) -> Self {
        QueryParser { default_operator }
    }

    pub fn parse(&self, schema: &Schema, input: &str) -> Result<QueryAst> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            let kind = if trimmed == "*" {
                QueryNodeKind::Wildcard
            } else {
                QueryNodeKind::Null
            };
            return Ok(QueryAst::new(QueryNode::new(kind), input));
        }
        let ctx = ParseCtx {
            schema,
            op: self.default_operator,
            err: RefCell::new(None),
        };
        let outcome = ctx.expr(trimmed);
        if let Some(err) = ctx.err.into_inner() {
            return Err(err);
        }
        match outcome {
            Ok((rest, node)) if rest.trim().is_empty() => Ok(QueryAst::new(node, input)),
            Ok((rest, _)) => Err(Error::new(
                ErrorKind::Syntax,
                format!("unexpected trailing input `{}`", rest.trim()),
            )),
            Err(_) => Err(Error::new(
                ErrorKind::Syntax,
                format!("could not parse query `{input}`"),
            )),
        }
    }
}

fn is_term_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn term_text(i: &str) -> IResult<&str, &str> {
    take_while1(is_term_char).parse(i)
}

struct ParseCtx<'a> {
    schema: &'a Schema,
    op: DefaultOperator,
    err: RefCell<Option<Error>>,
}

impl<'a> ParseCtx<'a> {
    fn expr<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, first) = self.seq(i)?;
        let (i, rest) = many0(preceded(
            preceded(multispace0, nchar('|')),
            |i| self.seq(i),
        ))
        .parse(i)?;
        if rest.is_empty() {
            return Ok((i, first));
        }
        let mut children = vec![first];
        children.extend(rest);
        Ok((i, QueryNode::union(children)))
    }

    fn seq<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, atoms) = many1(preceded(multispace0, |i| self.atom(i))).parse(i)?;
        if atoms.len() == 1 {
            let mut atoms = atoms;
            return Ok((i, atoms.pop().unwrap()));
        }
        let node = match self.op {
            DefaultOperator::Or => QueryNode::union(atoms),
            DefaultOperator::And => QueryNode::phrase(false, atoms),
        };
        Ok((i, node))
    }

    fn atom<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, mut node) = alt((
            |i| self.negation(i),
            |i| self.optional(i),
            |i| self.field_atom(i),
            |i| self.quoted_phrase(i),
            |i| self.parens(i),
            |i| self.fuzzy(i),
            map(nchar('*'), |_| QueryNode::new(QueryNodeKind::Wildcard)),
            |i| self.term_or_prefix(i),
        ))
        .parse(i)?;

        let (i, attrs) = opt(|i| self.attr_block(i)).parse(i)?;
        if let Some(attrs) = attrs {
            if let Err(e) = node.apply_attributes(&attrs) {
                self.err.replace(Some(e));
            }
        }
        Ok((i, node))
    }

    fn negation<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, child) = preceded(nchar('-'), |i| self.atom(i)).parse(i)?;
        let mut node = QueryNode::new(QueryNodeKind::Not);
        node.children.push(child);
        Ok((i, node))
    }

    fn optional<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, child) = preceded(nchar('~'), |i| self.atom(i)).parse(i)?;
        let mut node = QueryNode::new(QueryNodeKind::Optional);
        node.children.push(child);
        Ok((i, node))
    }

    fn parens<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        delimited(
            nchar('('),
            |i| self.expr(i),
            preceded(multispace0, nchar(')')),
        )
        .parse(i)
    }

    fn quoted_phrase<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, body) = delimited(nchar('"'), take_while1(|c| c != '"'), nchar('"')).parse(i)?;
        let tokens: Vec<QueryNode> = body
            .split_whitespace()
            .map(|t| QueryNode::token(&t.to_lowercase()))
            .collect();
        let node = if tokens.is_empty() {
            QueryNode::new(QueryNodeKind::Null)
        } else {
            QueryNode::phrase(true, tokens)
        };
        Ok((i, node))
    }

    fn fuzzy<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, opens) = many1(nchar('%')).parse(i)?;
        let (i, term) = term_text(i)?;
        let (i, closes) = many1(nchar('%')).parse(i)?;
        if opens.len() != closes.len() || opens.len() > 3 {
            return Err(nom::Err::Error(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Verify,
            )));
        }
        Ok((
            i,
            QueryNode::new(QueryNodeKind::Fuzzy {
                term: term.to_lowercase(),
                max_dist: opens.len() as u8,
            }),
        ))
    }

    fn term_or_prefix<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, term) = term_text(i)?;
        let (i, star) = opt(nchar('*')).parse(i)?;
        let node = if star.is_some() {
            QueryNode::new(QueryNodeKind::Prefix {
                prefix: term.to_lowercase(),
            })
        } else {
            QueryNode::token(&term.to_lowercase())
        };
        Ok((i, node))
    }

    fn field_atom<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, field) = preceded(nchar('@'), term_text).parse(i)?;
        let (i, _) = nchar(':').parse(i)?;

        if i.starts_with('{') {
            return self.tag_body(i, field);
        }
        if i.starts_with('[') {
            return self.bracket(i, field);
        }
        let (i, mut node) = self.atom(i)?;
        // An unknown or non-text field masks the subtree to nothing, which
        // the evaluator turns into an empty iterator.
        let mask = self.schema.text_field_mask(field).unwrap_or(0);
        node.set_field_mask(mask);
        Ok((i, node))
    }

    fn tag_body<'i>(&self, i: &'i str, field: &str) -> IResult<&'i str, QueryNode> {
        let (i, elems) = delimited(
            nchar('{'),
            many1(preceded(
                opt(preceded(multispace0, nchar('|'))),
                |i| self.tag_elem(i),
            )),
            preceded(multispace0, nchar('}')),
        )
        .parse(i)?;
        let mut node = QueryNode::new(QueryNodeKind::Tag {
            field: field.to_string(),
        });
        for elem in elems {
            node.add_child(elem);
        }
        Ok((i, node))
    }

    fn tag_elem<'i>(&self, i: &'i str) -> IResult<&'i str, QueryNode> {
        let (i, words) = many1(preceded(multispace0, |i| {
            let (i, w) = term_text(i)?;
            let (i, star) = opt(nchar('*')).parse(i)?;
            let node = if star.is_some() {
                QueryNode::new(QueryNodeKind::Prefix {
                    prefix: w.to_lowercase(),
                })
            } else {
                QueryNode::token(&w.to_lowercase())
            };
            Ok((i, node))
        }))
        .parse(i)?;
        if words.len() == 1 {
            let mut words = words;
            return Ok((i, words.pop().unwrap()));
        }
        Ok((i, QueryNode::phrase(false, words)))
    }

    fn bracket<'i>(&self, i: &'i str, field: &str) -> IResult<&'i str, QueryNode> {
        let is_geo = self
            .schema
            .field(field)
            .is_some_and(|f| f.field_type == FieldType::Geo);
        if is_geo {
            let (i, (lon, lat, radius, unit)) = delimited(
                nchar('['),
                |i| geo_args(i),
                preceded(multispace0, nchar(']')),
            )
            .parse(i)?;
            return Ok((
                i,
                QueryNode::new(QueryNodeKind::Geo {
                    filter: GeoFilter {
                        field: field.to_string(),
                        lon,
                        lat,
                        radius,
                        unit,
                    },
                }),
            ));
        }
        let (i, (min, incl_min)) = preceded(nchar('['), |i| bound(i)).parse(i)?;
        let (i, (max, incl_max)) = preceded(multispace0, |i| bound(i)).parse(i)?;
        let (i, _) = preceded(multispace0, nchar(']')).parse(i)?;
        Ok((
            i,
            QueryNode::new(QueryNodeKind::Numeric {
                filter: NumericFilter {
                    min,
                    max,
                    inclusive_min: incl_min,
                    inclusive_max: incl_max,
                    field: field.to_string(),
                },
            }),
        ))
    }

    fn attr_block<'i>(&self, i: &'i str) -> IResult<&'i str, Vec<(String, String)>> {
        let (i, _) = preceded(multispace0, tag("=>")).parse(i)?;
        let (i, attrs) = delimited(
            preceded(multispace0, nchar('{')),
            many1(|i| attr(i)),
            preceded(multispace0, nchar('}')),
        )
        .parse(i)?;
        Ok((i, attrs))
    }
}

fn bound(i: &str) -> IResult<&str, (f64, bool)> {
    let (i, _) = multispace0.parse(i)?;
    let (i, exclusive) = opt(nchar('(')).parse(i)?;
    let (i, _) = multispace0.parse(i)?;
    let (i, value) = double.parse(i)?;
    Ok((i, (value, exclusive.is_none())))
}

fn geo_args(i: &str) -> IResult<&str, (f64, f64, f64, GeoUnit)> {
    let (i, lon) = preceded(multispace0, double).parse(i)?;
    let (i, lat) = preceded(multispace0, double).parse(i)?;
    let (i, radius) = preceded(multispace0, double).parse(i)?;
    let (i, unit) = preceded(multispace0, take_while1(|c: char| c.is_alphabetic())).parse(i)?;
    let unit = GeoUnit::from_str(unit).map_err(|_| {
        nom::Err::Error(nom::error::Error::new(i, nom::error::ErrorKind::Verify))
    })?;
    Ok((i, (lon, lat, radius, unit)))
}

fn attr(i: &str) -> IResult<&str, (String, String)> {
    let (i, name) = preceded(preceded(multispace0, nchar('$')), term_text).parse(i)?;
    let (i, _) = preceded(multispace0, nchar(':')).parse(i)?;
    let (i, value) = preceded(multispace0, take_while1(|c| c != ';' && c != '}')).parse(i)?;
    let (i, _) = opt(preceded(multispace0, nchar(';'))).parse(i)?;
    Ok((i, (name.to_string(), value.trim().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FIELD_MASK_ALL;

    fn schema() -> Schema {
        Schema::new()
            .add_text_field("title", false)
            .add_text_field("body", false)
            .add_numeric_field("price", true)
            .add_tag_field("tags", ',')
            .add_geo_field("loc")
    }

    #[test]
    fn test_default_or_operator() {
        let ast = QueryParser::default().parse(&schema(), "hello world").unwrap();
        assert!(matches!(ast.root.kind, QueryNodeKind::Union));
        assert_eq!(ast.root.children.len(), 2);
        assert_eq!(ast.num_tokens(), 2);
    }

    #[test]
    fn test_and_operator_builds_phrase() {
        let parser = QueryParser::new(DefaultOperator::And);
        let ast = parser.parse(&schema(), "hello world").unwrap();
        assert!(matches!(ast.root.kind, QueryNodeKind::Phrase { exact: false }));
    }

    #[test]
    fn test_field_masked_group() {
        let parser = QueryParser::new(DefaultOperator::And);
        let ast = parser
            .parse(&schema(), "@title:(hello|goodbye) world")
            .unwrap();
        assert!(matches!(ast.root.kind, QueryNodeKind::Phrase { exact: false }));
        let group = &ast.root.children[0];
        assert!(matches!(group.kind, QueryNodeKind::Union));
        assert_eq!(group.opts.field_mask, 1);
        assert_eq!(group.children[0].opts.field_mask, 1);
        assert_eq!(ast.root.children[1].opts.field_mask, FIELD_MASK_ALL);
    }

    #[test]
    fn test_exact_phrase() {
        let ast = QueryParser::default().parse(&schema(), "\"Hello World\"").unwrap();
        assert!(matches!(ast.root.kind, QueryNodeKind::Phrase { exact: true }));
        assert!(matches!(
            &ast.root.children[0].kind,
            QueryNodeKind::Token { term, .. } if term == "hello"
        ));
    }

    #[test]
    fn test_tag_syntax() {
        let ast = QueryParser::default().parse(&schema(), "@tags:{a | b}").unwrap();
        assert!(matches!(&ast.root.kind, QueryNodeKind::Tag { field } if field == "tags"));
        assert_eq!(ast.root.children.len(), 2);

        let ast = QueryParser::default().parse(&schema(), "@tags:{a b}").unwrap();
        assert_eq!(ast.root.children.len(), 1);
        assert!(matches!(
            ast.root.children[0].kind,
            QueryNodeKind::Phrase { .. }
        ));
    }

    #[test]
    fn test_numeric_bracket() {
        let ast = QueryParser::default()
            .parse(&schema(), "@price:[(10 20]")
            .unwrap();
        match &ast.root.kind {
            QueryNodeKind::Numeric { filter } => {
                assert_eq!(filter.min, 10.0);
                assert!(!filter.inclusive_min);
                assert_eq!(filter.max, 20.0);
                assert!(filter.inclusive_max);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_geo_bracket() {
        let ast = QueryParser::default()
            .parse(&schema(), "@loc:[2.35 48.85 10 km]")
            .unwrap();
        match &ast.root.kind {
            QueryNodeKind::Geo { filter } => {
                assert_eq!(filter.radius, 10.0);
                assert_eq!(filter.unit, GeoUnit::Kilometers);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_prefix_fuzzy_not_optional_wildcard() {
        let parser = QueryParser::default();
        let s = schema();
        assert!(matches!(
            parser.parse(&s, "hel*").unwrap().root.kind,
            QueryNodeKind::Prefix { .. }
        ));
        match parser.parse(&s, "%%helo%%").unwrap().root.kind {
            QueryNodeKind::Fuzzy { max_dist, .. } => assert_eq!(max_dist, 2),
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            parser.parse(&s, "-goodbye").unwrap().root.kind,
            QueryNodeKind::Not
        ));
        assert!(matches!(
            parser.parse(&s, "~maybe").unwrap().root.kind,
            QueryNodeKind::Optional
        ));
        assert!(matches!(
            parser.parse(&s, "*").unwrap().root.kind,
            QueryNodeKind::Wildcard
        ));
        assert!(matches!(
            parser.parse(&s, "").unwrap().root.kind,
            QueryNodeKind::Null
        ));
    }

    #[test]
    fn test_attribute_block() {
        let parser = QueryParser::new(DefaultOperator::And);
        let ast = parser
            .parse(&schema(), "(hello world) => {$slop: 1; $inorder: true}")
            .unwrap();
        assert_eq!(ast.root.opts.max_slop, 1);
        assert!(ast.root.opts.in_order);
    }

    #[test]
    fn test_bad_attribute_errors() {
        let parser = QueryParser::default();
        let err = parser
            .parse(&schema(), "hello => {$bogus: 1}")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoOption);
        let err = parser.parse(&schema(), "hello => {$slop: x}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_trailing_garbage_is_syntax_error() {
        let err = QueryParser::default().parse(&schema(), "hello )").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }
}
