use parking_lot::Mutex;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char as nchar, multispace0};
use nom::combinator::{map, opt};
use nom::multi::{many0, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use crate::core::error::{Error, ErrorKind, Result};
use crate::pipeline::processor::{resolve_value, SearchResult};
use crate::value::lookup::Lookup;
use crate::value::Value;

/// Expression tree for APPLY and FILTER steps.
#[derive(Debug, Clone)]
pub enum ExprAst {
    Literal(Value),
    /// `@name` - a row property.
    Property(String),
    Op(Box<ExprAst>, BinOp, Box<ExprAst>),
    Not(Box<ExprAst>),
    Func(String, Vec<ExprAst>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Parse an expression string. Failures surface as Expression errors.
pub fn parse_expr(input: &str) -> Result<ExprAst> {
    match expr(input.trim()) {
        Ok((rest, ast)) if rest.trim().is_empty() => Ok(ast),
        _ => Err(Error::new(
            ErrorKind::Expression,
            format!("could not parse expression `{input}`"),
        )),
    }
}

fn ident(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(i)
}

fn expr(i: &str) -> IResult<&str, ExprAst> {
    let (i, first) = and_expr(i)?;
    let (i, rest) = many0(preceded(preceded(multispace0, tag("||")), and_expr)).parse(i)?;
    Ok((i, fold_ops(first, rest, BinOp::Or)))
}

fn and_expr(i: &str) -> IResult<&str, ExprAst> {
    let (i, first) = cmp_expr(i)?;
    let (i, rest) = many0(preceded(preceded(multispace0, tag("&&")), cmp_expr)).parse(i)?;
    Ok((i, fold_ops(first, rest, BinOp::And)))
}

fn cmp_op(i: &str) -> IResult<&str, BinOp> {
    preceded(
        multispace0,
        alt((
            map(tag("=="), |_| BinOp::Eq),
            map(tag("!="), |_| BinOp::Ne),
            map(tag("<="), |_| BinOp::Le),
            map(tag(">="), |_| BinOp::Ge),
            map(tag("<"), |_| BinOp::Lt),
            map(tag(">"), |_| BinOp::Gt),
        )),
    )
    .parse(i)
}

fn cmp_expr(i: &str) -> IResult<&str, ExprAst> {
    let (i, first) = add_expr(i)?;
    let (i, rest) = opt((cmp_op, add_expr)).parse(i)?;
    match rest {
        Some((op, rhs)) => Ok((i, ExprAst::Op(Box::new(first), op, Box::new(rhs)))),
        None => Ok((i, first)),
    }
}

fn add_op(i: &str) -> IResult<&str, BinOp> {
    preceded(
        multispace0,
        alt((map(nchar('+'), |_| BinOp::Add), map(nchar('-'), |_| BinOp::Sub))),
    )
    .parse(i)
}

fn add_expr(i: &str) -> IResult<&str, ExprAst> {
    let (i, first) = mul_expr(i)?;
    let (i, rest) = many0((add_op, mul_expr)).parse(i)?;
    Ok((i, fold_pairs(first, rest)))
}

fn mul_op(i: &str) -> IResult<&str, BinOp> {
    preceded(
        multispace0,
        alt((
            map(nchar('*'), |_| BinOp::Mul),
            map(nchar('/'), |_| BinOp::Div),
            map(nchar('%'), |_| BinOp::Mod),
        )),
    )
    .parse(i)
}

fn mul_expr(i: &str) -> IResult<&str, ExprAst> {
    let (i, first) = unary(i)?;
    let (i, rest) = many0((mul_op, unary)).parse(i)?;
    Ok((i, fold_pairs(first, rest)))
}

fn fold_ops(first: ExprAst, rest: Vec<ExprAst>, op: BinOp) -> ExprAst {
    rest.into_iter()
        .fold(first, |acc, rhs| ExprAst::Op(Box::new(acc), op, Box::new(rhs)))
}

fn fold_pairs(first: ExprAst, rest: Vec<(BinOp, ExprAst)>) -> ExprAst {
    rest.into_iter()
        .fold(first, |acc, (op, rhs)| ExprAst::Op(Box::new(acc), op, Box::new(rhs)))
}

fn unary(i: &str) -> IResult<&str, ExprAst> {
    let (i, _) = multispace0.parse(i)?;
    alt((
        map(preceded(nchar('!'), unary), |e| ExprAst::Not(Box::new(e))),
        primary,
    ))
    .parse(i)
}

fn primary(i: &str) -> IResult<&str, ExprAst> {
    let (i, _) = multispace0.parse(i)?;
    alt((
        delimited(nchar('('), expr, preceded(multispace0, nchar(')'))),
        map(preceded(nchar('@'), ident), |p| {
            ExprAst::Property(p.to_string())
        }),
        string_literal,
        func_call,
        map(double, |n| ExprAst::Literal(Value::Number(n))),
    ))
    .parse(i)
}

fn string_literal(i: &str) -> IResult<&str, ExprAst> {
    let single = delimited(nchar('\''), take_while1(|c| c != '\''), nchar('\''));
    let double_q = delimited(nchar('"'), take_while1(|c| c != '"'), nchar('"'));
    map(alt((single, double_q)), |s: &str| {
        ExprAst::Literal(Value::String(s.to_string()))
    })
    .parse(i)
}

fn func_call(i: &str) -> IResult<&str, ExprAst> {
    let (i, name) = ident(i)?;
    let (i, args) = delimited(
        preceded(multispace0, nchar('(')),
        separated_list0(preceded(multispace0, nchar(',')), expr),
        preceded(multispace0, nchar(')')),
    )
    .parse(i)?;
    Ok((i, ExprAst::Func(name.to_lowercase(), args)))
}

/// Evaluate against one row. Type mismatches and unknown functions raise
/// Expression errors; the caller decides whether that drops the row.
pub fn eval_expr(
    ast: &ExprAst,
    res: &SearchResult,
    lookup: &Mutex<Lookup>,
) -> Result<Value> {
    match ast {
        ExprAst::Literal(v) => Ok(v.clone()),
        ExprAst::Property(name) => {
            let key = lookup.lock().get(name);
            Ok(key.and_then(|k| resolve_value(res, &k)).unwrap_or(Value::Null))
        }
        ExprAst::Not(inner) => {
            let v = eval_expr(inner, res, lookup)?;
            Ok(Value::Number(if v.truthy() { 0.0 } else { 1.0 }))
        }
        ExprAst::Op(lhs, op, rhs) => {
            let a = eval_expr(lhs, res, lookup)?;
            let b = eval_expr(rhs, res, lookup)?;
            eval_op(&a, *op, &b)
        }
        ExprAst::Func(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval_expr(a, res, lookup)?);
            }
            eval_func(name, &values)
        }
    }
}

fn numeric(v: &Value) -> Result<f64> {
    v.as_number()
        .ok_or_else(|| Error::new(ErrorKind::Expression, format!("`{v}` is not a number")))
}

fn eval_op(a: &Value, op: BinOp, b: &Value) -> Result<Value> {
    let bool_value = |b: bool| Value::Number(if b { 1.0 } else { 0.0 });
    let v = match op {
        BinOp::Add => Value::Number(numeric(a)? + numeric(b)?),
        BinOp::Sub => Value::Number(numeric(a)? - numeric(b)?),
        BinOp::Mul => Value::Number(numeric(a)? * numeric(b)?),
        BinOp::Div => Value::Number(numeric(a)? / numeric(b)?),
        BinOp::Mod => Value::Number(numeric(a)? % numeric(b)?),
        BinOp::And => bool_value(a.truthy() && b.truthy()),
        BinOp::Or => bool_value(a.truthy() || b.truthy()),
        BinOp::Eq => bool_value(a == b),
        BinOp::Ne => bool_value(a != b),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = a
                .compare(b)
                .map_err(|e| Error::new(ErrorKind::Expression, e.context))?;
            bool_value(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            })
        }
    };
    Ok(v)
}

fn eval_func(name: &str, args: &[Value]) -> Result<Value> {
    let arg = |i: usize| -> Result<&Value> {
        args.get(i).ok_or_else(|| {
            Error::new(
                ErrorKind::Expression,
                format!("missing argument {i} for {name}()"),
            )
        })
    };
    match name {
        "upper" => Ok(Value::String(arg(0)?.to_string().to_uppercase())),
        "lower" => Ok(Value::String(arg(0)?.to_string().to_lowercase())),
        "substr" => {
            let s = arg(0)?.to_string();
            let start = numeric(arg(1)?)?.max(0.0) as usize;
            let len = numeric(arg(2)?)?.max(0.0) as usize;
            Ok(Value::String(s.chars().skip(start).take(len).collect()))
        }
        "format" => {
            let fmt = arg(0)?.to_string();
            let mut out = String::with_capacity(fmt.len());
            let mut next_arg = 1;
            let mut chars = fmt.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '%' {
                    match chars.next() {
                        Some('s') => {
                            out.push_str(&arg(next_arg)?.to_string());
                            next_arg += 1;
                        }
                        Some('%') => out.push('%'),
                        Some(other) => {
                            return Err(Error::new(
                                ErrorKind::Expression,
                                format!("unknown format directive %{other}"),
                            ));
                        }
                        None => break,
                    }
                } else {
                    out.push(c);
                }
            }
            Ok(Value::String(out))
        }
        "abs" => Ok(Value::Number(numeric(arg(0)?)?.abs())),
        "floor" => Ok(Value::Number(numeric(arg(0)?)?.floor())),
        "log" => Ok(Value::Number(numeric(arg(0)?)?.ln())),
        "exists" => Ok(Value::Number(if arg(0)?.is_null() { 0.0 } else { 1.0 })),
        _ => Err(Error::new(
            ErrorKind::Expression,
            format!("unknown function {name}()"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(input: &str, props: &[(&str, Value)]) -> Result<Value> {
        let lookup = Mutex::new(Lookup::new());
        let mut res = SearchResult::new();
        for (name, v) in props {
            let key = lookup.lock().get_or_create(name, 0);
            res.row.set(&key, v.clone());
        }
        eval_expr(&parse_expr(input)?, &res, &lookup)
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_str("1 + 2 * 3", &[]).unwrap(), Value::Number(7.0));
        assert_eq!(eval_str("(1 + 2) * 3", &[]).unwrap(), Value::Number(9.0));
    }

    #[test]
    fn test_properties_and_comparison() {
        let props = [("price", Value::Number(20.0))];
        assert_eq!(
            eval_str("@price >= 15 && @price <= 25", &props).unwrap(),
            Value::Number(1.0)
        );
        assert_eq!(
            eval_str("@price > 25 || @price == 20", &props).unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_string_functions() {
        let props = [("name", Value::String("World".into()))];
        assert_eq!(
            eval_str("upper(@name)", &props).unwrap(),
            Value::String("WORLD".into())
        );
        assert_eq!(
            eval_str("format('hello %s', lower(@name))", &props).unwrap(),
            Value::String("hello world".into())
        );
        assert_eq!(
            eval_str("substr(@name, 1, 3)", &props).unwrap(),
            Value::String("orl".into())
        );
    }

    #[test]
    fn test_missing_property_is_null() {
        assert_eq!(eval_str("exists(@nope)", &[]).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            eval_str("nosuchfn(1)", &[]).unwrap_err().kind,
            ErrorKind::Expression
        );
        assert_eq!(
            eval_str("'a' + 1", &[]).unwrap_err().kind,
            ErrorKind::Expression
        );
        assert_eq!(parse_expr("1 +").unwrap_err().kind, ErrorKind::Expression);
    }
}
