use super::{Environment, Script, ScriptParser};
use crate::{
    error::{BehaviorError, BtResult},
    Value,
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{all_consuming, map, not, opt, recognize, value},
    multi::{many0, separated_list1},
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use std::rc::Rc;

/// The built-in expression language.
///
/// A script is a `;`-separated list of statements. A statement is either an
/// assignment (`x = expr`, `x := expr`, `x += expr`, ...) or an expression with
/// C-like operators, including `cond ? a : b`. Identifiers resolve to enums
/// first, then to blackboard entries. The value of the last statement is the
/// value of the script.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionParser;

impl ScriptParser for ExpressionParser {
    fn parse(&self, source: &str) -> BtResult<Rc<dyn Script>> {
        match program(source) {
            Ok((_, statements)) => Ok(Rc::new(Program {
                source: source.to_owned(),
                statements,
            })),
            Err(e) => Err(BehaviorError::script(source, format!("parse error: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(String, Option<BinOp>, Box<Expr>),
}

type ParseResult<'src> = IResult<&'src str, Expr>;

fn ws<'src, O>(
    inner: impl FnMut(&'src str) -> IResult<&'src str, O>,
) -> impl FnMut(&'src str) -> IResult<&'src str, O> {
    delimited(multispace0, inner, multispace0)
}

fn identifier(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        pair(opt(char('@')), alt((alpha1, tag("_")))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(i)
}

fn number(i: &str) -> ParseResult {
    let (rest, text) = recognize_float(i)?;
    let literal = if text.contains(['.', 'e', 'E']) {
        text.parse().map(Value::Float).ok()
    } else {
        text.parse().map(Value::Int).ok()
    };
    match literal {
        Some(literal) => Ok((rest, Expr::Literal(literal))),
        None => Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn string(i: &str) -> ParseResult {
    let single = delimited(char('\''), take_while(|c: char| c != '\''), char('\''));
    let double = delimited(char('"'), take_while(|c: char| c != '"'), char('"'));
    map(alt((single, double)), |s: &str| {
        Expr::Literal(Value::String(s.to_owned()))
    })(i)
}

fn name_or_keyword(i: &str) -> ParseResult {
    map(identifier, |name| match name {
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        _ => Expr::Var(name.to_owned()),
    })(i)
}

fn primary(i: &str) -> ParseResult {
    ws(alt((
        delimited(char('('), expr, char(')')),
        number,
        string,
        name_or_keyword,
    )))(i)
}

fn unary(i: &str) -> ParseResult {
    alt((
        map(preceded(ws(char('!')), unary), |e| Expr::Not(Box::new(e))),
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        primary,
    ))(i)
}

/// Parses a left-associative chain `operand (op operand)*`.
fn left_assoc<'src>(
    i: &'src str,
    mut operand: impl FnMut(&'src str) -> ParseResult<'src>,
    mut operator: impl FnMut(&'src str) -> IResult<&'src str, BinOp>,
) -> ParseResult<'src> {
    let (mut i, mut lhs) = operand(i)?;
    loop {
        let (rest, op) = match operator(i) {
            Ok(res) => res,
            Err(nom::Err::Error(_)) => return Ok((i, lhs)),
            Err(e) => return Err(e),
        };
        let (rest, rhs) = operand(rest)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        i = rest;
    }
}

fn multiplicative(i: &str) -> ParseResult {
    left_assoc(
        i,
        unary,
        ws(alt((
            value(BinOp::Mul, terminated(char('*'), not(char('=')))),
            value(BinOp::Div, terminated(char('/'), not(char('=')))),
            value(BinOp::Rem, char('%')),
        ))),
    )
}

fn additive(i: &str) -> ParseResult {
    left_assoc(
        i,
        multiplicative,
        ws(alt((
            value(BinOp::Add, terminated(char('+'), not(char('=')))),
            value(BinOp::Sub, terminated(char('-'), not(char('=')))),
        ))),
    )
}

fn comparison(i: &str) -> ParseResult {
    left_assoc(
        i,
        additive,
        ws(alt((
            value(BinOp::Le, tag("<=")),
            value(BinOp::Ge, tag(">=")),
            value(BinOp::Lt, char('<')),
            value(BinOp::Gt, char('>')),
        ))),
    )
}

fn equality(i: &str) -> ParseResult {
    left_assoc(
        i,
        comparison,
        ws(alt((value(BinOp::Eq, tag("==")), value(BinOp::Ne, tag("!="))))),
    )
}

fn logical_and(i: &str) -> ParseResult {
    let (i, first) = equality(i)?;
    let (i, rest) = many0(preceded(ws(tag("&&")), equality))(i)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::And(Box::new(lhs), Box::new(rhs)));
    Ok((i, expr))
}

fn logical_or(i: &str) -> ParseResult {
    let (i, first) = logical_and(i)?;
    let (i, rest) = many0(preceded(ws(tag("||")), logical_and))(i)?;
    let expr = rest
        .into_iter()
        .fold(first, |lhs, rhs| Expr::Or(Box::new(lhs), Box::new(rhs)));
    Ok((i, expr))
}

fn expr(i: &str) -> ParseResult {
    let (i, cond) = logical_or(i)?;
    let (i, branches) = opt(tuple((ws(char('?')), expr, ws(char(':')), expr)))(i)?;
    Ok(match branches {
        Some((_, then, _, otherwise)) => (
            i,
            Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)),
        ),
        None => (i, cond),
    })
}

fn assign_op(i: &str) -> IResult<&str, Option<BinOp>> {
    alt((
        value(None, tag(":=")),
        value(Some(BinOp::Add), tag("+=")),
        value(Some(BinOp::Sub), tag("-=")),
        value(Some(BinOp::Mul), tag("*=")),
        value(Some(BinOp::Div), tag("/=")),
        value(None, terminated(char('='), not(char('=')))),
    ))(i)
}

fn assignment(i: &str) -> ParseResult {
    map(
        tuple((ws(identifier), ws(assign_op), expr)),
        |(name, op, rhs)| Expr::Assign(name.to_owned(), op, Box::new(rhs)),
    )(i)
}

fn statement(i: &str) -> ParseResult {
    alt((assignment, expr))(i)
}

fn program(i: &str) -> IResult<&str, Vec<Expr>> {
    all_consuming(terminated(
        separated_list1(ws(char(';')), statement),
        opt(ws(char(';'))),
    ))(i)
}

struct Program {
    source: String,
    statements: Vec<Expr>,
}

impl Script for Program {
    fn evaluate(&self, env: &Environment) -> BtResult<Value> {
        let mut last = Value::Bool(false);
        for statement in &self.statements {
            last = self.eval(env, statement)?;
        }
        Ok(last)
    }
}

impl Program {
    fn error(&self, message: impl Into<String>) -> BehaviorError {
        BehaviorError::script(&self.source, message)
    }

    fn eval(&self, env: &Environment, expr: &Expr) -> BtResult<Value> {
        Ok(match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Var(name) => self.lookup(env, name)?,
            Expr::Not(operand) => Value::Bool(!self.eval(env, operand)?.is_truthy()),
            Expr::Neg(operand) => match self.eval(env, operand)? {
                Value::Int(i) => Value::Int(-i),
                Value::Float(f) => Value::Float(-f),
                other => return Err(self.error(format!("can't negate a {}", other.type_name()))),
            },
            Expr::And(lhs, rhs) => {
                Value::Bool(self.eval(env, lhs)?.is_truthy() && self.eval(env, rhs)?.is_truthy())
            }
            Expr::Or(lhs, rhs) => {
                Value::Bool(self.eval(env, lhs)?.is_truthy() || self.eval(env, rhs)?.is_truthy())
            }
            Expr::Conditional(cond, then, otherwise) => {
                if self.eval(env, cond)?.is_truthy() {
                    self.eval(env, then)?
                } else {
                    self.eval(env, otherwise)?
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(env, lhs)?;
                let rhs = self.eval(env, rhs)?;
                self.binary(*op, &lhs, &rhs)?
            }
            Expr::Assign(name, op, rhs) => {
                if env.enums.contains_key(name) {
                    return Err(self.error(format!("can't assign to the enum {name}")));
                }
                let rhs = self.eval(env, rhs)?;
                let value = match op {
                    Some(op) => self.binary(*op, &self.lookup(env, name)?, &rhs)?,
                    None => rhs,
                };
                env.blackboard.set(name, value.clone())?;
                value
            }
        })
    }

    fn lookup(&self, env: &Environment, name: &str) -> BtResult<Value> {
        if let Some(value) = env.enums.get(name) {
            return Ok(Value::Int(*value));
        }
        env.blackboard
            .get(name)
            .ok_or_else(|| self.error(format!("variable [{name}] not found")))
    }

    fn binary(&self, op: BinOp, lhs: &Value, rhs: &Value) -> BtResult<Value> {
        use BinOp::*;
        let type_error = || {
            self.error(format!(
                "can't apply {op:?} to {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ))
        };
        Ok(match op {
            Eq => Value::Bool(lhs == rhs),
            Ne => Value::Bool(lhs != rhs),
            Lt | Le | Gt | Ge => {
                let ordering = match (lhs, rhs) {
                    (Value::String(l), Value::String(r)) => l.partial_cmp(r),
                    _ if lhs.is_number() && rhs.is_number() => {
                        lhs.as_f64().partial_cmp(&rhs.as_f64())
                    }
                    _ => return Err(type_error()),
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false));
                };
                Value::Bool(match op {
                    Lt => ordering.is_lt(),
                    Le => ordering.is_le(),
                    Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            Add if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) => {
                Value::String(format!("{lhs}{rhs}"))
            }
            _ => match (lhs, rhs) {
                (Value::Int(l), Value::Int(r)) => match op {
                    Add => Value::Int(l.wrapping_add(*r)),
                    Sub => Value::Int(l.wrapping_sub(*r)),
                    Mul => Value::Int(l.wrapping_mul(*r)),
                    Div | Rem if *r == 0 => return Err(self.error("division by zero")),
                    Div if l.wrapping_rem(*r) == 0 => Value::Int(l.wrapping_div(*r)),
                    Div => Value::Float(*l as f64 / *r as f64),
                    _ => Value::Int(l.wrapping_rem(*r)),
                },
                _ if lhs.is_number() && rhs.is_number() => {
                    let (l, r) = (
                        lhs.as_f64().ok_or_else(type_error)?,
                        rhs.as_f64().ok_or_else(type_error)?,
                    );
                    match op {
                        Add => Value::Float(l + r),
                        Sub => Value::Float(l - r),
                        Mul => Value::Float(l * r),
                        Div if r == 0. => return Err(self.error("division by zero")),
                        Div => Value::Float(l / r),
                        _ => Value::Float(l % r),
                    }
                }
                _ => return Err(type_error()),
            },
        })
    }
}

#[cfg(test)]
pub(super) fn parse_expr(source: &str) -> Option<String> {
    program(source).ok().map(|(_, statements)| format!("{statements:?}"))
}
