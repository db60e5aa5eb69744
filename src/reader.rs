use lazy_static::lazy_static;
use regex::Regex;

use crate::{error as e, value::Value};

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
    // symbols may not contain parens, quotes, colons or backslashes
    static ref SYMBOL_RE: Regex = Regex::new(r#"^[^()'":\\]+$"#).unwrap();
}

/// Parses exactly one form from one line of text. Anything structurally
/// wrong comes back as a parse error value.
pub fn parse_line(text: &str) -> Value {
    let tokens = tokenize(text);
    match parse_value(&tokens) {
        Some((value, rest)) if rest.is_empty() => value,
        Some((_, rest)) => e::parse(rest.join(" ")),
        None => e::parse("unmatched brackets"),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.replace('(', " ( ")
        .replace(')', " ) ")
        .replace('\'', " ' ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn parse_value<'t>(tokens: &'t [String]) -> Option<(Value, &'t [String])> {
    let (token, rest) = tokens.split_first()?;
    if NUMBER_RE.is_match(token) {
        return Some((Value::Number(token.parse().ok()?), rest));
    }
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        return Some((Value::make_string(&token[1..token.len() - 1]), rest));
    }
    if is_symbol(token) {
        // includes the literal texts `nil` and `t`, which are pre-bound
        // to the singletons and resolve through the environment
        return Some((Value::make_symbol(token.as_str()), rest));
    }
    if token == "'" {
        let (quoted, rest) = parse_value(rest)?;
        let form = Value::cons(Value::make_symbol("quote"), Value::cons(quoted, Value::Nil));
        return Some((form, rest));
    }
    if token == "(" {
        return parse_list(rest);
    }
    None
}

fn parse_list<'t>(mut tokens: &'t [String]) -> Option<(Value, &'t [String])> {
    let mut items = Vec::new();
    loop {
        if tokens.first()? == ")" {
            return Some((items.into_iter().collect(), &tokens[1..]));
        }
        let (value, rest) = parse_value(tokens)?;
        items.push(value);
        tokens = rest;
    }
}

fn is_symbol(token: &str) -> bool {
    token.chars().all(|c| !c.is_control()) && SYMBOL_RE.is_match(token)
}
