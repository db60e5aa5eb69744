use std::{
    cell::RefCell,
    fmt::{self, Debug, Display},
    iter::FromIterator,
    rc::Rc,
};

use crate::env::Env;

/// Native procedures receive the raw, unevaluated argument chain and
/// decide for themselves which positions to evaluate.
pub type BuiltinFunction = fn(&Value, &Env) -> Value;

pub enum Value {
    Nil,
    True,
    Number(i128),
    String(Rc<String>),
    Symbol(Rc<String>),
    Pair(Rc<Pair>),
    Function(BuiltinFunction),
    Lambda {
        params: Rc<Value>,
        body: Rc<Value>,
    },
    Error {
        category: &'static str,
        message: Rc<String>,
    },
}

/// A cons cell. Both fields are independently mutable in place, which is
/// what `setf` relies on.
pub struct Pair {
    pub car: RefCell<Value>,
    pub cdr: RefCell<Value>,
}

/// Evaluates to the value of `$expr`, returning early if it is an error.
#[macro_export]
macro_rules! try_value {
    ($expr:expr) => {{
        let value = $expr;
        if value.is_error() {
            return value;
        }
        value
    }};
}

impl Value {
    #[inline]
    pub fn cons(car: Value, cdr: Value) -> Self {
        Value::Pair(Rc::new(Pair {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
        }))
    }

    #[inline]
    pub fn make_symbol<I: Into<String>>(s: I) -> Self {
        Value::Symbol(Rc::new(s.into()))
    }

    #[inline]
    pub fn make_string<I: Into<String>>(s: I) -> Self {
        Value::String(Rc::new(s.into()))
    }

    #[inline]
    pub fn make_error<I: Into<String>>(category: &'static str, message: I) -> Self {
        Value::Error {
            category,
            message: Rc::new(message.into()),
        }
    }

    #[inline]
    pub fn make_bool(b: bool) -> Self {
        if b {
            Value::True
        } else {
            Value::Nil
        }
    }

    #[inline]
    pub fn number(&self) -> Option<i128> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn symbol(&self) -> Option<&Rc<String>> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn string(&self) -> Option<&Rc<String>> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn pair(&self) -> Option<&Rc<Pair>> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        match self {
            Value::Error { .. } => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            _ => false,
        }
    }

    /// Iterates over the cars of a pair chain, stopping at the first
    /// non-pair cdr.
    pub fn iter(&self) -> ListIter {
        ListIter(self.clone())
    }

    /// Nth element of a pair chain, unevaluated.
    pub fn nth(&self, n: usize) -> Option<Value> {
        self.iter().nth(n)
    }
}

pub struct ListIter(Value);

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match std::mem::replace(&mut self.0, Value::Nil) {
            Value::Pair(pair) => {
                let car = pair.car.borrow().clone();
                self.0 = pair.cdr.borrow().clone();
                Some(car)
            }
            _ => None,
        }
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let items: Vec<Value> = iter.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, value| Value::cons(value, tail))
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Self::Nil => Self::Nil,
            Self::True => Self::True,
            Self::Number(n) => Self::Number(*n),
            Self::String(s) => Self::String(Rc::clone(s)),
            Self::Symbol(s) => Self::Symbol(Rc::clone(s)),
            Self::Pair(p) => Self::Pair(Rc::clone(p)),
            Self::Function(fp) => Self::Function(*fp),
            Self::Lambda { params, body } => Self::Lambda {
                params: Rc::clone(params),
                body: Rc::clone(body),
            },
            Self::Error { category, message } => Self::Error {
                category,
                message: Rc::clone(message),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::True, Self::True) => true,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Pair(a), Self::Pair(b)) => {
                *a.car.borrow() == *b.car.borrow() && *a.cdr.borrow() == *b.cdr.borrow()
            }
            (
                Self::Error { category, message },
                Self::Error {
                    category: other_category,
                    message: other_message,
                },
            ) => category == other_category && message == other_message,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::True => write!(f, "t"),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Symbol(s) => write!(f, "{}", s),
            Self::Function(_) | Self::Lambda { .. } => write!(f, "lambda"),
            Self::Error { category, message } => write!(f, "{} error: {}", category, message),
            Self::Pair(pair) => {
                write!(f, "({}", pair.car.borrow())?;
                let mut tail = pair.cdr.borrow().clone();
                loop {
                    match tail {
                        Value::Pair(next) => {
                            write!(f, " {}", next.car.borrow())?;
                            let rest = next.cdr.borrow().clone();
                            tail = rest;
                        }
                        Value::Nil => break,
                        other => {
                            write!(f, " . {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod lisp_value {
    use super::*;

    #[test]
    fn print() {
        assert_eq!(Value::Number(123).to_string(), "123".to_string());
        assert_eq!(Value::make_symbol("sym").to_string(), "sym".to_string());
        assert_eq!(Value::Nil.to_string(), "nil".to_string());
        assert_eq!(Value::True.to_string(), "t".to_string());
        assert_eq!(Value::make_string("hi").to_string(), "\"hi\"".to_string());

        let list: Value = vec![Value::Number(123), Value::make_symbol("sym")]
            .into_iter()
            .collect();
        assert_eq!(list.to_string(), "(123 sym)".to_string());

        let nested: Value = vec![Value::Number(1), list.clone()].into_iter().collect();
        assert_eq!(nested.to_string(), "(1 (123 sym))".to_string());
    }

    #[test]
    fn print_dotted() {
        let dotted = Value::cons(Value::Number(1), Value::Number(2));
        assert_eq!(dotted.to_string(), "(1 . 2)".to_string());

        let chain = Value::cons(Value::Number(1), dotted);
        assert_eq!(chain.to_string(), "(1 1 . 2)".to_string());
    }

    #[test]
    fn print_error() {
        let error = Value::make_error("math", "division by zero");
        assert_eq!(
            error.to_string(),
            "math error: division by zero".to_string()
        );
        assert!(error.is_error());
        assert!(!Value::Nil.is_error());
    }

    #[test]
    fn mutate_in_place() {
        let pair = Value::cons(Value::Number(1), Value::Number(2));
        if let Value::Pair(p) = &pair {
            *p.car.borrow_mut() = Value::Number(9);
        }
        assert_eq!(pair.to_string(), "(9 . 2)".to_string());
    }

    #[test]
    fn chain_iteration() {
        let list: Value = (1..=3).map(Value::Number).collect();
        let items: Vec<Value> = list.iter().collect();
        assert_eq!(
            items,
            vec![Value::Number(1), Value::Number(2), Value::Number(3)]
        );
        assert_eq!(list.nth(1), Some(Value::Number(2)));
        assert_eq!(list.nth(3), None);
        assert_eq!(Value::Nil.nth(0), None);
    }
}
