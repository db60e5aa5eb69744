//! A minimal Lisp interpreter: one line of S-expression text is parsed
//! into a `Value` tree and evaluated against a dynamically scoped
//! environment. Failures are first-class error values, never panics.

pub mod core;
pub mod env;
pub mod error;
pub mod eval;
pub mod reader;
pub mod value;

pub use crate::{env::Env, eval::eval, reader::parse_line, value::Value};
