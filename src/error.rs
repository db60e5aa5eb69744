//! Constructors for first-class error values. Errors are ordinary
//! `Value`s carrying a category and a message; nothing is thrown.

use std::fmt::Display;

use crate::value::Value;

pub fn parse<D: Display>(message: D) -> Value {
    Value::make_error("parse", message.to_string())
}

pub fn symbol<D: Display>(name: D) -> Value {
    Value::make_error("symbol", name.to_string())
}

pub fn arg<D: Display>(name: D) -> Value {
    Value::make_error("arg", name.to_string())
}

pub fn call<D: Display>(message: D) -> Value {
    Value::make_error("call", message.to_string())
}

pub fn math<D: Display>(message: D) -> Value {
    Value::make_error("math", message.to_string())
}

pub fn no_function() -> Value {
    Value::make_error("eval", "no function")
}
