use std::rc::Rc;

use crate::{
    env::{Env, Scope},
    error as e,
    try_value,
    value::{Pair, Value},
};

/// Outcome of evaluating a body sequence: either the value of the last
/// form, or the value carried by a `return` that fired along the way.
pub enum Flow {
    Normal(Value),
    Returned(Value),
}

/// Evaluates one form. Errors come back as ordinary error values; there
/// is no separate special-form dispatch, every pair application hands the
/// procedure its raw argument chain.
pub fn eval(form: &Value, env: &Env) -> Value {
    match form {
        Value::Symbol(name) => env.lookup(name),
        Value::Pair(pair) => apply(pair, env),
        Value::Error { .. } => {
            // the top-level display relies on this echo
            println!("{}", form);
            form.clone()
        }
        other => other.clone(),
    }
}

fn apply(pair: &Rc<Pair>, env: &Env) -> Value {
    let head = pair.car.borrow().clone();
    let procedure = match head {
        Value::Symbol(_) | Value::Pair(_) => try_value!(eval(&head, env)),
        _ => return e::no_function(),
    };

    let args = pair.cdr.borrow().clone();
    if args.is_error() {
        return args;
    }
    match args {
        Value::Nil | Value::Pair(_) => (),
        _ => return e::call("improper argument list"),
    }

    match procedure {
        Value::Function(function) => function(&args, env),
        Value::Lambda { params, body } => apply_lambda(&params, &body, &args, env),
        _ => e::no_function(),
    }
}

/// Calls a defun-made procedure: actuals are evaluated in the caller's
/// environment, then bound to the formals in a fresh frame. Nothing was
/// captured at definition time; the caller's frames stay visible.
pub fn apply_lambda(params: &Value, body: &Value, args: &Value, env: &Env) -> Value {
    let mut actuals = Vec::new();
    for form in args.iter() {
        actuals.push(try_value!(eval(&form, env)));
    }

    let formals: Vec<Value> = params.iter().collect();
    if formals.len() != actuals.len() {
        return e::call(format!(
            "expected {} arguments, got {}",
            formals.len(),
            actuals.len()
        ));
    }

    env.push_frame();
    for (formal, value) in formals.iter().zip(actuals) {
        if let Some(name) = formal.symbol() {
            env.assign(name, value, Scope::Local);
        }
    }
    let result = eval(body, env);
    env.pop_frame();
    result
}

/// Evaluates each form in order, stopping at the first error or at a
/// pending `return`. The value of the last evaluated form is kept.
pub fn eval_body(body: &Value, env: &Env) -> Flow {
    let mut last = Value::Nil;
    for form in body.iter() {
        last = eval(&form, env);
        if last.is_error() {
            return Flow::Normal(last);
        }
        if let Some(value) = env.returned() {
            return Flow::Returned(value);
        }
    }
    Flow::Normal(last)
}

#[cfg(test)]
mod evaluation {
    use super::*;

    fn env() -> Env {
        Env::new().with_core().make()
    }

    #[test]
    fn self_evaluating() {
        let env = env();
        assert_eq!(eval(&Value::Nil, &env), Value::Nil);
        assert_eq!(eval(&Value::True, &env), Value::True);
        assert_eq!(eval(&Value::Number(5), &env), Value::Number(5));
        assert_eq!(eval(&Value::make_string("s"), &env), Value::make_string("s"));
    }

    #[test]
    fn symbols_resolve_through_environment() {
        let env = env();
        assert_eq!(eval(&Value::make_symbol("nil"), &env), Value::Nil);
        assert_eq!(eval(&Value::make_symbol("t"), &env), Value::True);
        assert_eq!(
            eval(&Value::make_symbol("missing"), &env),
            Value::make_error("symbol", "missing")
        );
    }

    #[test]
    fn error_values_evaluate_to_themselves() {
        let env = env();
        let error = Value::make_error("math", "division by zero");
        assert_eq!(eval(&error, &env), error);
    }

    #[test]
    fn head_must_be_callable() {
        let env = env();
        // number in head position
        let form = Value::cons(Value::Number(1), Value::Nil);
        assert_eq!(eval(&form, &env), e::no_function());
        // symbol bound to a non-procedure
        let form = Value::cons(Value::make_symbol("t"), Value::Nil);
        assert_eq!(eval(&form, &env), e::no_function());
    }

    #[test]
    fn unbound_head_propagates() {
        let env = env();
        let form = Value::cons(Value::make_symbol("absent"), Value::Nil);
        assert_eq!(eval(&form, &env), Value::make_error("symbol", "absent"));
    }

    #[test]
    fn dotted_argument_chain_is_a_call_error() {
        let env = env();
        let form = Value::cons(Value::make_symbol("quote"), Value::Number(1));
        match eval(&form, &env) {
            Value::Error { category, .. } => assert_eq!(category, "call"),
            other => panic!("expected call error, got {}", other),
        }
    }
}
