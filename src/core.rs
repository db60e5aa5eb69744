use std::{
    fmt::Display,
    io::{stdin, stdout, BufRead, Write},
    rc::Rc,
};

use crate::{
    env::{Env, Scope},
    error as e,
    eval::{eval, eval_body, Flow},
    try_value,
    value::{Pair, Value},
};

/// Evaluates the nth raw argument; a missing position is an `arg` error
/// for `name`.
fn eval_arg<D: Display>(args: &Value, n: usize, name: D, env: &Env) -> Value {
    match args.nth(n) {
        Some(form) => eval(&form, env),
        None => e::arg(name),
    }
}

fn number_arg<D: Display>(args: &Value, n: usize, name: D, env: &Env) -> Result<i128, Value> {
    match args.nth(n) {
        Some(form) => {
            let value = eval(&form, env);
            if value.is_error() {
                return Err(value);
            }
            value.number().ok_or_else(|| e::arg(name))
        }
        None => Err(e::arg(name)),
    }
}

pub fn print(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "print", env));
    println!("{}", value);
    value
}

pub fn readline(args: &Value, env: &Env) -> Value {
    if args.nth(0).is_some() {
        let prompt = try_value!(eval_arg(args, 0, "readline", env));
        match prompt.string() {
            Some(text) => {
                print!("{}", text);
                let _ = stdout().flush();
            }
            None => return e::arg("readline"),
        }
    }
    let mut line = String::new();
    match stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => Value::Nil,
        Ok(_) => Value::make_string(line.trim_end_matches('\n')),
    }
}

/// Walks (name expr name expr ...), evaluating each expression and
/// assigning it under `scope`. The last assigned value wins; the first
/// error stops the walk.
fn assign_pairs(args: &Value, scope: Scope, name: &'static str, env: &Env) -> Value {
    let mut rest = args.clone();
    let mut last = Value::Nil;
    loop {
        let pair = match rest {
            Value::Nil => return last,
            Value::Pair(ref p) => Rc::clone(p),
            _ => return e::arg(name),
        };
        let target = match pair.car.borrow().symbol() {
            Some(s) => Rc::clone(s),
            None => return e::arg(name),
        };
        let tail = pair.cdr.borrow().clone();
        let value_pair = match tail {
            Value::Pair(ref p) => Rc::clone(p),
            _ => return e::arg(name),
        };
        let expr = value_pair.car.borrow().clone();
        let value = try_value!(eval(&expr, env));
        last = env.assign(&target, value, scope);
        rest = value_pair.cdr.borrow().clone();
    }
}

pub fn setq(args: &Value, env: &Env) -> Value {
    assign_pairs(args, Scope::Upward, "setq", env)
}

enum Field {
    Car,
    Cdr,
}

/// An addressable pair field, produced from a `(car …)`/`(cdr …)`/`(elt …)`
/// form in `setf` target position.
struct Place {
    pair: Rc<Pair>,
    field: Field,
}

impl Place {
    fn set(&self, value: Value) -> Value {
        match self.field {
            Field::Car => *self.pair.car.borrow_mut() = value.clone(),
            Field::Cdr => *self.pair.cdr.borrow_mut() = value.clone(),
        }
        value
    }
}

/// `Ok(None)` means the address falls on a non-pair or outside the chain.
fn resolve_place(form: &Rc<Pair>, env: &Env) -> Result<Option<Place>, Value> {
    let name = match form.car.borrow().symbol() {
        Some(s) => Rc::clone(s),
        None => return Err(e::arg("setf")),
    };
    let args = form.cdr.borrow().clone();
    let target = match args.nth(0) {
        Some(expr) => eval(&expr, env),
        None => return Err(e::arg(name)),
    };
    if target.is_error() {
        return Err(target);
    }
    let pair = match target.pair() {
        Some(p) => Rc::clone(p),
        None => return Ok(None),
    };
    match name.as_str() {
        "car" => Ok(Some(Place {
            pair,
            field: Field::Car,
        })),
        "cdr" => Ok(Some(Place {
            pair,
            field: Field::Cdr,
        })),
        "elt" => {
            let index = match args.nth(1) {
                Some(expr) => eval(&expr, env),
                None => return Err(e::arg("elt")),
            };
            if index.is_error() {
                return Err(index);
            }
            let index = match index.number() {
                Some(n) if n >= 0 => n as usize,
                _ => return Err(e::arg("elt")),
            };
            Ok(nth_pair(&pair, index).map(|pair| Place {
                pair,
                field: Field::Car,
            }))
        }
        _ => Err(e::arg("setf")),
    }
}

fn nth_pair(pair: &Rc<Pair>, n: usize) -> Option<Rc<Pair>> {
    let mut current = Rc::clone(pair);
    for _ in 0..n {
        let next = current.cdr.borrow().clone();
        match next {
            Value::Pair(p) => current = p,
            _ => return None,
        }
    }
    Some(current)
}

pub fn setf(args: &Value, env: &Env) -> Value {
    let mut rest = args.clone();
    let mut last = Value::Nil;
    loop {
        let pair = match rest {
            Value::Nil => return last,
            Value::Pair(ref p) => Rc::clone(p),
            _ => return e::arg("setf"),
        };
        let target = pair.car.borrow().clone();
        let tail = pair.cdr.borrow().clone();
        let value_pair = match tail {
            Value::Pair(ref p) => Rc::clone(p),
            _ => return e::arg("setf"),
        };
        let expr = value_pair.car.borrow().clone();
        match target {
            Value::Symbol(name) => {
                let value = try_value!(eval(&expr, env));
                last = env.assign(&name, value, Scope::Upward);
            }
            Value::Pair(place_form) => {
                let place = match resolve_place(&place_form, env) {
                    Ok(Some(place)) => place,
                    // writing through a bad address is an error
                    Ok(None) => return e::arg("setf"),
                    Err(error) => return error,
                };
                let value = try_value!(eval(&expr, env));
                last = place.set(value);
            }
            _ => return e::arg("setf"),
        }
        rest = value_pair.cdr.borrow().clone();
    }
}

pub fn car(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "car", env));
    match value.pair() {
        Some(p) => p.car.borrow().clone(),
        None => Value::Nil,
    }
}

pub fn cdr(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "cdr", env));
    match value.pair() {
        Some(p) => p.cdr.borrow().clone(),
        None => Value::Nil,
    }
}

pub fn elt(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "elt", env));
    let index = match try_value!(eval_arg(args, 1, "elt", env)).number() {
        Some(n) if n >= 0 => n as usize,
        Some(_) => return Value::Nil,
        None => return e::arg("elt"),
    };
    match value.pair() {
        Some(p) => match nth_pair(p, index) {
            Some(p) => p.car.borrow().clone(),
            None => Value::Nil,
        },
        None => Value::Nil,
    }
}

pub fn quote(args: &Value, _env: &Env) -> Value {
    args.nth(0).unwrap_or(Value::Nil)
}

pub fn eval_form(args: &Value, env: &Env) -> Value {
    match args.nth(0) {
        Some(form) => {
            let value = eval(&form, env);
            // double evaluation; an error value echoes itself here
            eval(&value, env)
        }
        None => Value::Nil,
    }
}

pub fn cons(args: &Value, env: &Env) -> Value {
    let car = try_value!(eval_arg(args, 0, "cons", env));
    let cdr = try_value!(eval_arg(args, 1, "cons", env));
    Value::cons(car, cdr)
}

pub fn list(args: &Value, env: &Env) -> Value {
    let mut items = Vec::new();
    for form in args.iter() {
        let value = try_value!(eval(&form, env));
        if let Some(returned) = env.returned() {
            // a `return` in argument position truncates the list
            return Value::cons(returned, Value::Nil);
        }
        items.push(value);
    }
    items.into_iter().collect()
}

pub fn progn(args: &Value, env: &Env) -> Value {
    match eval_body(args, env) {
        Flow::Normal(value) | Flow::Returned(value) => value,
    }
}

pub fn if_form(args: &Value, env: &Env) -> Value {
    if args.nth(1).is_none() {
        return e::arg("if");
    }
    let predicate = try_value!(eval_arg(args, 0, "if", env));
    if !predicate.is_nil() {
        eval_arg(args, 1, "if", env)
    } else {
        match args.nth(2) {
            Some(form) => eval(&form, env),
            None => Value::Nil,
        }
    }
}

pub fn cond(args: &Value, env: &Env) -> Value {
    if args.pair().is_none() {
        return e::arg("cond");
    }
    for clause in args.iter() {
        let clause = match clause.pair() {
            Some(p) => Rc::clone(p),
            None => return e::arg("cond"),
        };
        let predicate_form = clause.car.borrow().clone();
        let predicate = try_value!(eval(&predicate_form, env));
        if !predicate.is_nil() {
            let consequent = clause.cdr.borrow().clone();
            return match consequent.nth(0) {
                Some(form) => eval(&form, env),
                None => Value::Nil,
            };
        }
    }
    Value::Nil
}

pub fn while_form(args: &Value, env: &Env) -> Value {
    let (predicate, body) = match args.pair() {
        Some(p) => (p.car.borrow().clone(), p.cdr.borrow().clone()),
        None => return e::arg("while"),
    };
    if body.pair().is_none() {
        return e::arg("while");
    }
    env.push_loop();
    let result = loop {
        let test = eval(&predicate, env);
        if test.is_error() {
            break test;
        }
        if let Some(value) = env.returned() {
            break value;
        }
        if test.is_nil() {
            break Value::Nil;
        }
        match eval_body(&body, env) {
            Flow::Returned(value) => break value,
            Flow::Normal(value) => {
                if value.is_error() {
                    break value;
                }
            }
        }
    };
    env.pop_loop();
    result
}

pub fn return_form(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "return", env));
    env.set_return(value.clone());
    value
}

pub fn let_form(args: &Value, env: &Env) -> Value {
    let (bindings, body) = match args.pair() {
        Some(p) => (p.car.borrow().clone(), p.cdr.borrow().clone()),
        None => return e::arg("let"),
    };
    match bindings {
        Value::Nil | Value::Pair(_) => (),
        _ => return e::arg("let"),
    }
    if body.pair().is_none() {
        return e::arg("let");
    }
    env.push_frame();
    // binding expressions run inside the new frame, so later names can
    // use earlier ones
    let bound = assign_pairs(&bindings, Scope::Local, "let", env);
    if bound.is_error() {
        env.pop_frame();
        return bound;
    }
    let result = match eval_body(&body, env) {
        Flow::Normal(value) | Flow::Returned(value) => value,
    };
    env.pop_frame();
    result
}

pub fn defun(args: &Value, env: &Env) -> Value {
    let name = match args.nth(0) {
        Some(Value::Symbol(s)) => s,
        _ => return e::arg("defun"),
    };
    let params = match args.nth(1) {
        Some(list) if all_symbols(&list) => list,
        _ => return e::arg("defun"),
    };
    let body = match args.nth(2) {
        Some(form) => form,
        None => return e::arg("defun"),
    };
    env.assign(
        &name,
        Value::Lambda {
            params: Rc::new(params),
            body: Rc::new(body),
        },
        Scope::Upward,
    )
}

fn all_symbols(list: &Value) -> bool {
    match list {
        Value::Nil => true,
        Value::Pair(p) => {
            p.car.borrow().symbol().is_some() && all_symbols(&p.cdr.borrow().clone())
        }
        _ => false,
    }
}

fn fold<D, I>(
    forms: I,
    identity: i128,
    op: fn(i128, i128) -> Option<i128>,
    name: D,
    env: &Env,
) -> Result<i128, Value>
where
    D: Display,
    I: Iterator<Item = Value>,
{
    let mut total = identity;
    for form in forms {
        let value = eval(&form, env);
        if value.is_error() {
            return Err(value);
        }
        let n = value.number().ok_or_else(|| e::arg(&name))?;
        total = op(total, n).ok_or_else(|| e::math("numeric overflow"))?;
    }
    Ok(total)
}

pub fn add(args: &Value, env: &Env) -> Value {
    match fold(args.iter(), 0, i128::checked_add, '+', env) {
        Ok(total) => Value::Number(total),
        Err(error) => error,
    }
}

pub fn multiply(args: &Value, env: &Env) -> Value {
    match fold(args.iter(), 1, i128::checked_mul, '*', env) {
        Ok(total) => Value::Number(total),
        Err(error) => error,
    }
}

pub fn subtract(args: &Value, env: &Env) -> Value {
    let first = match number_arg(args, 0, '-', env) {
        Ok(n) => n,
        Err(error) => return error,
    };
    if args.nth(1).is_none() {
        return match first.checked_neg() {
            Some(n) => Value::Number(n),
            None => e::math("numeric overflow"),
        };
    }
    match fold(args.iter().skip(1), 0, i128::checked_add, '-', env) {
        Ok(rest) => match first.checked_sub(rest) {
            Some(n) => Value::Number(n),
            None => e::math("numeric overflow"),
        },
        Err(error) => error,
    }
}

pub fn divide(args: &Value, env: &Env) -> Value {
    let first = match number_arg(args, 0, '/', env) {
        Ok(n) => n,
        Err(error) => return error,
    };
    let (dividend, divisor) = if args.nth(1).is_none() {
        // unary form is the reciprocal
        (1, first)
    } else {
        match fold(args.iter().skip(1), 1, i128::checked_mul, '/', env) {
            Ok(rest) => (first, rest),
            Err(error) => return error,
        }
    };
    if divisor == 0 {
        return e::math("division by zero");
    }
    match dividend.checked_div(divisor) {
        Some(n) => Value::Number(n),
        None => e::math("numeric overflow"),
    }
}

/// Chained comparison: every adjacent pair must satisfy the relation.
/// Fewer than two arguments is trivially true.
fn compare<D: Display>(args: &Value, op: fn(&i128, &i128) -> bool, name: D, env: &Env) -> Value {
    let mut previous = None;
    for form in args.iter() {
        let value = try_value!(eval(&form, env));
        let n = match value.number() {
            Some(n) => n,
            None => return e::arg(&name),
        };
        if let Some(p) = previous {
            if !op(&p, &n) {
                return Value::Nil;
            }
        }
        previous = Some(n);
    }
    Value::True
}

pub fn equal(args: &Value, env: &Env) -> Value {
    compare(args, i128::eq, '=', env)
}

pub fn not_equal(args: &Value, env: &Env) -> Value {
    compare(args, i128::ne, "!=", env)
}

pub fn less(args: &Value, env: &Env) -> Value {
    compare(args, i128::lt, '<', env)
}

pub fn less_equal(args: &Value, env: &Env) -> Value {
    compare(args, i128::le, "<=", env)
}

pub fn greater(args: &Value, env: &Env) -> Value {
    compare(args, i128::gt, '>', env)
}

pub fn greater_equal(args: &Value, env: &Env) -> Value {
    compare(args, i128::ge, ">=", env)
}

pub fn not(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "not", env));
    Value::make_bool(value.is_nil())
}

pub fn and(args: &Value, env: &Env) -> Value {
    for form in args.iter() {
        let value = try_value!(eval(&form, env));
        if value.is_nil() {
            return Value::Nil;
        }
    }
    Value::True
}

pub fn or(args: &Value, env: &Env) -> Value {
    for form in args.iter() {
        let value = try_value!(eval(&form, env));
        if !value.is_nil() {
            return Value::True;
        }
    }
    Value::Nil
}

pub fn atomp(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "atomp", env));
    Value::make_bool(value.pair().is_none())
}

pub fn numberp(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "numberp", env));
    Value::make_bool(match value {
        Value::Number(_) => true,
        _ => false,
    })
}

pub fn stringp(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "stringp", env));
    Value::make_bool(match value {
        Value::String(_) => true,
        _ => false,
    })
}

pub fn symbolp(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "symbolp", env));
    Value::make_bool(match value {
        Value::Symbol(_) => true,
        _ => false,
    })
}

pub fn consp(args: &Value, env: &Env) -> Value {
    let value = try_value!(eval_arg(args, 0, "consp", env));
    Value::make_bool(value.pair().is_some())
}

#[cfg(test)]
mod builtins {
    use super::*;
    use crate::reader::parse_line;

    fn run(env: &Env, source: &str) -> Value {
        eval(&parse_line(source), env)
    }

    fn env() -> Env {
        Env::new().with_core().make()
    }

    #[test]
    fn quote_returns_raw() {
        let env = env();
        assert_eq!(run(&env, "'x"), Value::make_symbol("x"));
        assert_eq!(run(&env, "(quote (1 2))").to_string(), "(1 2)");
        assert_eq!(run(&env, "(quote)"), Value::Nil);
    }

    #[test]
    fn setq_returns_last_value() {
        let env = env();
        assert_eq!(run(&env, "(setq a 1 b 2)"), Value::Number(2));
        assert_eq!(env.lookup("a"), Value::Number(1));
        assert_eq!(env.lookup("b"), Value::Number(2));
        assert_eq!(run(&env, "(setq)"), Value::Nil);
    }

    #[test]
    fn setq_stops_at_first_error() {
        let env = env();
        let result = run(&env, "(setq a 1 b (/ 1 0) c 3)");
        match result {
            Value::Error { category, .. } => assert_eq!(category, "math"),
            other => panic!("expected math error, got {}", other),
        }
        // the assignment before the error still happened
        assert_eq!(env.lookup("a"), Value::Number(1));
        assert!(env.lookup("c").is_error());
    }

    #[test]
    fn places_write_through_pair_fields() {
        let env = env();
        run(&env, "(setq p (cons 1 2))");
        assert_eq!(run(&env, "(setf (car p) 9)"), Value::Number(9));
        assert_eq!(run(&env, "(car p)"), Value::Number(9));
        assert_eq!(run(&env, "(setf (cdr p) 7)"), Value::Number(7));
        assert_eq!(run(&env, "p").to_string(), "(9 . 7)");

        run(&env, "(setq q (list 1 2 3))");
        assert_eq!(run(&env, "(setf (elt q 2) 30)"), Value::Number(30));
        assert_eq!(run(&env, "q").to_string(), "(1 2 30)");
    }

    #[test]
    fn bad_addresses() {
        let env = env();
        run(&env, "(setq q (list 1 2 3))");
        // reads outside the chain give nil
        assert_eq!(run(&env, "(elt q 5)"), Value::Nil);
        assert_eq!(run(&env, "(car 5)"), Value::Nil);
        assert_eq!(run(&env, "(cdr nil)"), Value::Nil);
        // writes outside the chain are errors
        assert!(run(&env, "(setf (elt q 5) 0)").is_error());
        assert!(run(&env, "(setf (car 5) 0)").is_error());
    }

    #[test]
    fn arithmetic_identities() {
        let env = env();
        assert_eq!(run(&env, "(+)"), Value::Number(0));
        assert_eq!(run(&env, "(*)"), Value::Number(1));
        assert_eq!(run(&env, "(- 5)"), Value::Number(-5));
        assert_eq!(run(&env, "(/ 5)"), Value::Number(0));
        assert_eq!(run(&env, "(/ 1)"), Value::Number(1));
        assert_eq!(run(&env, "(+ 1 2 3)"), Value::Number(6));
        assert_eq!(run(&env, "(- 10 1 2)"), Value::Number(7));
        assert_eq!(run(&env, "(* 2 3 4)"), Value::Number(24));
        assert_eq!(run(&env, "(/ 24 3 4)"), Value::Number(2));
    }

    #[test]
    fn division_by_zero() {
        for source in &["(/ 4 0)", "(/ 0)", "(/ 8 4 0)"] {
            match run(&env(), source) {
                Value::Error { category, .. } => assert_eq!(category, "math"),
                other => panic!("expected math error for {}, got {}", source, other),
            }
        }
    }

    #[test]
    fn non_number_argument() {
        let env = env();
        assert!(run(&env, "(+ 1 \"x\")").is_error());
        assert!(run(&env, "(< 1 'a)").is_error());
        assert!(run(&env, "(-)").is_error());
        assert!(run(&env, "(/)").is_error());
    }

    #[test]
    fn chained_comparisons() {
        let env = env();
        assert_eq!(run(&env, "(< 1 2 3)"), Value::True);
        assert_eq!(run(&env, "(< 1 3 2)"), Value::Nil);
        assert_eq!(run(&env, "(<= 1 1 2)"), Value::True);
        assert_eq!(run(&env, "(= 4 4 4)"), Value::True);
        assert_eq!(run(&env, "(!= 1 2)"), Value::True);
        assert_eq!(run(&env, "(> 3 2 1)"), Value::True);
        assert_eq!(run(&env, "(>= 3 3 1)"), Value::True);
        // fewer than two arguments is trivially true
        assert_eq!(run(&env, "(=)"), Value::True);
        assert_eq!(run(&env, "(< 1)"), Value::True);
    }

    #[test]
    fn predicates_classify_variants() {
        let env = env();
        assert_eq!(run(&env, "(numberp 1)"), Value::True);
        assert_eq!(run(&env, "(numberp 'a)"), Value::Nil);
        assert_eq!(run(&env, "(stringp \"s\")"), Value::True);
        assert_eq!(run(&env, "(symbolp 'a)"), Value::True);
        assert_eq!(run(&env, "(consp (cons 1 2))"), Value::True);
        assert_eq!(run(&env, "(consp 1)"), Value::Nil);
        assert_eq!(run(&env, "(atomp 1)"), Value::True);
        assert_eq!(run(&env, "(atomp (cons 1 2))"), Value::Nil);
        assert_eq!(run(&env, "(atomp nil)"), Value::True);
    }

    #[test]
    fn logic_short_circuits() {
        let env = env();
        assert_eq!(run(&env, "(not nil)"), Value::True);
        assert_eq!(run(&env, "(not 1)"), Value::Nil);
        assert_eq!(run(&env, "(and 1 2 3)"), Value::True);
        assert_eq!(run(&env, "(and 1 nil 3)"), Value::Nil);
        assert_eq!(run(&env, "(and)"), Value::True);
        assert_eq!(run(&env, "(or nil 1)"), Value::True);
        assert_eq!(run(&env, "(or nil nil)"), Value::Nil);
        assert_eq!(run(&env, "(or)"), Value::Nil);
        // short circuit: the unbound symbol is never evaluated
        assert_eq!(run(&env, "(and nil unbound)"), Value::Nil);
        assert_eq!(run(&env, "(or 1 unbound)"), Value::True);
    }

    #[test]
    fn list_and_cons() {
        let env = env();
        assert_eq!(run(&env, "(list 1 2 3)").to_string(), "(1 2 3)");
        assert_eq!(run(&env, "(list)"), Value::Nil);
        assert_eq!(run(&env, "(cons 1 2)").to_string(), "(1 . 2)");
        assert_eq!(run(&env, "(cons 1 (cons 2 nil))").to_string(), "(1 2)");
        assert!(run(&env, "(cons 1)").is_error());
    }

    #[test]
    fn progn_returns_last() {
        let env = env();
        assert_eq!(run(&env, "(progn 1 2 3)"), Value::Number(3));
        assert_eq!(run(&env, "(progn)"), Value::Nil);
    }
}
