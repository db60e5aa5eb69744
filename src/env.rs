use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{error as e, value::Value};

/// Which frame an assignment targets.
#[derive(Clone, Copy)]
pub enum Scope {
    /// Write into the innermost frame unconditionally.
    Local,
    /// Overwrite the innermost existing binding, or create a global one.
    Upward,
}

/// Dynamically scoped symbol table: a stack of frames searched from the
/// innermost out. Procedures capture nothing; whatever frames are live at
/// call time are visible. Cheap to clone, shares the same frame stack.
pub struct Env(Rc<Frames>);

struct Frames {
    frames: RefCell<Vec<HashMap<String, Value>>>,
    // one slot per active `while`, written by `return`
    loops: RefCell<Vec<Option<Value>>>,
}

impl Env {
    pub fn new() -> EnvBuilder {
        EnvBuilder {
            data: HashMap::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Value {
        for frame in self.0.frames.borrow().iter().rev() {
            if let Some(value) = frame.get(name) {
                return value.clone();
            }
        }
        e::symbol(name)
    }

    pub fn assign(&self, name: &str, value: Value, scope: Scope) -> Value {
        let mut frames = self.0.frames.borrow_mut();
        let index = match scope {
            Scope::Local => frames.len() - 1,
            Scope::Upward => frames
                .iter()
                .rposition(|frame| frame.contains_key(name))
                .unwrap_or(0),
        };
        frames[index].insert(name.to_string(), value.clone());
        value
    }

    /// Removes the innermost binding of `name`, if any.
    pub fn unset(&self, name: &str) -> Value {
        let mut frames = self.0.frames.borrow_mut();
        if let Some(index) = frames.iter().rposition(|frame| frame.contains_key(name)) {
            frames[index].remove(name);
        }
        Value::Nil
    }

    pub fn push_frame(&self) {
        self.0.frames.borrow_mut().push(HashMap::new());
    }

    pub fn pop_frame(&self) {
        let mut frames = self.0.frames.borrow_mut();
        // the global frame is never popped
        if frames.len() > 1 {
            frames.pop();
        }
    }

    /// Opens a fresh `return` channel for a loop activation, so nested
    /// loops cannot observe each other's exits.
    pub fn push_loop(&self) {
        self.0.loops.borrow_mut().push(None);
    }

    pub fn pop_loop(&self) {
        self.0.loops.borrow_mut().pop();
    }

    /// Records a `return` value in the innermost activation. Unobserved
    /// when no loop is active.
    pub fn set_return(&self, value: Value) {
        if let Some(slot) = self.0.loops.borrow_mut().last_mut() {
            *slot = Some(value);
        }
    }

    pub fn returned(&self) -> Option<Value> {
        self.0.loops.borrow().last().cloned().flatten()
    }
}

impl Clone for Env {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

pub struct EnvBuilder {
    data: HashMap<String, Value>,
}

impl EnvBuilder {
    pub fn with_core(mut self) -> Self {
        use crate::core::{
            add, and, atomp, car, cdr, cond, cons, consp, defun, divide, elt, equal, eval_form,
            greater, greater_equal, if_form, less, less_equal, let_form, list, multiply, not,
            not_equal, numberp, or, print, progn, quote, readline, return_form, setf, setq,
            stringp, subtract, symbolp, while_form,
        };

        // nil and t resolve to the singletons
        self.data.insert("nil".into(), Value::Nil);
        self.data.insert("t".into(), Value::True);

        self.data.insert("print".into(), Value::Function(print));
        self.data
            .insert("readline".into(), Value::Function(readline));
        self.data.insert("setq".into(), Value::Function(setq));
        self.data.insert("setf".into(), Value::Function(setf));
        self.data.insert("quote".into(), Value::Function(quote));
        self.data.insert("eval".into(), Value::Function(eval_form));
        self.data.insert("list".into(), Value::Function(list));
        self.data.insert("cons".into(), Value::Function(cons));
        self.data.insert("car".into(), Value::Function(car));
        self.data.insert("cdr".into(), Value::Function(cdr));
        self.data.insert("elt".into(), Value::Function(elt));
        self.data.insert("if".into(), Value::Function(if_form));
        self.data.insert("cond".into(), Value::Function(cond));
        self.data.insert("while".into(), Value::Function(while_form));
        self.data
            .insert("return".into(), Value::Function(return_form));
        self.data.insert("let".into(), Value::Function(let_form));
        self.data.insert("defun".into(), Value::Function(defun));
        self.data.insert("progn".into(), Value::Function(progn));
        self.data.insert("+".into(), Value::Function(add));
        self.data.insert("-".into(), Value::Function(subtract));
        self.data.insert("*".into(), Value::Function(multiply));
        self.data.insert("/".into(), Value::Function(divide));
        self.data.insert("not".into(), Value::Function(not));
        self.data.insert("and".into(), Value::Function(and));
        self.data.insert("or".into(), Value::Function(or));
        self.data.insert("=".into(), Value::Function(equal));
        self.data.insert("!=".into(), Value::Function(not_equal));
        self.data.insert("<".into(), Value::Function(less));
        self.data.insert("<=".into(), Value::Function(less_equal));
        self.data.insert(">".into(), Value::Function(greater));
        self.data
            .insert(">=".into(), Value::Function(greater_equal));
        self.data.insert("atomp".into(), Value::Function(atomp));
        self.data.insert("numberp".into(), Value::Function(numberp));
        self.data.insert("stringp".into(), Value::Function(stringp));
        self.data.insert("symbolp".into(), Value::Function(symbolp));
        self.data.insert("consp".into(), Value::Function(consp));
        self
    }

    pub fn make(self) -> Env {
        Env(Rc::new(Frames {
            frames: RefCell::new(vec![self.data]),
            loops: RefCell::new(Vec::new()),
        }))
    }
}
