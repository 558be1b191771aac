//! Expressions over bounded integer and boolean program variables.
//!
//! The same AST is used for guards, update right-hand sides, predicates and
//! the satisfiability queries sent to an [`Oracle`][crate::oracle::Oracle].
//! Equality is syntactic, which is what predicate deduplication and query
//! caching rely on.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

use crate::error::EvalError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Var(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Variable assignment used for evaluation.
pub type Env = HashMap<String, Value>;

impl Expr {
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn int(value: i64) -> Expr {
        Expr::Int(value)
    }

    pub fn t() -> Expr {
        Expr::Bool(true)
    }

    pub fn f() -> Expr {
        Expr::Bool(false)
    }

    fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Ne, lhs, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Ge, lhs, rhs)
    }

    /// `var = value`, the most common predicate shape.
    pub fn var_eq(name: &str, value: i64) -> Expr {
        Expr::eq(Expr::var(name), Expr::int(value))
    }

    pub fn and(items: Vec<Expr>) -> Expr {
        match items.len() {
            0 => Expr::Bool(true),
            1 => items.into_iter().next().unwrap_or(Expr::Bool(true)),
            _ => Expr::And(items),
        }
    }

    pub fn or(items: Vec<Expr>) -> Expr {
        match items.len() {
            0 => Expr::Bool(false),
            1 => items.into_iter().next().unwrap_or(Expr::Bool(false)),
            _ => Expr::Or(items),
        }
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Implies(Box::new(lhs), Box::new(rhs))
    }

    pub fn ite(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Ite(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Add(Box::new(lhs), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(lhs), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(lhs), Box::new(rhs))
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        match self {
            Expr::Bool(b) => Expr::Bool(!b),
            e => Expr::Not(Box::new(e)),
        }
    }
}

impl Expr {
    pub fn eval(&self, env: &Env) -> Result<Value, EvalError> {
        match self {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Var(name) => env
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Not(e) => Ok(Value::Bool(!e.eval_bool(env)?)),
            Expr::And(items) => {
                for e in items {
                    if !e.eval_bool(env)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(items) => {
                for e in items {
                    if e.eval_bool(env)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Implies(a, b) => Ok(Value::Bool(!a.eval_bool(env)? || b.eval_bool(env)?)),
            Expr::Ite(c, t, e) => {
                if c.eval_bool(env)? {
                    t.eval(env)
                } else {
                    e.eval(env)
                }
            }
            Expr::Cmp(op, a, b) => {
                let res = match (a.eval(env)?, b.eval(env)?) {
                    (Value::Int(x), Value::Int(y)) => match op {
                        CmpOp::Eq => x == y,
                        CmpOp::Ne => x != y,
                        CmpOp::Lt => x < y,
                        CmpOp::Le => x <= y,
                        CmpOp::Gt => x > y,
                        CmpOp::Ge => x >= y,
                    },
                    (Value::Bool(x), Value::Bool(y)) => match op {
                        CmpOp::Eq => x == y,
                        CmpOp::Ne => x != y,
                        _ => return Err(EvalError::TypeMismatch(self.to_string())),
                    },
                    _ => return Err(EvalError::TypeMismatch(self.to_string())),
                };
                Ok(Value::Bool(res))
            }
            Expr::Add(a, b) => self.arith(a, b, env, i64::checked_add),
            Expr::Sub(a, b) => self.arith(a, b, env, i64::checked_sub),
            Expr::Mul(a, b) => self.arith(a, b, env, i64::checked_mul),
        }
    }

    fn arith(&self, a: &Expr, b: &Expr, env: &Env, op: fn(i64, i64) -> Option<i64>) -> Result<Value, EvalError> {
        let x = a.eval_int(env)?;
        let y = b.eval_int(env)?;
        op(x, y)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow(self.to_string()))
    }

    pub fn eval_bool(&self, env: &Env) -> Result<bool, EvalError> {
        match self.eval(env)? {
            Value::Bool(b) => Ok(b),
            Value::Int(_) => Err(EvalError::TypeMismatch(self.to_string())),
        }
    }

    pub fn eval_int(&self, env: &Env) -> Result<i64, EvalError> {
        match self.eval(env)? {
            Value::Int(i) => Ok(i),
            Value::Bool(_) => Err(EvalError::TypeMismatch(self.to_string())),
        }
    }

    /// Simultaneous substitution of variables by expressions.
    ///
    /// Returns a syntactically identical expression when no substituted
    /// variable occurs in `self`.
    pub fn substitute(&self, map: &HashMap<String, Expr>) -> Expr {
        let sub = |e: &Expr| Box::new(e.substitute(map));
        match self {
            Expr::Bool(_) | Expr::Int(_) => self.clone(),
            Expr::Var(name) => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            Expr::Not(e) => Expr::Not(sub(e)),
            Expr::And(items) => Expr::And(items.iter().map(|e| e.substitute(map)).collect()),
            Expr::Or(items) => Expr::Or(items.iter().map(|e| e.substitute(map)).collect()),
            Expr::Implies(a, b) => Expr::Implies(sub(a), sub(b)),
            Expr::Ite(c, t, e) => Expr::Ite(sub(c), sub(t), sub(e)),
            Expr::Cmp(op, a, b) => Expr::Cmp(*op, sub(a), sub(b)),
            Expr::Add(a, b) => Expr::Add(sub(a), sub(b)),
            Expr::Sub(a, b) => Expr::Sub(sub(a), sub(b)),
            Expr::Mul(a, b) => Expr::Mul(sub(a), sub(b)),
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Bool(_) | Expr::Int(_) | Expr::Var(_) => vec![],
            Expr::Not(e) => vec![e],
            Expr::And(items) | Expr::Or(items) => items.iter().collect(),
            Expr::Implies(a, b)
            | Expr::Cmp(_, a, b)
            | Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b) => vec![a, b],
            Expr::Ite(c, t, e) => vec![c, t, e],
        }
    }

    /// Free variables, sorted.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            if let Expr::Var(name) = e {
                vars.insert(name.clone());
            }
            stack.extend(e.children());
        }
        vars
    }

    /// Does `sub` occur as a sub-expression of `self`?
    pub fn contains(&self, sub: &Expr) -> bool {
        self == sub || self.children().into_iter().any(|c| c.contains(sub))
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn join(f: &mut Formatter<'_>, items: &[Expr], sep: &str) -> std::fmt::Result {
            write!(f, "(")?;
            for (i, e) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", e)?;
            }
            write!(f, ")")
        }

        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Not(e) => write!(f, "!{}", e),
            Expr::And(items) => join(f, items, "&"),
            Expr::Or(items) => join(f, items, "|"),
            Expr::Implies(a, b) => write!(f, "({} => {})", a, b),
            Expr::Ite(c, t, e) => write!(f, "({} ? {} : {})", c, t, e),
            Expr::Cmp(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(a, b) => write!(f, "({} * {})", a, b),
        }
    }
}
