//! Composable query predicates.
//!
//! A [`Predicate`] is a deferred filter: it receives the selector it is
//! applied to, so that column references are qualified against whatever
//! alias that selector carries at execution time.

use std::fmt;
use std::sync::Arc;

use nodegraph_sql::{CmpOp, Expr, JsonOp, Selector, Value};

/// A filter applied to a selector.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&mut Selector) + Send + Sync>);

/// An arbitrary selector mutation applied after filters and ordering.
pub type Modifier = Arc<dyn Fn(&mut Selector) + Send + Sync>;

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate")
    }
}

impl Predicate {
    pub fn new(f: impl Fn(&mut Selector) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Apply to `s`, AND-ing with its existing filter.
    pub fn apply(&self, s: &mut Selector) {
        (self.0)(s)
    }

    fn leaf(f: impl Fn(&Selector) -> Expr + Send + Sync + 'static) -> Self {
        Self::new(move |s| {
            let e = f(s);
            s.where_(e);
        })
    }

    /// Render this predicate alone against the source of `s`.
    fn render(&self, s: &Selector) -> Option<Expr> {
        let mut scratch = s.scratch();
        self.apply(&mut scratch);
        scratch.take_filter()
    }

    /// All of `preds`.
    pub fn and(preds: Vec<Predicate>) -> Self {
        Self::new(move |s| {
            for p in &preds {
                p.apply(s);
            }
        })
    }

    /// Any of `preds`. An empty list adds no condition.
    pub fn or(preds: Vec<Predicate>) -> Self {
        Self::new(move |s| {
            if preds.is_empty() {
                return;
            }
            let mut exprs = Vec::with_capacity(preds.len());
            for p in &preds {
                match p.render(s) {
                    Some(e) => exprs.push(e),
                    // A branch without condition matches everything.
                    None => return,
                }
            }
            s.where_(Expr::or(exprs));
        })
    }

    /// Negation of `pred`.
    pub fn not(pred: Predicate) -> Self {
        Self::new(move |s| {
            if let Some(e) = pred.render(s) {
                s.where_(Expr::not(e));
            } else {
                s.where_(Expr::Bool(false));
            }
        })
    }
}

fn cmp(column: &str, op: CmpOp, value: Value) -> Predicate {
    let column = column.to_string();
    Predicate::leaf(move |s| Expr::cmp(s.c(&column), op, value.clone()))
}

/// `column = value`; a null value matches NULL columns.
pub fn eq(column: &str, value: impl Into<Value>) -> Predicate {
    let value = value.into();
    if value.is_null() {
        return is_null(column);
    }
    cmp(column, CmpOp::Eq, value)
}

/// `column <> value`; a null value matches non-NULL columns.
pub fn ne(column: &str, value: impl Into<Value>) -> Predicate {
    let value = value.into();
    if value.is_null() {
        return not_null(column);
    }
    cmp(column, CmpOp::Ne, value)
}

pub fn gt(column: &str, value: impl Into<Value>) -> Predicate {
    cmp(column, CmpOp::Gt, value.into())
}

pub fn gte(column: &str, value: impl Into<Value>) -> Predicate {
    cmp(column, CmpOp::Ge, value.into())
}

pub fn lt(column: &str, value: impl Into<Value>) -> Predicate {
    cmp(column, CmpOp::Lt, value.into())
}

pub fn lte(column: &str, value: impl Into<Value>) -> Predicate {
    cmp(column, CmpOp::Le, value.into())
}

/// `column IN (values)`; an empty list matches nothing.
pub fn in_<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Predicate {
    let column = column.to_string();
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    Predicate::leaf(move |s| Expr::in_values(s.c(&column), values.clone()))
}

/// `column NOT IN (values)`; an empty list matches everything.
pub fn not_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Predicate {
    let column = column.to_string();
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    Predicate::leaf(move |s| Expr::not_in_values(s.c(&column), values.clone()))
}

pub fn is_null(column: &str) -> Predicate {
    let column = column.to_string();
    Predicate::leaf(move |s| Expr::is_null(s.c(&column)))
}

pub fn not_null(column: &str) -> Predicate {
    let column = column.to_string();
    Predicate::leaf(move |s| Expr::not_null(s.c(&column)))
}

fn like(column: &str, needle: &str, f: fn(nodegraph_sql::Column, &str) -> Expr) -> Predicate {
    let column = column.to_string();
    let needle = needle.to_string();
    Predicate::leaf(move |s| f(s.c(&column), &needle))
}

/// Substring match.
pub fn contains(column: &str, needle: &str) -> Predicate {
    like(column, needle, Expr::contains)
}

/// Case-insensitive substring match.
pub fn contains_fold(column: &str, needle: &str) -> Predicate {
    like(column, needle, Expr::contains_fold)
}

pub fn has_prefix(column: &str, prefix: &str) -> Predicate {
    like(column, prefix, Expr::has_prefix)
}

pub fn has_suffix(column: &str, suffix: &str) -> Predicate {
    like(column, suffix, Expr::has_suffix)
}

/// Case-insensitive equality.
pub fn equal_fold(column: &str, s: &str) -> Predicate {
    like(column, s, Expr::equal_fold)
}

/// Two columns of the same row are equal.
pub fn columns_eq(left: &str, right: &str) -> Predicate {
    let (left, right) = (left.to_string(), right.to_string());
    Predicate::leaf(move |s| Expr::columns_eq(s.c(&left), s.c(&right)))
}

fn json(column: &str, path: &[&str], op: JsonOp) -> Predicate {
    let column = column.to_string();
    let path: Vec<String> = path.iter().map(|p| p.to_string()).collect();
    Predicate::leaf(move |s| Expr::json(s.c(&column), path.clone(), op.clone()))
}

/// The JSON value at `path` equals `value`.
pub fn json_value_eq(column: &str, path: &[&str], value: impl Into<Value>) -> Predicate {
    json(column, path, JsonOp::Compare(CmpOp::Eq, value.into()))
}

/// The JSON document has a value at `path`.
pub fn json_has_key(column: &str, path: &[&str]) -> Predicate {
    json(column, path, JsonOp::HasKey)
}

/// The JSON array at `path` contains `value`.
pub fn json_contains(column: &str, path: &[&str], value: impl Into<Value>) -> Predicate {
    json(column, path, JsonOp::Contains(value.into()))
}

/// An ORDER BY term over a node column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub desc: bool,
}

impl Order {
    pub fn apply(&self, s: &mut Selector) {
        let c = s.c(&self.column);
        s.order_by(c, self.desc);
    }
}

pub fn asc(column: &str) -> Order {
    Order {
        column: column.to_string(),
        desc: false,
    }
}

pub fn desc(column: &str) -> Order {
    Order {
        column: column.to_string(),
        desc: true,
    }
}
