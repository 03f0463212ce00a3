//! Declarative aggregation pipelines.
//!
//! Queries describe their work as a [`Pipeline`] of typed stages. A document
//! database driver submits [`Pipeline::to_json`] as-is; [`eval::run`] executes
//! the same pipeline in process.
pub mod eval;

use crate::document::Datum;
use crate::granularity::Granularity;

use regex::Regex;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn operator(&self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    Field(String),
    Literal(Datum),
    Array(Vec<Expr>),
    Abs(Box<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    In(Box<Expr>, Vec<Datum>),
    Cond {
        when: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Switch {
        branches: Vec<(Expr, Expr)>,
        default: Box<Expr>,
    },
    RegexMatch(Box<Expr>, Regex),
    /// Bucket start of a date, see [`crate::bucket::truncate`].
    DateTrunc {
        date: Box<Expr>,
        granularity: Granularity,
        offset: chrono::FixedOffset,
    },
}

impl Expr {
    pub fn field<T: Into<String>>(name: T) -> Self {
        Expr::Field(name.into())
    }

    pub fn lit<T: Into<Datum>>(value: T) -> Self {
        Expr::Literal(value.into())
    }

    fn compare(self, op: CompareOp, other: Expr) -> Self {
        Expr::Compare(op, Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: Expr) -> Self {
        self.compare(CompareOp::Eq, other)
    }

    pub fn ne(self, other: Expr) -> Self {
        self.compare(CompareOp::Ne, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        self.compare(CompareOp::Lt, other)
    }

    pub fn lte(self, other: Expr) -> Self {
        self.compare(CompareOp::Lte, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        self.compare(CompareOp::Gt, other)
    }

    pub fn gte(self, other: Expr) -> Self {
        self.compare(CompareOp::Gte, other)
    }

    pub fn abs(self) -> Self {
        Expr::Abs(Box::new(self))
    }

    pub fn minus(self, other: Expr) -> Self {
        Expr::Subtract(Box::new(self), Box::new(other))
    }

    pub fn is_in(self, values: Vec<Datum>) -> Self {
        Expr::In(Box::new(self), values)
    }

    pub fn matches(self, regex: Regex) -> Self {
        Expr::RegexMatch(Box::new(self), regex)
    }

    pub fn cond(when: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Cond {
            when: Box::new(when),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn date_trunc(self, granularity: Granularity, offset: chrono::FixedOffset) -> Self {
        Expr::DateTrunc {
            date: Box::new(self),
            granularity,
            offset,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Expr::Field(name) => Value::String(format!("${}", name)),
            Expr::Literal(Datum::Str(s)) if s.starts_with('$') => json!({ "$literal": s }),
            Expr::Literal(d) => serde_json::to_value(d).unwrap_or(Value::Null),
            Expr::Array(items) => Value::Array(items.iter().map(Expr::to_json).collect()),
            Expr::Abs(e) => json!({ "$abs": e.to_json() }),
            Expr::Subtract(a, b) => json!({ "$subtract": [a.to_json(), b.to_json()] }),
            Expr::Compare(op, a, b) => {
                let mut m = Map::new();
                m.insert(op.operator().into(), json!([a.to_json(), b.to_json()]));
                Value::Object(m)
            }
            Expr::And(items) => json!({ "$and": items.iter().map(Expr::to_json).collect::<Vec<_>>() }),
            Expr::Or(items) => json!({ "$or": items.iter().map(Expr::to_json).collect::<Vec<_>>() }),
            Expr::In(e, values) => json!({ "$in": [e.to_json(), values] }),
            Expr::Cond {
                when,
                then,
                otherwise,
            } => json!({
                "$cond": { "if": when.to_json(), "then": then.to_json(), "else": otherwise.to_json() }
            }),
            Expr::Switch { branches, default } => {
                let branches: Vec<_> = branches
                    .iter()
                    .map(|(case, then)| json!({ "case": case.to_json(), "then": then.to_json() }))
                    .collect();
                json!({ "$switch": { "branches": branches, "default": default.to_json() } })
            }
            Expr::RegexMatch(e, regex) => json!({
                "$regexMatch": { "input": e.to_json(), "regex": regex.as_str() }
            }),
            Expr::DateTrunc {
                date,
                granularity,
                offset,
            } => {
                let d = granularity.describe();
                json!({
                    "$dateTrunc": {
                        "date": date.to_json(),
                        "unit": d.unit.to_string(),
                        "binSize": d.bin_size,
                        "timezone": offset.to_string(),
                    }
                })
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Accumulator {
    Sum(Expr),
    Count,
}

impl Accumulator {
    fn to_json(&self) -> Value {
        match self {
            Accumulator::Sum(e) => json!({ "$sum": e.to_json() }),
            Accumulator::Count => json!({ "$count": {} }),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Debug)]
pub enum Stage {
    Match(Expr),
    AddFields(Vec<(String, Expr)>),
    Unwind(String),
    Group {
        id: Expr,
        fields: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, SortOrder)>),
    Limit(usize),
}

impl Stage {
    pub fn to_json(&self) -> Value {
        match self {
            Stage::Match(e) => json!({ "$match": { "$expr": e.to_json() } }),
            Stage::AddFields(fields) => {
                let m: Map<String, Value> = fields
                    .iter()
                    .map(|(name, e)| (name.clone(), e.to_json()))
                    .collect();
                json!({ "$addFields": m })
            }
            Stage::Unwind(field) => json!({ "$unwind": format!("${}", field) }),
            Stage::Group { id, fields } => {
                let mut m = Map::new();
                m.insert("_id".into(), id.to_json());
                for (name, acc) in fields {
                    m.insert(name.clone(), acc.to_json());
                }
                json!({ "$group": m })
            }
            Stage::Sort(keys) => {
                let m: Map<String, Value> = keys
                    .iter()
                    .map(|(name, order)| {
                        let direction = match order {
                            SortOrder::Ascending => 1,
                            SortOrder::Descending => -1,
                        };
                        (name.clone(), json!(direction))
                    })
                    .collect();
                json!({ "$sort": m })
            }
            Stage::Limit(n) => json!({ "$limit": n }),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_json).collect())
    }
}
