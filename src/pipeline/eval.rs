//! In-process execution of a [`Pipeline`].
//!
//! Follows document-database semantics where the queries depend on them:
//! missing fields read as null, null compares below every number, `$sum`
//! skips non-numeric values and `$unwind` drops documents without elements.
use crate::bucket;
use crate::document::{Datum, Document, RowExt};
use crate::errors::Error;
use crate::pipeline::{Accumulator, CompareOp, Expr, Pipeline, SortOrder, Stage};

use std::cmp::Ordering;
use std::collections::HashMap;

pub fn run<I>(pipeline: &Pipeline, docs: I) -> Result<Vec<Document>, Error>
where
    I: IntoIterator<Item = Document>,
{
    let mut docs: Vec<Document> = docs.into_iter().collect();
    for stage in pipeline.stages.iter() {
        docs = apply(stage, docs)?;
    }
    Ok(docs)
}

fn apply(stage: &Stage, docs: Vec<Document>) -> Result<Vec<Document>, Error> {
    match stage {
        Stage::Match(e) => {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if evaluate(e, &doc)?.truthy() {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        Stage::AddFields(fields) => docs
            .into_iter()
            .map(|mut doc| -> Result<Document, Error> {
                for (name, e) in fields.iter() {
                    let v = evaluate(e, &doc)?;
                    doc.insert(name.clone(), v);
                }
                Ok(doc)
            })
            .collect(),
        Stage::Unwind(field) => {
            let mut unwound = vec![];
            for doc in docs {
                match doc.datum(field).clone() {
                    Datum::Null => {}
                    Datum::Array(items) => {
                        for item in items {
                            let mut d = doc.clone();
                            d.insert(field.clone(), item);
                            unwound.push(d);
                        }
                    }
                    _ => unwound.push(doc),
                }
            }
            Ok(unwound)
        }
        Stage::Group { id, fields } => group(id, fields, docs),
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| {
                for (name, order) in keys.iter() {
                    let o = a.datum(name).compare(b.datum(name));
                    let o = match order {
                        SortOrder::Ascending => o,
                        SortOrder::Descending => o.reverse(),
                    };
                    if o != Ordering::Equal {
                        return o;
                    }
                }
                Ordering::Equal
            });
            Ok(docs)
        }
        Stage::Limit(n) => {
            if *n == 0 {
                return Err(Error::query("the limit must be positive"));
            }
            let mut docs = docs;
            docs.truncate(*n);
            Ok(docs)
        }
    }
}

fn group(
    id: &Expr,
    fields: &[(String, Accumulator)],
    docs: Vec<Document>,
) -> Result<Vec<Document>, Error> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Datum, Vec<Datum>)> = vec![];

    for doc in docs.iter() {
        let key = evaluate(id, doc)?;
        let slot = serde_json::to_string(&key)?;
        let position = match index.get(&slot) {
            Some(p) => *p,
            None => {
                groups.push((key, vec![Datum::Int(0); fields.len()]));
                index.insert(slot, groups.len() - 1);
                groups.len() - 1
            }
        };
        let totals = &mut groups[position].1;
        for (total, (_, acc)) in totals.iter_mut().zip(fields.iter()) {
            let increment = match acc {
                Accumulator::Count => Datum::Int(1),
                Accumulator::Sum(e) => evaluate(e, doc)?,
            };
            *total = add(total, &increment);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, totals)| {
            let mut row = Document::new();
            row.insert("_id".into(), key);
            for ((name, _), total) in fields.iter().zip(totals.into_iter()) {
                row.insert(name.clone(), total);
            }
            row
        })
        .collect())
}

fn add(total: &Datum, increment: &Datum) -> Datum {
    match (total, increment) {
        (Datum::Int(a), Datum::Int(b)) => match a.checked_add(*b) {
            Some(s) => Datum::Int(s),
            None => Datum::Float(*a as f64 + *b as f64),
        },
        (t, i) => match (t.as_f64(), i.as_f64()) {
            (Some(a), Some(b)) => Datum::Float(a + b),
            _ => t.clone(),
        },
    }
}

pub fn evaluate(expr: &Expr, doc: &Document) -> Result<Datum, Error> {
    match expr {
        Expr::Field(name) => Ok(doc.datum(name).clone()),
        Expr::Literal(d) => Ok(d.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|e| evaluate(e, doc))
            .collect::<Result<Vec<_>, _>>()
            .map(Datum::Array),
        Expr::Abs(e) => match evaluate(e, doc)? {
            Datum::Null => Ok(Datum::Null),
            Datum::Int(i) => Ok(Datum::Int(i.saturating_abs())),
            Datum::Float(f) => Ok(Datum::Float(f.abs())),
            other => Err(Error::query(format!("$abs only supports numeric types, not {:?}", other))),
        },
        Expr::Subtract(a, b) => match (evaluate(a, doc)?, evaluate(b, doc)?) {
            (Datum::Null, _) | (_, Datum::Null) => Ok(Datum::Null),
            (Datum::Int(x), Datum::Int(y)) => Ok(Datum::Int(x.saturating_sub(y))),
            (Datum::Date(x), Datum::Date(y)) => Ok(Datum::Int((x - y).num_milliseconds())),
            (x, y) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Datum::Float(x - y)),
                _ => Err(Error::query(format!("can't $subtract {:?} from {:?}", y, x))),
            },
        },
        Expr::Compare(op, a, b) => {
            let o = evaluate(a, doc)?.compare(&evaluate(b, doc)?);
            let result = match op {
                CompareOp::Eq => o == Ordering::Equal,
                CompareOp::Ne => o != Ordering::Equal,
                CompareOp::Lt => o == Ordering::Less,
                CompareOp::Lte => o != Ordering::Greater,
                CompareOp::Gt => o == Ordering::Greater,
                CompareOp::Gte => o != Ordering::Less,
            };
            Ok(Datum::Bool(result))
        }
        Expr::And(items) => {
            for e in items {
                if !evaluate(e, doc)?.truthy() {
                    return Ok(Datum::Bool(false));
                }
            }
            Ok(Datum::Bool(true))
        }
        Expr::Or(items) => {
            for e in items {
                if evaluate(e, doc)?.truthy() {
                    return Ok(Datum::Bool(true));
                }
            }
            Ok(Datum::Bool(false))
        }
        Expr::In(e, values) => {
            let v = evaluate(e, doc)?;
            Ok(Datum::Bool(values.iter().any(|c| c.same_as(&v))))
        }
        Expr::Cond {
            when,
            then,
            otherwise,
        } => {
            if evaluate(when, doc)?.truthy() {
                evaluate(then, doc)
            } else {
                evaluate(otherwise, doc)
            }
        }
        Expr::Switch { branches, default } => {
            for (case, then) in branches {
                if evaluate(case, doc)?.truthy() {
                    return evaluate(then, doc);
                }
            }
            evaluate(default, doc)
        }
        Expr::RegexMatch(e, regex) => match evaluate(e, doc)? {
            Datum::Null => Ok(Datum::Bool(false)),
            Datum::Str(s) => Ok(Datum::Bool(regex.is_match(&s))),
            other => Err(Error::query(format!("$regexMatch needs a string input, not {:?}", other))),
        },
        Expr::DateTrunc {
            date,
            granularity,
            offset,
        } => match evaluate(date, doc)? {
            Datum::Null => Ok(Datum::Null),
            Datum::Date(d) => Ok(Datum::Date(bucket::truncate(d, *granularity, *offset))),
            other => Err(Error::query(format!("$dateTrunc needs a date, not {:?}", other))),
        },
    }
}
