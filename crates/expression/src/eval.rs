//! Expression evaluation over events
//!
//! Intermediate results are `Operand` values; only the root must be boolean.
//! Numeric comparisons promote int to float; numeric equality compares as
//! float so `3 == 3.0` holds.

use sluice_event::{Event, Value};

use crate::parser::{CompareOp, Node};
use crate::{ExpressionError, Result};

#[derive(Debug, Clone)]
enum Operand {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl Operand {
    fn type_name(&self) -> &'static str {
        match self {
            Operand::Bool(_) => "boolean",
            Operand::Int(_) => "integer",
            Operand::Float(_) => "float",
            Operand::Str(_) => "string",
            Operand::Null => "null",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Int(i) => Some(*i as f64),
            Operand::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Operand::Int(_) | Operand::Float(_))
    }
}

pub(crate) fn evaluate_boolean(node: &Node, event: &Event) -> Result<bool> {
    match evaluate(node, event)? {
        Operand::Bool(b) => Ok(b),
        other => Err(ExpressionError::NonBooleanResult(other.type_name())),
    }
}

fn evaluate(node: &Node, event: &Event) -> Result<Operand> {
    match node {
        Node::And(lhs, rhs) => {
            // short-circuit
            if !evaluate_boolean(lhs, event)? {
                return Ok(Operand::Bool(false));
            }
            Ok(Operand::Bool(evaluate_boolean(rhs, event)?))
        }
        Node::Or(lhs, rhs) => {
            if evaluate_boolean(lhs, event)? {
                return Ok(Operand::Bool(true));
            }
            Ok(Operand::Bool(evaluate_boolean(rhs, event)?))
        }
        Node::Not(inner) => Ok(Operand::Bool(!evaluate_boolean(inner, event)?)),
        Node::Compare(op, lhs, rhs) => {
            let lhs = evaluate(lhs, event)?;
            let rhs = evaluate(rhs, event)?;
            compare(*op, &lhs, &rhs).map(Operand::Bool)
        }
        Node::RegexMatch {
            operand,
            pattern,
            negated,
        } => {
            let value = evaluate(operand, event)?;
            let text = match &value {
                Operand::Str(s) => s,
                other => {
                    return Err(ExpressionError::TypeMismatch {
                        operator: "=~",
                        lhs: other.type_name(),
                        rhs: "string",
                    })
                }
            };
            let matched = pattern.is_match(text);
            Ok(Operand::Bool(matched != *negated))
        }
        Node::In {
            operand,
            list,
            negated,
        } => {
            let needle = evaluate(operand, event)?;
            let mut found = false;
            for item in list {
                let item = evaluate(item, event)?;
                if operands_equal(&needle, &item)? {
                    found = true;
                    break;
                }
            }
            Ok(Operand::Bool(found != *negated))
        }
        Node::Field(path) => {
            let value = event
                .get(path)?
                .ok_or_else(|| ExpressionError::UnknownField(path.clone()))?;
            Ok(operand_from_value(value)?)
        }
        Node::LitInt(i) => Ok(Operand::Int(*i)),
        Node::LitFloat(f) => Ok(Operand::Float(*f)),
        Node::LitStr(s) => Ok(Operand::Str(s.clone())),
        Node::LitBool(b) => Ok(Operand::Bool(*b)),
    }
}

fn operand_from_value(value: &Value) -> Result<Operand> {
    Ok(match value {
        Value::Null => Operand::Null,
        Value::Bool(b) => Operand::Bool(*b),
        Value::Int(i) => Operand::Int(*i),
        Value::Float(f) => Operand::Float(*f),
        Value::String(s) => Operand::Str(s.clone()),
        Value::Bytes(_) | Value::List(_) | Value::Map(_) => {
            return Err(ExpressionError::TypeMismatch {
                operator: "operand",
                lhs: "composite value",
                rhs: "scalar",
            })
        }
    })
}

fn compare(op: CompareOp, lhs: &Operand, rhs: &Operand) -> Result<bool> {
    match op {
        CompareOp::Eq => operands_equal(lhs, rhs),
        CompareOp::Ne => operands_equal(lhs, rhs).map(|eq| !eq),
        ordering => {
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(ExpressionError::TypeMismatch {
                        operator: ordering.name(),
                        lhs: lhs.type_name(),
                        rhs: rhs.type_name(),
                    })
                }
            };
            Ok(match ordering {
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            })
        }
    }
}

fn operands_equal(lhs: &Operand, rhs: &Operand) -> Result<bool> {
    match (lhs, rhs) {
        (a, b) if a.is_numeric() && b.is_numeric() => {
            // compare as float so int/float pairs don't spuriously differ
            Ok(a.as_f64() == b.as_f64())
        }
        (Operand::Str(a), Operand::Str(b)) => Ok(a == b),
        (Operand::Bool(a), Operand::Bool(b)) => Ok(a == b),
        (Operand::Null, Operand::Null) => Ok(true),
        (a, b) => Err(ExpressionError::TypeMismatch {
            operator: "==",
            lhs: a.type_name(),
            rhs: b.type_name(),
        }),
    }
}
