// Parsed form of a rule condition

use std::fmt;

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Reference to a named context field
    Field(String),
    /// `field.get(key, default)`; a missing default reads as `None`
    Lookup {
        field: String,
        key: Box<Expr>,
        default: Box<Expr>,
    },
    Not(Box<Expr>),
    /// A flat `and` / `or` chain of two or more operands, evaluated left to right
    Bool { op: BoolOp, operands: Vec<Expr> },
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Context fields referenced anywhere in the expression
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Field(name) => out.push(name),
            Expr::Lookup { field, key, default } => {
                out.push(field);
                key.collect_fields(out);
                default.collect_fields(out);
            }
            Expr::Not(inner) => inner.collect_fields(out),
            Expr::Bool { operands, .. } => {
                for operand in operands {
                    operand.collect_fields(out);
                }
            }
            Expr::Compare { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
        }
    }
}
