//! Rule condition engine
//!
//! Completion rules are written as small declarative expressions over named state
//! fields, for example:
//!
//! ```text
//! combination_valid == True and detected_objects.get('Red', 0) >= 1
//! ```
//!
//! Conditions are parsed once into a tagged AST ([`Expr`]) and interpreted against an
//! explicit, read-only [`EvalContext`] built from a state snapshot. Nothing outside the
//! context is reachable from an expression, and no expression text is ever executed.
//! Evaluation failures surface as [`EvalError`]; callers treat them as "not satisfied".

pub mod ast;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{BoolOp, CompareOp, Expr};
pub use evaluator::{evaluate, EvalError, RuleEvaluator, RuleOutcome};
pub use parser::{parse, ParseError};
pub use value::{EvalContext, Value};
