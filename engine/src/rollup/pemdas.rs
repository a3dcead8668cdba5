// Arithmetic rollup ("PEMDAS graph"): layered lines folded into scalars.
//
// Despite the name, folding is strictly left-to-right, not
// precedence-based: [2, +3, *4] folds to ((0+2)+3)*4 = 20, never 14.
//
// A line is an ordered list of nodes, each carrying an operand and a
// value. A contributor-bucket node takes the fully folded result of its
// bucket line; the three buckets (labor/materials/misc) always exist and
// an empty bucket folds to 0. Exactly one nesting level, no cycles.

use crate::models::fact::FactValue;
use crate::tree::context::EvaluationContext;
use crate::tree::interpreter::{resolve_variable, EvalError, FLOAT_EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// OPERANDS
// ============================================================================

/// Fold operand. Normalization accepts the ASCII glyphs and the Unicode
/// multiplication/division signs only; anything else errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operand {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operand {
    pub fn parse(glyph: &str) -> Result<Self, RollupError> {
        match glyph {
            "+" => Ok(Operand::Add),
            "-" => Ok(Operand::Subtract),
            "*" | "\u{00d7}" => Ok(Operand::Multiply),
            "/" | "\u{00f7}" => Ok(Operand::Divide),
            other => Err(RollupError::UnknownOperand(other.to_string())),
        }
    }

    /// Fold `value` into the running accumulator.
    ///
    /// Division by zero folds to 0, the same tolerance the expression
    /// evaluator applies.
    pub fn apply(&self, accumulator: f64, value: f64) -> f64 {
        match self {
            Operand::Add => accumulator + value,
            Operand::Subtract => accumulator - value,
            Operand::Multiply => accumulator * value,
            Operand::Divide => {
                if value.abs() < FLOAT_EPSILON {
                    0.0
                } else {
                    accumulator / value
                }
            }
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Operand::Add => "+",
            Operand::Subtract => "-",
            Operand::Multiply => "*",
            Operand::Divide => "/",
        }
    }
}

impl TryFrom<String> for Operand {
    type Error = RollupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Operand::parse(&value)
    }
}

impl From<Operand> for String {
    fn from(operand: Operand) -> Self {
        operand.glyph().to_string()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

// ============================================================================
// LINES & BUCKETS
// ============================================================================

/// Fixed contributor bucket categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Labor,
    Materials,
    Misc,
}

impl BucketKind {
    pub const ALL: [BucketKind; 3] = [BucketKind::Labor, BucketKind::Materials, BucketKind::Misc];

    pub fn label(&self) -> &'static str {
        match self {
            BucketKind::Labor => "labor",
            BucketKind::Materials => "materials",
            BucketKind::Misc => "misc",
        }
    }
}

/// Value source of a line node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineValue {
    Constant { value: f64 },
    Fact { key: String },
    Variable { key: String },
    Bucket { bucket: BucketKind },
}

/// One node of a line: an operand folding a value into the accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineNode {
    pub operand: Operand,

    #[serde(flatten)]
    pub value: LineValue,
}

/// An ordered list of nodes folded left-to-right into a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: String,

    #[serde(default)]
    pub nodes: Vec<LineNode>,
}

/// The rollup graph: top-level lines plus the three fixed bucket lines.
///
/// Bucket lines missing from the authored form are present and empty:
/// they fold to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PemdasGraph {
    #[serde(default)]
    pub lines: Vec<Line>,

    #[serde(default)]
    pub buckets: BTreeMap<BucketKind, Line>,
}

// ============================================================================
// EVALUATION
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum RollupError {
    #[error("unknown operand glyph '{0}'")]
    UnknownOperand(String),

    #[error("line node '{0}' did not resolve to a number")]
    NonNumericValue(String),

    #[error("bucket nodes cannot appear inside bucket lines")]
    NestedBucket,

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Folded rollup results: one scalar per line, one per bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupResult {
    pub line_totals: BTreeMap<String, f64>,
    pub bucket_totals: BTreeMap<BucketKind, f64>,
}

/// Fold the whole rollup graph.
///
/// Bucket lines fold first (they may not nest further); top-level lines
/// then fold with bucket totals available.
pub fn evaluate_rollup(
    pemdas: &PemdasGraph,
    ctx: &EvaluationContext,
) -> Result<RollupResult, RollupError> {
    let mut bucket_totals: BTreeMap<BucketKind, f64> = BTreeMap::new();
    for kind in BucketKind::ALL {
        let total = match pemdas.buckets.get(&kind) {
            Some(line) => fold_line(line, None, ctx)?,
            None => 0.0,
        };
        bucket_totals.insert(kind, total);
    }

    let mut line_totals = BTreeMap::new();
    for line in &pemdas.lines {
        let total = fold_line(line, Some(&bucket_totals), ctx)?;
        line_totals.insert(line.id.clone(), total);
    }

    Ok(RollupResult {
        line_totals,
        bucket_totals,
    })
}

fn fold_line(
    line: &Line,
    bucket_totals: Option<&BTreeMap<BucketKind, f64>>,
    ctx: &EvaluationContext,
) -> Result<f64, RollupError> {
    let mut accumulator = 0.0;
    for node in &line.nodes {
        let value = resolve_line_value(&node.value, bucket_totals, ctx)?;
        accumulator = node.operand.apply(accumulator, value);
    }
    Ok(accumulator)
}

fn resolve_line_value(
    value: &LineValue,
    bucket_totals: Option<&BTreeMap<BucketKind, f64>>,
    ctx: &EvaluationContext,
) -> Result<f64, RollupError> {
    match value {
        LineValue::Constant { value } => Ok(*value),

        LineValue::Fact { key } => match ctx.fact(key)? {
            FactValue::Number(n) => Ok(n),
            _ => Err(RollupError::NonNumericValue(key.clone())),
        },

        LineValue::Variable { key } => Ok(resolve_variable(key, ctx)?),

        LineValue::Bucket { bucket } => match bucket_totals {
            Some(totals) => Ok(totals.get(bucket).copied().unwrap_or(0.0)),
            None => Err(RollupError::NestedBucket),
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
