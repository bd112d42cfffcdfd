use anyhow::{anyhow, bail, Result};
use orlando_formats::text::parse_int;
use serde::Serialize;

use crate::game::Variables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "=" | "==" => CompareOp::Eq,
            "!=" | "<>" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            ">" => CompareOp::Gt,
            "<=" => CompareOp::Le,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }

    pub fn apply(self, left: i32, right: i32) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Gt => left > right,
            CompareOp::Le => left <= right,
            CompareOp::Ge => left >= right,
        }
    }
}

/// An integer literal or a variable reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Operand {
    Literal(i32),
    Variable(String),
}

impl Operand {
    pub fn parse(token: &str) -> Self {
        match parse_int(token) {
            Some(value) => Operand::Literal(value),
            None => Operand::Variable(token.to_string()),
        }
    }

    pub fn value(&self, vars: &Variables) -> i32 {
        match self {
            Operand::Literal(value) => *value,
            Operand::Variable(name) => vars.get(name),
        }
    }
}

/// `a b` (equality) or `a op b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

impl Comparison {
    pub fn parse(args: &[String]) -> Result<Self> {
        match args {
            [left, right] => Ok(Self {
                left: Operand::parse(left),
                op: CompareOp::Eq,
                right: Operand::parse(right),
            }),
            [left, op, right, ..] => Ok(Self {
                left: Operand::parse(left),
                op: CompareOp::parse(op).ok_or_else(|| anyhow!("unknown comparison {op:?}"))?,
                right: Operand::parse(right),
            }),
            _ => bail!("comparison needs two operands, got {}", args.len()),
        }
    }

    pub fn evaluate(&self, vars: &Variables) -> bool {
        self.op.apply(self.left.value(vars), self.right.value(vars))
    }
}

/// What a blocked macro is waiting for. Polled once per frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitCondition {
    /// Remaining frames to hold.
    Frames { remaining: u32 },
    /// Never released; the macro idles until killed or the scene ends.
    Forever,
    PersonIdle { person: String },
    ElementIdle { element: String },
    ElementAnimation { element: String },
    PersonAnimation { person: String },
    Insertion { insertion: String },
    Speech { person: String },
    DialogAnswered,
    MacroFinished { macro_id: String },
    While { comparison: Comparison },
    Until { comparison: Comparison },
    Scroll,
    Fade,
    Media { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_operands_mean_equality() {
        let mut vars = Variables::default();
        let cmp = Comparison::parse(&args(&["X", "0"])).unwrap();
        assert!(cmp.evaluate(&vars));
        vars.set("X", 3);
        assert!(!cmp.evaluate(&vars));
    }

    #[test]
    fn operators_compare_variables_and_literals() {
        let mut vars = Variables::default();
        vars.set("A", 5);
        vars.set("B", 7);
        let cases = [
            (["A", "<", "B"], true),
            (["A", ">=", "5"], true),
            (["A", "<>", "5"], false),
            (["B", "!=", "A"], true),
            (["B", "<=", "6"], false),
            (["A", "==", "A"], true),
        ];
        for (tokens, expected) in cases {
            let cmp = Comparison::parse(&args(&tokens)).unwrap();
            assert_eq!(cmp.evaluate(&vars), expected, "{tokens:?}");
        }
    }

    #[test]
    fn malformed_comparisons_are_errors() {
        assert!(Comparison::parse(&args(&["X"])).is_err());
        assert!(Comparison::parse(&args(&["X", "~", "1"])).is_err());
    }
}
