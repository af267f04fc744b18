//! Expression syntax tree
//!
//! All node kinds are closed enums; function names are resolved to
//! [`Function`] at parse time so evaluation never compares strings.

use std::collections::BTreeSet;

/// Parsed formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal (`true`/`false` parse to 1.0/0.0)
    Number(f64),

    /// Variable reference, possibly dotted (`self.atk.physical`)
    Ident(String),

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Short-circuit `&&` / `||`
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `condition ? then_branch : else_branch`
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Built-in math functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Min,
    Max,
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Clamp,
    Pow,
}

impl Function {
    /// Resolve a function name used in source text
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "abs" => Some(Function::Abs),
            "floor" => Some(Function::Floor),
            "ceil" => Some(Function::Ceil),
            "round" => Some(Function::Round),
            "sqrt" => Some(Function::Sqrt),
            "clamp" => Some(Function::Clamp),
            "pow" => Some(Function::Pow),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Abs => "abs",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Sqrt => "sqrt",
            Function::Clamp => "clamp",
            Function::Pow => "pow",
        }
    }

    /// Accepted argument counts as (min, max); `None` max means variadic
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Min | Function::Max => (1, None),
            Function::Abs | Function::Floor | Function::Ceil | Function::Round | Function::Sqrt => {
                (1, Some(1))
            }
            Function::Pow => (2, Some(2)),
            Function::Clamp => (3, Some(3)),
        }
    }
}

impl Expr {
    /// Every identifier referenced anywhere in the expression
    ///
    /// Used to build dependency edges (stat graph) and to resolve only the
    /// variables a formula actually reads.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ident(name) => {
                out.insert(name.clone());
            }
            Expr::Unary { operand, .. } => operand.collect_identifiers(out),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_identifiers(out);
                right.collect_identifiers(out);
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.collect_identifiers(out);
                then_branch.collect_identifiers(out);
                else_branch.collect_identifiers(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_identifiers(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_collected_once() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Ident("atk".to_string())),
            right: Box::new(Expr::Call {
                function: Function::Max,
                args: vec![Expr::Ident("atk".to_string()), Expr::Ident("lv".to_string())],
            }),
        };
        let ids: Vec<_> = expr.identifiers().into_iter().collect();
        assert_eq!(ids, vec!["atk".to_string(), "lv".to_string()]);
    }

    #[test]
    fn test_function_lookup() {
        assert_eq!(Function::from_name("clamp"), Some(Function::Clamp));
        assert_eq!(Function::from_name("sin"), None);
        assert_eq!(Function::Clamp.arity(), (3, Some(3)));
    }
}
