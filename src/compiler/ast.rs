//! Typed syntax tree produced by the parser.
//!
//! Every node owns its children; trees are built per compilation and
//! dropped after code generation.

/// Binary arithmetic operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
}

/// Execution-context reads usable as integer operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextValue {
    Balance,
    TxValue,
    Time,
    BlockNum,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    /// Storage variable, read with `SLOAD`.
    Identifier(String),
    Context(ContextValue),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// `lhs >= rhs`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    /// `WHEN condition THEN body`
    When {
        condition: Condition,
        body: Box<Statement>,
    },
    /// `STORE key = value`
    Store { key: String, value: Expr },
}

/// A whole contract: statements run in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub statements: Vec<Statement>,
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}
