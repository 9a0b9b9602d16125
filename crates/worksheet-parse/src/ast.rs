//! Expression AST (§4.C): one closed enum, `selectors()` as a tree-walk
//! that collects every dotted selector path appearing in an expression.

use worksheet_common::{RoundMode, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

/// A `round <mode> <scale>` suffix attached to a `/` or `*` node (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounding {
    pub mode: RoundMode,
    pub scale: u8,
}

/// An expression node (§4.C). `External` is a placeholder left by the
/// parser for a `{ external }` clause; the definitions builder (§4.E)
/// replaces it with `Plugin` once a `ComputedBy` is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Selector(Vec<String>),
    UnaryOp(UnOp, Box<Expr>),
    BinaryOp(BinOp, Box<Expr>, Box<Expr>, Option<Rounding>),
    Call(String, Vec<Expr>, Option<Rounding>),
    Return(Box<Expr>),
    External,
}

impl Expr {
    /// The free-variable set: every selector path transitively
    /// referenced by this expression (§4.C, feeds §4.E's dependency
    /// graph construction).
    pub fn selectors(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors(&self, out: &mut Vec<Vec<String>>) {
        match self {
            Expr::Literal(_) | Expr::External => {}
            Expr::Selector(path) => out.push(path.clone()),
            Expr::UnaryOp(_, inner) => inner.collect_selectors(out),
            Expr::BinaryOp(_, l, r, _) => {
                l.collect_selectors(out);
                r.collect_selectors(out);
            }
            Expr::Call(_, args, _) => {
                for a in args {
                    a.collect_selectors(out);
                }
            }
            Expr::Return(inner) => inner.collect_selectors(out),
        }
    }
}

impl BinOp {
    /// Lowest = 1, per §4.B's precedence table.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::And | BinOp::Or => 1,
            BinOp::Eq | BinOp::Ne | BinOp::Gt | BinOp::Ge | BinOp::Lt | BinOp::Le => 2,
            BinOp::Add | BinOp::Sub => 3,
            BinOp::Mul => 4,
            BinOp::Div => 5,
        }
    }

    pub fn from_token_text(text: &str) -> Option<BinOp> {
        Some(match text {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_walk_nested_nodes() {
        let expr = Expr::BinaryOp(
            BinOp::Add,
            Box::new(Expr::Selector(vec!["a".into()])),
            Box::new(Expr::Call(
                "sum".into(),
                vec![Expr::Selector(vec!["b".into(), "total".into()])],
                None,
            )),
            None,
        );
        let sels = expr.selectors();
        assert_eq!(sels, vec![vec!["a".to_string()], vec!["b".into(), "total".into()]]);
    }
}
