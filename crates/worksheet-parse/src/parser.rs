//! Recursive-descent parser for worksheet/enum definitions (§4.B).
//!
//! Field and clause parsing is straightforward recursive descent; binary
//! expressions are built as a flat operand/operator list and then folded
//! by a local-maximum precedence sweep over this DSL's five precedence
//! levels.

use worksheet_common::{Number, Value};

use crate::ast::{BinOp, Expr, Rounding, UnOp};
use crate::tokenizer::{tokenize, Token, TokenKind};
use crate::types::{ParseError, TypeRef};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedField {
    pub index: i64,
    pub name: String,
    pub ty: TypeRef,
    pub computed_by: Option<Expr>,
    pub constrained_by: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWorksheet {
    pub name: String,
    pub fields: Vec<ParsedField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEnum {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDef {
    Worksheet(ParsedWorksheet),
    Enum(ParsedEnum),
}

/// Parse a whole source file into its top-level worksheet/enum
/// definitions (§4.B grammar's `file` rule). Only the `type NAME
/// worksheet {…}` / `type NAME enum {…}` surface is accepted — the
/// legacy `worksheet NAME {…}` form noted in §9 is not carried (see
/// DESIGN.md).
pub fn parse_source(source: &str) -> Result<Vec<ParsedDef>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_file()
}

fn binop_from_kind(kind: TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::NotEq => BinOp::Ne,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::Ge => BinOp::Ge,
        TokenKind::Lt => BinOp::Lt,
        TokenKind::Le => BinOp::Le,
        TokenKind::AndAnd => BinOp::And,
        TokenKind::OrOr => BinOp::Or,
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            pos: self.peek().start,
        }
    }

    fn expect_kind(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err(format!(
                "expected {kind}, found {}",
                self.peek().kind
            )))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        if self.peek().is_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{word}', found {}", self.peek().text)))
        }
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek().is_keyword(word)
    }

    fn parse_file(&mut self) -> Result<Vec<ParsedDef>, ParseError> {
        let mut defs = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            self.expect_keyword("type")?;
            let name = self.expect_kind(TokenKind::Ident)?.text;
            if self.at_keyword("worksheet") {
                defs.push(ParsedDef::Worksheet(self.parse_worksheet_body(name)?));
            } else if self.at_keyword("enum") {
                defs.push(ParsedDef::Enum(self.parse_enum_body(name)?));
            } else {
                return Err(self.err("expecting 'worksheet' or 'enum'"));
            }
        }
        Ok(defs)
    }

    fn parse_enum_body(&mut self, name: String) -> Result<ParsedEnum, ParseError> {
        self.expect_keyword("enum")?;
        self.expect_kind(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let text = self.expect_kind(TokenKind::Text)?.text;
            members.push(text);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_kind(TokenKind::RBrace)?;
        Ok(ParsedEnum { name, members })
    }

    fn parse_worksheet_body(&mut self, name: String) -> Result<ParsedWorksheet, ParseError> {
        self.expect_keyword("worksheet")?;
        self.expect_kind(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            fields.push(self.parse_field()?);
        }
        self.expect_kind(TokenKind::RBrace)?;
        Ok(ParsedWorksheet { name, fields })
    }

    fn parse_field(&mut self) -> Result<ParsedField, ParseError> {
        let index_tok = self.expect_kind(TokenKind::Number)?;
        let index: i64 = index_tok
            .text
            .parse()
            .map_err(|_| self.err(format!("invalid field index '{}'", index_tok.text)))?;
        self.expect_kind(TokenKind::Colon)?;
        let name = self.expect_kind(TokenKind::Ident)?.text;
        let ty = self.parse_type()?;

        let mut computed_by = None;
        let mut constrained_by = None;
        if self.at_keyword("computed_by") {
            self.advance();
            computed_by = Some(self.parse_clause_body()?);
        } else if self.at_keyword("constrained_by") {
            self.advance();
            constrained_by = Some(self.parse_clause_body()?);
        }

        Ok(ParsedField {
            index,
            name,
            ty,
            computed_by,
            constrained_by,
        })
    }

    fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
        if self.at_keyword("text") {
            self.advance();
            Ok(TypeRef::Text)
        } else if self.at_keyword("bool") {
            self.advance();
            Ok(TypeRef::Bool)
        } else if self.at_keyword("undefined") {
            self.advance();
            Ok(TypeRef::Undefined)
        } else if self.at_keyword("number") {
            self.advance();
            self.expect_kind(TokenKind::LBracket)?;
            let scale_tok = self.expect_kind(TokenKind::Number)?;
            let scale: u32 = scale_tok
                .text
                .parse()
                .map_err(|_| self.err(format!("invalid number scale '{}'", scale_tok.text)))?;
            if scale > 32 {
                return Err(self.err(format!("number scale {scale} exceeds maximum of 32")));
            }
            self.expect_kind(TokenKind::RBracket)?;
            Ok(TypeRef::Number(scale as u8))
        } else if self.peek().kind == TokenKind::LBracket {
            self.advance();
            self.expect_kind(TokenKind::RBracket)?;
            let inner = self.parse_type()?;
            Ok(TypeRef::Slice(Box::new(inner)))
        } else if self.peek().kind == TokenKind::Ident {
            Ok(TypeRef::Named(self.advance().text))
        } else {
            Err(self.err("expecting a type"))
        }
    }

    fn parse_clause_body(&mut self) -> Result<Expr, ParseError> {
        self.expect_kind(TokenKind::LBrace)?;
        let stmt = self.parse_stmt()?;
        self.expect_kind(TokenKind::RBrace)?;
        Ok(stmt)
    }

    fn parse_stmt(&mut self) -> Result<Expr, ParseError> {
        if self.at_keyword("external") {
            self.advance();
            Ok(Expr::External)
        } else {
            self.expect_keyword("return")?;
            let expr = self.parse_expr()?;
            Ok(Expr::Return(Box::new(expr)))
        }
    }

    fn parse_rounding(&mut self) -> Result<Rounding, ParseError> {
        self.expect_keyword("round")?;
        let mode_tok = self.advance();
        let mode = worksheet_common::RoundMode::parse(&mode_tok.text)
            .ok_or_else(|| self.err(format!("expected rounding mode, found '{}'", mode_tok.text)))?;
        let scale_tok = self.expect_kind(TokenKind::Number)?;
        let scale: u32 = scale_tok
            .text
            .parse()
            .map_err(|_| self.err(format!("invalid rounding scale '{}'", scale_tok.text)))?;
        if scale > 32 {
            return Err(self.err(format!("rounding scale {scale} exceeds maximum of 32")));
        }
        Ok(Rounding {
            mode,
            scale: scale as u8,
        })
    }

    fn collect_rounding_suffixes(&mut self) -> Result<Vec<Rounding>, ParseError> {
        let mut out = Vec::new();
        while self.at_keyword("round") {
            out.push(self.parse_rounding()?);
        }
        Ok(out)
    }

    /// `expr := ... | expr binop expr rounding*`, folded by the §4.B
    /// local-maximum sweep.
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut operands = vec![self.parse_unary()?];
        let mut ops: Vec<BinOp> = Vec::new();
        let mut suffixes: Vec<Vec<Rounding>> = Vec::new();

        loop {
            let Some(op) = binop_from_kind(self.peek().kind) else {
                break;
            };
            self.advance();
            operands.push(self.parse_unary()?);
            ops.push(op);
            suffixes.push(self.collect_rounding_suffixes()?);
        }

        Ok(fold_operators(operands, ops, suffixes))
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek().kind == TokenKind::Bang {
            self.advance();
            let inner = self.parse_unary()?;
            Ok(Expr::UnaryOp(UnOp::Not, Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::Number => {
                let tok = self.advance();
                Ok(Expr::Literal(Value::Number(parse_number_literal(
                    &tok.text, tok.start,
                )?)))
            }
            TokenKind::Text => {
                let tok = self.advance();
                Ok(Expr::Literal(Value::Text(tok.text)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_kind(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Keyword if self.at_keyword("true") => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::Keyword if self.at_keyword("false") => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::Keyword if self.at_keyword("undefined") => {
                self.advance();
                Ok(Expr::Literal(Value::Undefined))
            }
            TokenKind::Ident => {
                let name = self.advance().text;
                if self.peek().kind == TokenKind::LParen {
                    self.parse_call(name)
                } else {
                    let mut path = vec![name];
                    while self.peek().kind == TokenKind::Dot {
                        self.advance();
                        path.push(self.expect_kind(TokenKind::Ident)?.text);
                    }
                    Ok(Expr::Selector(path))
                }
            }
            _ => Err(self.err("expecting expression")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ParseError> {
        self.expect_kind(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::RParen)?;
        let mut suffixes = self.collect_rounding_suffixes()?;
        let rounding = if suffixes.is_empty() {
            None
        } else {
            Some(suffixes.remove(0))
        };
        let mut node = Expr::Call(name, args, rounding);
        for extra in suffixes {
            node = wrap_plus_zero_round(node, extra);
        }
        Ok(node)
    }
}

fn wrap_plus_zero_round(expr: Expr, rounding: Rounding) -> Expr {
    Expr::BinaryOp(
        BinOp::Add,
        Box::new(expr),
        Box::new(Expr::Literal(Value::Number(Number::new(0, 0)))),
        Some(rounding),
    )
}

/// Local-maximum precedence sweep (§4.B): repeatedly fold the operator
/// whose precedence is `>=` both neighbors (treating out-of-range
/// neighbors as satisfied), left-associative at equal precedence since
/// the leftmost qualifying maximum is chosen each pass.
fn fold_operators(
    mut operands: Vec<Expr>,
    mut ops: Vec<BinOp>,
    mut suffixes: Vec<Vec<Rounding>>,
) -> Expr {
    while !ops.is_empty() {
        let mut fold_at = 0;
        for i in 0..ops.len() {
            let left_ok = i == 0 || ops[i - 1].precedence() <= ops[i].precedence();
            let right_ok = i + 1 >= ops.len() || ops[i].precedence() >= ops[i + 1].precedence();
            if left_ok && right_ok {
                fold_at = i;
                break;
            }
        }

        let left = operands.remove(fold_at);
        let right = operands.remove(fold_at);
        let op = ops.remove(fold_at);
        let mut suffix = suffixes.remove(fold_at);

        let first = if suffix.is_empty() {
            None
        } else {
            Some(suffix.remove(0))
        };
        let mut node = Expr::BinaryOp(op, Box::new(left), Box::new(right), first);
        for extra in suffix {
            node = wrap_plus_zero_round(node, extra);
        }
        operands.insert(fold_at, node);
    }
    operands.into_iter().next().expect("at least one operand")
}

/// Parse a number token's text (already `_`-stripped by the tokenizer,
/// possibly `%`-suffixed) into a `Number`. A trailing `%` increases the
/// scale by 2 without altering the digit string (§4.B).
fn parse_number_literal(text: &str, pos: usize) -> Result<Number, ParseError> {
    let (digits, percent) = match text.strip_suffix('%') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    let mut scale = frac_part.len() as u32;
    if percent {
        scale += 2;
    }
    if scale > 32 {
        return Err(ParseError {
            message: format!("number scale {scale} exceeds maximum of 32"),
            pos,
        });
    }
    let combined = format!("{int_part}{frac_part}");
    let value: i64 = combined
        .parse()
        .map_err(|_| ParseError {
            message: format!("invalid number literal '{text}'"),
            pos,
        })?;
    Ok(Number::new(value, scale as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_worksheet() {
        let src = r#"
            type simple worksheet {
              1:name text constrained_by { return name == "Alex" || name == "Wilson" }
              2:age  number[0]
            }
        "#;
        let defs = parse_source(src).unwrap();
        assert_eq!(defs.len(), 1);
        let ParsedDef::Worksheet(ws) = &defs[0] else {
            panic!("expected worksheet");
        };
        assert_eq!(ws.name, "simple");
        assert_eq!(ws.fields.len(), 2);
        assert!(ws.fields[0].constrained_by.is_some());
    }

    #[test]
    fn parses_enum() {
        let src = r#"type team_member enum { "pratik", "jane", "alex" }"#;
        let defs = parse_source(src).unwrap();
        let ParsedDef::Enum(e) = &defs[0] else {
            panic!("expected enum");
        };
        assert_eq!(e.members, vec!["pratik", "jane", "alex"]);
    }

    #[test]
    fn precedence_fold_binds_mul_tighter_than_add() {
        let src = r#"
            type t worksheet {
              1:x number[0] computed_by { return 1 + 2 * 3 }
            }
        "#;
        let defs = parse_source(src).unwrap();
        let ParsedDef::Worksheet(ws) = &defs[0] else {
            panic!()
        };
        let Some(Expr::Return(inner)) = ws.fields[0].computed_by.clone().map(|e| e) else {
            panic!()
        };
        match *inner {
            Expr::BinaryOp(BinOp::Add, _, right, _) => {
                assert!(matches!(*right, Expr::BinaryOp(BinOp::Mul, _, _, _)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn division_carries_rounding_suffix() {
        let src = r#"
            type t worksheet {
              1:x number[4] computed_by { return 7 / 2.22 round half 4 }
            }
        "#;
        let defs = parse_source(src).unwrap();
        let ParsedDef::Worksheet(ws) = &defs[0] else {
            panic!()
        };
        let Some(Expr::Return(inner)) = ws.fields[0].computed_by.clone() else {
            panic!()
        };
        match *inner {
            Expr::BinaryOp(BinOp::Div, _, _, Some(r)) => {
                assert_eq!(r.scale, 4);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn percent_suffix_bumps_scale_by_two() {
        let n = parse_number_literal("5%", 0).unwrap();
        assert_eq!(n.scale(), 2);
        assert_eq!(n.value(), 5);
    }
}
