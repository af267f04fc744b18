//! Formula parser
//!
//! Hand-written tokenizer and recursive-descent parser. Precedence, lowest
//! to highest:
//!
//! ```text
//! ?:  ||  &&  == !=  < <= > >=  + -  * / %  unary - !  ^  primary
//! ```
//!
//! `^` is right-associative and binds tighter than unary minus, so
//! `-2^2 == -4`.

use super::ast::{BinaryOp, Expr, Function, LogicalOp, UnaryOp};
use super::EvalError;

// ============================================================================
// TOKENS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqEq,
    BangEq,
    AndAnd,
    OrOr,
    Question,
    Colon,
    LParen,
    RParen,
    Comma,
    End,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        position,
        message: message.into(),
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            // Optional exponent
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text = &source[start..i];
            let value: f64 = text
                .parse()
                .map_err(|_| syntax(start, format!("invalid number '{}'", text)))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position: start,
            });
            continue;
        }

        if is_ident_start(c) {
            i += 1;
            loop {
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                // Dotted path segment: `a.b`
                if i + 1 < bytes.len() && bytes[i] == b'.' && is_ident_start(bytes[i + 1]) {
                    i += 1;
                    continue;
                }
                break;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(source[start..i].to_string()),
                position: start,
            });
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (kind, width) = match (c, next) {
            (b'<', Some(b'=')) => (TokenKind::LessEq, 2),
            (b'>', Some(b'=')) => (TokenKind::GreaterEq, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::BangEq, 2),
            (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'<', _) => (TokenKind::Less, 1),
            (b'>', _) => (TokenKind::Greater, 1),
            (b'?', _) => (TokenKind::Question, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b',', _) => (TokenKind::Comma, 1),
            _ => {
                let found = source[start..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{}'", found)));
            }
        };
        tokens.push(Token {
            kind,
            position: start,
        });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: source.len(),
    });
    Ok(tokens)
}

// ============================================================================
// PARSER
// ============================================================================

/// Parse formula text into an expression tree
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::expr::{parse, Expr};
///
/// let expr = parse("atk + 50").unwrap();
/// assert!(matches!(expr, Expr::Binary { .. }));
/// assert!(parse("atk +").is_err());
/// ```
pub fn parse(source: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    match parser.peek() {
        TokenKind::End => Ok(expr),
        other => Err(syntax(
            parser.position(),
            format!("unexpected trailing token {:?}", other),
        )),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].position
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if !matches!(kind, TokenKind::End) {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> Result<(), EvalError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(syntax(self.position(), format!("expected {}", what)))
        }
    }

    fn ternary(&mut self) -> Result<Expr, EvalError> {
        let condition = self.or()?;
        if *self.peek() != TokenKind::Question {
            return Ok(condition);
        }
        self.advance();
        let then_branch = self.ternary()?;
        self.expect(TokenKind::Colon, "':' in conditional expression")?;
        let else_branch = self.ternary()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.and()?;
        while *self.peek() == TokenKind::OrOr {
            self.advance();
            let right = self.and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.equality()?;
        while *self.peek() == TokenKind::AndAnd {
            self.advance();
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Equal,
                TokenKind::BangEq => BinaryOp::NotEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEq => BinaryOp::LessOrEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEq => BinaryOp::GreaterOrEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Plus => {
                self.advance();
                return self.unary();
            }
            _ => return self.power(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, EvalError> {
        let base = self.primary()?;
        if *self.peek() == TokenKind::Caret {
            self.advance();
            // Right-associative; exponent may itself be signed
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let position = self.position();
        match self.advance() {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) => {
                if *self.peek() == TokenKind::LParen {
                    self.advance();
                    return self.call(&name);
                }
                match name.as_str() {
                    "true" => Ok(Expr::Number(1.0)),
                    "false" => Ok(Expr::Number(0.0)),
                    _ => Ok(Expr::Ident(name)),
                }
            }
            TokenKind::LParen => {
                let inner = self.ternary()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::End => Err(syntax(position, "unexpected end of expression")),
            other => Err(syntax(position, format!("unexpected token {:?}", other))),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, EvalError> {
        let function =
            Function::from_name(name).ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;

        let mut args = Vec::new();
        if *self.peek() != TokenKind::RParen {
            loop {
                args.push(self.ternary()?);
                if *self.peek() == TokenKind::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' after arguments")?;

        let (min, max) = function.arity();
        let too_many = max.is_some_and(|m| args.len() > m);
        if args.len() < min || too_many {
            let expected = match max {
                Some(m) if m == min => min.to_string(),
                Some(m) => format!("{}..{}", min, m),
                None => format!("at least {}", min),
            };
            return Err(EvalError::Arity {
                function: function.name().to_string(),
                expected,
                actual: args.len(),
            });
        }

        Ok(Expr::Call { function, args })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
