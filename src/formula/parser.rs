use super::FormulaError;
use super::lexer::{Operator, Spanned, Token, tokenize};
use crate::column::letters_to_index;

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Sum,
    Average,
    Count,
    CountA,
    Max,
    Min,
    If,
    Round,
    Floor,
    Ceil,
    Abs,
    Sqrt,
    Power,
    Upper,
    Lower,
    Len,
    Left,
    Right,
    Mid,
    And,
    Or,
    Not,
    Today,
    Now,
    Year,
    Month,
    Day,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "SUM" => Some(Function::Sum),
            "AVERAGE" => Some(Function::Average),
            "COUNT" => Some(Function::Count),
            "COUNTA" => Some(Function::CountA),
            "MAX" => Some(Function::Max),
            "MIN" => Some(Function::Min),
            "IF" => Some(Function::If),
            "ROUND" => Some(Function::Round),
            "FLOOR" => Some(Function::Floor),
            "CEIL" => Some(Function::Ceil),
            "ABS" => Some(Function::Abs),
            "SQRT" => Some(Function::Sqrt),
            "POWER" => Some(Function::Power),
            "UPPER" => Some(Function::Upper),
            "LOWER" => Some(Function::Lower),
            "LEN" => Some(Function::Len),
            "LEFT" => Some(Function::Left),
            "RIGHT" => Some(Function::Right),
            "MID" => Some(Function::Mid),
            "AND" => Some(Function::And),
            "OR" => Some(Function::Or),
            "NOT" => Some(Function::Not),
            "TODAY" => Some(Function::Today),
            "NOW" => Some(Function::Now),
            "YEAR" => Some(Function::Year),
            "MONTH" => Some(Function::Month),
            "DAY" => Some(Function::Day),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sum => "SUM",
            Function::Average => "AVERAGE",
            Function::Count => "COUNT",
            Function::CountA => "COUNTA",
            Function::Max => "MAX",
            Function::Min => "MIN",
            Function::If => "IF",
            Function::Round => "ROUND",
            Function::Floor => "FLOOR",
            Function::Ceil => "CEIL",
            Function::Abs => "ABS",
            Function::Sqrt => "SQRT",
            Function::Power => "POWER",
            Function::Upper => "UPPER",
            Function::Lower => "LOWER",
            Function::Len => "LEN",
            Function::Left => "LEFT",
            Function::Right => "RIGHT",
            Function::Mid => "MID",
            Function::And => "AND",
            Function::Or => "OR",
            Function::Not => "NOT",
            Function::Today => "TODAY",
            Function::Now => "NOW",
            Function::Year => "YEAR",
            Function::Month => "MONTH",
            Function::Day => "DAY",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::Sum
                | Function::Average
                | Function::Count
                | Function::CountA
                | Function::Max
                | Function::Min
        )
    }
}

/// Parsed formula.
///
/// Cell references keep the 1-based row number as written; the interpreter
/// maps it to a row index and treats anything out of range as 0.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    CellRef {
        column: Option<usize>,
        row: u64,
    },
    /// `A:C` (every row) or `A1:C10`.
    Range {
        first_column: Option<usize>,
        last_column: Option<usize>,
        rows: Option<(u64, u64)>,
    },
    Variable(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::EmptyFormula);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::Parse {
            message: format!("formula longer than {} tokens", MAX_TOKENS),
            position: tokens[MAX_TOKENS].pos,
        });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
        depth: 0,
    };
    let expr = parser.comparison()?;
    if let Some(extra) = parser.peek() {
        return Err(FormulaError::Parse {
            message: format!("unexpected token {:?}", extra.token),
            position: extra.pos,
        });
    }
    Ok(expr)
}

const MAX_DEPTH: usize = 200;
const MAX_TOKENS: usize = 4096;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |s| s.pos)
    }

    fn error(&self, message: impl Into<String>) -> FormulaError {
        FormulaError::Parse {
            message: message.into(),
            position: self.position(),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), FormulaError> {
        if self.peek_token() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn binary_op(&self, table: &[(Operator, BinaryOp)]) -> Option<BinaryOp> {
        match self.peek_token() {
            Some(Token::Op(op)) => table.iter().find(|(o, _)| o == op).map(|(_, b)| *b),
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("formula nested too deeply"));
        }
        let expr = self.comparison_inner();
        self.depth -= 1;
        expr
    }

    /// comparison := concat (cmp concat)*
    fn comparison_inner(&mut self) -> Result<Expr, FormulaError> {
        const OPS: &[(Operator, BinaryOp)] = &[
            (Operator::Eq, BinaryOp::Eq),
            (Operator::Ne, BinaryOp::Ne),
            (Operator::Lt, BinaryOp::Lt),
            (Operator::Le, BinaryOp::Le),
            (Operator::Gt, BinaryOp::Gt),
            (Operator::Ge, BinaryOp::Ge),
        ];
        let mut lhs = self.concat()?;
        while let Some(op) = self.binary_op(OPS) {
            self.pos += 1;
            let rhs = self.concat()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// concat := additive ('&' additive)*
    fn concat(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.additive()?;
        while let Some(op) = self.binary_op(&[(Operator::Amp, BinaryOp::Concat)]) {
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        const OPS: &[(Operator, BinaryOp)] =
            &[(Operator::Plus, BinaryOp::Add), (Operator::Minus, BinaryOp::Sub)];
        let mut lhs = self.multiplicative()?;
        while let Some(op) = self.binary_op(OPS) {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        const OPS: &[(Operator, BinaryOp)] =
            &[(Operator::Star, BinaryOp::Mul), (Operator::Slash, BinaryOp::Div)];
        let mut lhs = self.unary()?;
        while let Some(op) = self.binary_op(OPS) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// unary := ('-' | '+' | '!') unary | power
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek_token() {
            Some(Token::Op(Operator::Minus)) => Some(UnaryOp::Neg),
            Some(Token::Op(Operator::Plus)) => Some(UnaryOp::Plus),
            Some(Token::Op(Operator::Bang)) => Some(UnaryOp::Not),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(self.error("formula nested too deeply"));
                }
                let expr = self.unary();
                self.depth -= 1;
                let expr = expr?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            None => self.power(),
        }
    }

    /// power := primary ('^' unary)?   (right associative)
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.peek_token() == Some(&Token::Op(Operator::Caret)) {
            self.pos += 1;
            self.depth += 1;
            if self.depth > MAX_DEPTH {
                return Err(self.error("formula nested too deeply"));
            }
            let exponent = self.unary();
            self.depth -= 1;
            return Ok(binary(BinaryOp::Pow, base, exponent?));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let Some(tok) = self.next() else {
            return Err(self.error("unexpected end of formula"));
        };
        match tok.token {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Text(s))),
            Token::LParen => {
                let inner = self.comparison()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => self.identifier(name, tok.pos),
            other => Err(FormulaError::Parse {
                message: format!("unexpected token {:?}", other),
                position: tok.pos,
            }),
        }
    }

    fn identifier(&mut self, name: String, pos: usize) -> Result<Expr, FormulaError> {
        if self.peek_token() == Some(&Token::LParen) {
            self.pos += 1;
            let function =
                Function::from_name(&name).ok_or(FormulaError::UnknownFunction(name.clone()))?;
            let args = self.arguments()?;
            return Ok(Expr::Call { function, args });
        }

        if self.peek_token() == Some(&Token::Colon) {
            self.pos += 1;
            let end = match self.next() {
                Some(Spanned {
                    token: Token::Ident(end),
                    ..
                }) => end,
                _ => return Err(self.error("expected range end")),
            };
            return range(&name, &end).ok_or(FormulaError::Parse {
                message: format!("invalid range '{}:{}'", name, end),
                position: pos,
            });
        }

        if let Some((letters, row)) = split_cell_ref(&name) {
            return Ok(Expr::CellRef {
                column: letters_to_index(letters),
                row,
            });
        }

        if name.eq_ignore_ascii_case("TRUE") {
            return Ok(Expr::Literal(Literal::Bool(true)));
        }
        if name.eq_ignore_ascii_case("FALSE") {
            return Ok(Expr::Literal(Literal::Bool(false)));
        }

        Ok(Expr::Variable(name))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.peek_token() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            match self.next().map(|s| s.token) {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Splits `B12` into (`B`, 12). Anything else (letters only, digits first,
/// trailing letters) is not a cell reference.
pub fn split_cell_ref(name: &str) -> Option<(&str, u64)> {
    let digits_at = name.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = name.split_at(digits_at);
    if letters.is_empty()
        || !letters.chars().all(|c| c.is_ascii_alphabetic())
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    // saturate absurd row numbers; they resolve as out of range
    let row = digits.parse::<u64>().unwrap_or(u64::MAX);
    Some((letters, row))
}

fn range(start: &str, end: &str) -> Option<Expr> {
    let is_letters = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic());
    if is_letters(start) && is_letters(end) {
        return Some(Expr::Range {
            first_column: letters_to_index(start),
            last_column: letters_to_index(end),
            rows: None,
        });
    }
    let (start_letters, start_row) = split_cell_ref(start)?;
    let (end_letters, end_row) = split_cell_ref(end)?;
    Some(Expr::Range {
        first_column: letters_to_index(start_letters),
        last_column: letters_to_index(end_letters),
        rows: Some((start_row.min(end_row), start_row.max(end_row))),
    })
}
