use super::FormulaError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(Operator),
    LParen,
    RParen,
    Comma,
    Colon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Amp,
    Bang,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A token with the char offset it started at, for error messages.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            ':' => {
                i += 1;
                Token::Colon
            }
            '+' => {
                i += 1;
                Token::Op(Operator::Plus)
            }
            '-' => {
                i += 1;
                Token::Op(Operator::Minus)
            }
            '*' => {
                i += 1;
                Token::Op(Operator::Star)
            }
            '/' => {
                i += 1;
                Token::Op(Operator::Slash)
            }
            '^' => {
                i += 1;
                Token::Op(Operator::Caret)
            }
            '&' => {
                i += 1;
                Token::Op(Operator::Amp)
            }
            '=' => {
                // `=` and `==` are both equality
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                }
                Token::Op(Operator::Eq)
            }
            '!' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    Token::Op(Operator::Ne)
                } else {
                    Token::Op(Operator::Bang)
                }
            }
            '<' => {
                i += 1;
                match chars.get(i) {
                    Some('=') => {
                        i += 1;
                        Token::Op(Operator::Le)
                    }
                    Some('>') => {
                        i += 1;
                        Token::Op(Operator::Ne)
                    }
                    _ => Token::Op(Operator::Lt),
                }
            }
            '>' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    Token::Op(Operator::Ge)
                } else {
                    Token::Op(Operator::Gt)
                }
            }
            '"' | '\'' => {
                let (s, next) = read_string(&chars, i)?;
                i = next;
                Token::Str(s)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (n, next) = read_number(&chars, i)?;
                i = next;
                Token::Number(n)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                Token::Ident(chars[start..i].iter().collect())
            }
            other => {
                return Err(FormulaError::Parse {
                    message: format!("unexpected character '{}'", other),
                    position: start,
                });
            }
        };

        tokens.push(Spanned { token, pos: start });
    }

    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> Result<(f64, usize), FormulaError> {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    // exponent part: 1e3, 2.5E-4
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| FormulaError::Parse {
            message: format!("invalid number '{}'", text),
            position: start,
        })
}

/// Reads a quoted string. A doubled quote or a backslash escapes the quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), FormulaError> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut out = String::new();

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(c);
        i += 1;
    }

    Err(FormulaError::Parse {
        message: "unterminated string".to_string(),
        position: start,
    })
}
