//! Lexer for operand expressions.
//!
//! Operands are what sits on either side of a comparison and every projection-list
//! item: literals, columns, `var.attr`, aggregate calls and `+ - * /` arithmetic.

use crate::error::{EmfError, EmfResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals and identifiers
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),

    // Operators
    Plus,  // +
    Minus, // -
    Star,  // *
    Slash, // /

    // Delimiters
    Dot,        // .
    Comma,      // ,
    LeftParen,  // (
    RightParen, // )

    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current_char, Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    /// Letters, digits and `_`. All-digit words are numbers; anything else (`1_sum_quant`
    /// included) is an identifier.
    fn read_word(&mut self) -> EmfResult<Token> {
        let mut word = String::new();
        while let Some(c) = self.current_char {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if !word.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Token::Identifier(word));
        }

        // `1.state` is a grouping variable reference, `1.5` is a float.
        if self.current_char == Some('.') && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            word.push('.');
            self.advance();
            while let Some(c) = self.current_char {
                if c.is_ascii_digit() {
                    word.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            return word
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| EmfError::parse(format!("Invalid number: {}", word)));
        }

        word.parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| EmfError::parse(format!("Invalid number: {}", word)))
    }

    fn read_string(&mut self) -> EmfResult<Token> {
        self.advance(); // consume opening quote
        let mut value = String::new();
        loop {
            match self.current_char {
                Some('\'') if self.peek() == Some('\'') => {
                    value.push('\'');
                    self.advance();
                    self.advance();
                }
                Some('\'') => {
                    self.advance();
                    return Ok(Token::String(value));
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
                None => {
                    return Err(EmfError::parse(format!(
                        "Unterminated string literal '{}",
                        value
                    )))
                }
            }
        }
    }

    pub fn next_token(&mut self) -> EmfResult<Token> {
        self.skip_whitespace();

        let Some(c) = self.current_char else {
            return Ok(Token::Eof);
        };

        let token = match c {
            '\'' => return self.read_string(),
            c if c.is_alphanumeric() || c == '_' => return self.read_word(),
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            other => {
                return Err(EmfError::parse(format!(
                    "Unexpected character '{}' at position {}",
                    other, self.position
                )))
            }
        };
        self.advance();
        Ok(token)
    }

    pub fn tokenize(&mut self) -> EmfResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }
}
