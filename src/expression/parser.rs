use super::*;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Operator(char),
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
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
            let literal: String = chars[start..i].iter().collect();
            let value = literal.parse::<f64>().map_err(|_| {
                Error::InvalidInput(format!("`{}` is not a valid number", literal))
            })?;
            tokens.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Identifier(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '(' => Token::Open,
                ')' => Token::Close,
                '+' | '-' | '*' | '/' | '^' | '%' => Token::Operator(c),
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "unexpected character `{}` in expression `{}`",
                        c, text
                    )))
                }
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

/// Recursive descent parser over the token stream of one expression.
pub(super) struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub(super) fn new(text: &'a str) -> Result<Self> {
        Ok(Parser {
            text,
            tokens: tokenize(text)?,
            position: 0,
        })
    }

    pub(super) fn parse(mut self) -> Result<Expression> {
        if self.tokens.is_empty() {
            return Err(Error::InvalidInput("empty expression".to_string()));
        }
        let expression = self.additive()?;
        if let Some(token) = self.peek() {
            return Err(self.unexpected(token));
        }
        Ok(expression)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn unexpected(&self, token: &Token) -> Error {
        Error::InvalidInput(format!(
            "unexpected {:?} in expression `{}`",
            token, self.text
        ))
    }

    fn end_of_input(&self) -> Error {
        Error::InvalidInput(format!("unexpected end of expression `{}`", self.text))
    }

    fn binary_op(&self, operators: &[char]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Operator(c)) if operators.contains(c) => Some(match c {
                '+' => BinaryOp::Add,
                '-' => BinaryOp::Subtract,
                '*' => BinaryOp::Multiply,
                '/' => BinaryOp::Divide,
                '%' => BinaryOp::Modulo,
                _ => BinaryOp::Power,
            }),
            _ => None,
        }
    }

    fn additive(&mut self) -> Result<Expression> {
        let mut lhs = self.multiplicative()?;
        while let Some(op) = self.binary_op(&['+', '-']) {
            self.position += 1;
            let rhs = self.multiplicative()?;
            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expression> {
        let mut lhs = self.power()?;
        while let Some(op) = self.binary_op(&['*', '/', '%']) {
            self.position += 1;
            let rhs = self.power()?;
            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn power(&mut self) -> Result<Expression> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.binary_op(&['^']) {
            self.position += 1;
            let rhs = self.unary()?;
            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(Token::Operator('-')) => {
                self.position += 1;
                Ok(Expression::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Operator('+')) => {
                self.position += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expression> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expression::Number(value)),
            Some(Token::Identifier(name)) => {
                let is_call = self.peek() == Some(&Token::Open);
                match (Function::from_name(&name), is_call) {
                    (Some(function), true) => {
                        let argument = self.parenthesized()?;
                        Ok(Expression::Call(function, Box::new(argument)))
                    }
                    (Some(_), false) => Err(Error::InvalidInput(format!(
                        "function `{}` must be called with an argument in `{}`",
                        name, self.text
                    ))),
                    (None, true) => Err(Error::InvalidInput(format!(
                        "unknown function `{}` in `{}`",
                        name, self.text
                    ))),
                    (None, false) => Ok(Expression::Symbol(name)),
                }
            }
            Some(Token::Open) => {
                self.position -= 1;
                self.parenthesized()
            }
            Some(token) => Err(self.unexpected(&token)),
            None => Err(self.end_of_input()),
        }
    }

    fn parenthesized(&mut self) -> Result<Expression> {
        match self.next() {
            Some(Token::Open) => {}
            Some(token) => return Err(self.unexpected(&token)),
            None => return Err(self.end_of_input()),
        }
        let inner = self.additive()?;
        match self.next() {
            Some(Token::Close) => Ok(inner),
            Some(token) => Err(self.unexpected(&token)),
            None => Err(self.end_of_input()),
        }
    }
}
