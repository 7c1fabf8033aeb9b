//! Tokenizer for build files.

use std::sync::Arc;

use super::ParseError;
use super::ast::Pos;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
  Ident(String),
  String(String),
  Int(i64),
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  LParen,
  RParen,
  Colon,
  Comma,
  Equals,
  PlusEquals,
  Plus,
  Eof,
}

impl Token {
  pub(crate) fn describe(&self) -> String {
    match self {
      Token::Ident(name) => format!("identifier {:?}", name),
      Token::String(_) => "string".to_string(),
      Token::Int(_) => "integer".to_string(),
      Token::LBrace => "'{'".to_string(),
      Token::RBrace => "'}'".to_string(),
      Token::LBracket => "'['".to_string(),
      Token::RBracket => "']'".to_string(),
      Token::LParen => "'('".to_string(),
      Token::RParen => "')'".to_string(),
      Token::Colon => "':'".to_string(),
      Token::Comma => "','".to_string(),
      Token::Equals => "'='".to_string(),
      Token::PlusEquals => "'+='".to_string(),
      Token::Plus => "'+'".to_string(),
      Token::Eof => "end of file".to_string(),
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
  pub token: Token,
  pub pos: Pos,
}

pub(crate) struct Lexer {
  file: Arc<str>,
  chars: Vec<char>,
  idx: usize,
  line: u32,
  column: u32,
}

impl Lexer {
  pub(crate) fn new(file: Arc<str>, src: &str) -> Self {
    Self {
      file,
      chars: src.chars().collect(),
      idx: 0,
      line: 1,
      column: 1,
    }
  }

  pub(crate) fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    loop {
      self.skip_trivia()?;
      let pos = self.pos();
      let Some(c) = self.peek() else {
        tokens.push(Spanned { token: Token::Eof, pos });
        return Ok(tokens);
      };

      let token = match c {
        '{' => self.single(Token::LBrace),
        '}' => self.single(Token::RBrace),
        '[' => self.single(Token::LBracket),
        ']' => self.single(Token::RBracket),
        '(' => self.single(Token::LParen),
        ')' => self.single(Token::RParen),
        ':' => self.single(Token::Colon),
        ',' => self.single(Token::Comma),
        '=' => self.single(Token::Equals),
        '+' => {
          self.bump();
          if self.peek() == Some('=') {
            self.bump();
            Token::PlusEquals
          } else {
            Token::Plus
          }
        }
        '"' => Token::String(self.quoted_string()?),
        '`' => Token::String(self.raw_string()?),
        '-' | '0'..='9' => Token::Int(self.integer()?),
        c if c == '_' || c.is_ascii_alphabetic() => Token::Ident(self.ident()),
        other => return Err(ParseError::new(pos, format!("unexpected character {:?}", other))),
      };
      tokens.push(Spanned { token, pos });
    }
  }

  fn pos(&self) -> Pos {
    Pos {
      file: self.file.clone(),
      line: self.line,
      column: self.column,
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.idx).copied()
  }

  fn peek_next(&self) -> Option<char> {
    self.chars.get(self.idx + 1).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.chars.get(self.idx).copied()?;
    self.idx += 1;
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn single(&mut self, token: Token) -> Token {
    self.bump();
    token
  }

  fn skip_trivia(&mut self) -> Result<(), ParseError> {
    loop {
      match (self.peek(), self.peek_next()) {
        (Some(c), _) if c.is_whitespace() => {
          self.bump();
        }
        (Some('/'), Some('/')) => {
          while let Some(c) = self.peek() {
            if c == '\n' {
              break;
            }
            self.bump();
          }
        }
        (Some('/'), Some('*')) => {
          let start = self.pos();
          self.bump();
          self.bump();
          loop {
            match (self.peek(), self.peek_next()) {
              (Some('*'), Some('/')) => {
                self.bump();
                self.bump();
                break;
              }
              (Some(_), _) => {
                self.bump();
              }
              (None, _) => return Err(ParseError::new(start, "unterminated comment")),
            }
          }
        }
        _ => return Ok(()),
      }
    }
  }

  fn ident(&mut self) -> String {
    let mut out = String::new();
    while let Some(c) = self.peek() {
      if c == '_' || c.is_ascii_alphanumeric() {
        out.push(c);
        self.bump();
      } else {
        break;
      }
    }
    out
  }

  fn integer(&mut self) -> Result<i64, ParseError> {
    let pos = self.pos();
    let mut text = String::new();
    if self.peek() == Some('-') {
      text.push('-');
      self.bump();
    }
    while let Some(c) = self.peek() {
      if c.is_ascii_digit() {
        text.push(c);
        self.bump();
      } else {
        break;
      }
    }
    text
      .parse::<i64>()
      .map_err(|e| ParseError::new(pos, format!("invalid integer {:?}: {}", text, e)))
  }

  fn raw_string(&mut self) -> Result<String, ParseError> {
    let start = self.pos();
    self.bump();
    let mut out = String::new();
    loop {
      match self.bump() {
        Some('`') => return Ok(out),
        Some(c) => out.push(c),
        None => return Err(ParseError::new(start, "unterminated raw string")),
      }
    }
  }

  fn quoted_string(&mut self) -> Result<String, ParseError> {
    let start = self.pos();
    self.bump();
    let mut out = String::new();
    loop {
      let pos = self.pos();
      match self.bump() {
        Some('"') => return Ok(out),
        Some('\n') | None => return Err(ParseError::new(start, "unterminated string")),
        Some('\\') => {
          let escaped = match self.bump() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('a') => '\x07',
            Some('b') => '\x08',
            Some('f') => '\x0c',
            Some('v') => '\x0b',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('x') => self.hex_escape(2, &pos)?,
            Some('u') => self.hex_escape(4, &pos)?,
            Some('U') => self.hex_escape(8, &pos)?,
            other => {
              return Err(ParseError::new(pos, format!("invalid escape sequence \\{}", other.unwrap_or(' '))));
            }
          };
          out.push(escaped);
        }
        Some(c) => out.push(c),
      }
    }
  }

  fn hex_escape(&mut self, digits: usize, pos: &Pos) -> Result<char, ParseError> {
    let mut value = 0u32;
    for _ in 0..digits {
      let digit = self
        .bump()
        .and_then(|c| c.to_digit(16))
        .ok_or_else(|| ParseError::new(pos.clone(), "invalid hex escape"))?;
      value = value * 16 + digit;
    }
    char::from_u32(value).ok_or_else(|| ParseError::new(pos.clone(), format!("invalid code point {:#x}", value)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lex(src: &str) -> Vec<Token> {
    Lexer::new("t.bp".into(), src)
      .tokenize()
      .unwrap()
      .into_iter()
      .map(|s| s.token)
      .collect()
  }

  #[test]
  fn tokens_and_comments() {
    let tokens = lex("foo { // comment\n  a: -3, /* block */ b += `raw\\n` }");
    assert_eq!(
      tokens,
      vec![
        Token::Ident("foo".into()),
        Token::LBrace,
        Token::Ident("a".into()),
        Token::Colon,
        Token::Int(-3),
        Token::Comma,
        Token::Ident("b".into()),
        Token::PlusEquals,
        Token::String("raw\\n".into()),
        Token::RBrace,
        Token::Eof,
      ]
    );
  }

  #[test]
  fn string_escapes() {
    assert_eq!(lex(r#""a\tb\"c\x41""#)[0], Token::String("a\tb\"cA".into()));
  }

  #[test]
  fn positions_track_lines() {
    let spans = Lexer::new("t.bp".into(), "a\n  b").tokenize().unwrap();
    assert_eq!((spans[1].pos.line, spans[1].pos.column), (2, 3));
  }

  #[test]
  fn unterminated_string_is_an_error() {
    let err = Lexer::new("t.bp".into(), "\"abc").tokenize().unwrap_err();
    assert_eq!(err.err, "unterminated string");
  }
}
