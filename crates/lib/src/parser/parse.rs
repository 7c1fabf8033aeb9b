//! Recursive descent parser over the token stream.
//!
//! Variable references are resolved while parsing: every [`Expression::Variable`]
//! captures the value the variable had at the point of reference, and every
//! [`Expression::Operator`] carries its folded result.

use std::collections::HashMap;

use super::ParseError;
use super::ast::{
  AssignOp, Assignment, Definition, Expression, File, List, Map, ModuleDef, Operator, Pos, Property, Variable,
};
use super::lexer::{Spanned, Token};
use crate::consts::MAX_ERRORS;

struct Binding {
  value: Expression,
  pos: Pos,
  referenced: bool,
}

/// Raised to unwind out of a definition after a syntax error.
struct Abort;

pub(crate) struct Parser {
  tokens: Vec<Spanned>,
  idx: usize,
  scope: HashMap<String, Binding>,
  errors: Vec<ParseError>,
}

impl Parser {
  pub(crate) fn new(tokens: Vec<Spanned>) -> Self {
    Self {
      tokens,
      idx: 0,
      scope: HashMap::new(),
      errors: Vec::new(),
    }
  }

  pub(crate) fn parse_file(mut self, name: &str) -> Result<File, Vec<ParseError>> {
    let mut defs = Vec::new();
    while self.peek() != &Token::Eof {
      match self.definition() {
        Ok(Some(def)) => defs.push(def),
        Ok(None) => {}
        Err(Abort) => break,
      }
      if self.errors.len() >= MAX_ERRORS {
        break;
      }
    }

    if self.errors.is_empty() {
      Ok(File {
        name: name.to_string(),
        defs,
      })
    } else {
      self.errors.truncate(MAX_ERRORS);
      Err(self.errors)
    }
  }

  fn peek(&self) -> &Token {
    &self.tokens[self.idx.min(self.tokens.len() - 1)].token
  }

  fn pos(&self) -> Pos {
    self.tokens[self.idx.min(self.tokens.len() - 1)].pos.clone()
  }

  fn advance(&mut self) -> Spanned {
    let tok = self.tokens[self.idx.min(self.tokens.len() - 1)].clone();
    if self.idx < self.tokens.len() - 1 {
      self.idx += 1;
    }
    tok
  }

  fn syntax_error(&mut self, expected: &str) -> Abort {
    let pos = self.pos();
    let found = self.peek().describe();
    self.errors.push(ParseError::new(pos, format!("expected {}, found {}", expected, found)));
    Abort
  }

  fn expect(&mut self, token: Token, expected: &str) -> Result<Pos, Abort> {
    if self.peek() == &token {
      Ok(self.advance().pos)
    } else {
      Err(self.syntax_error(expected))
    }
  }

  fn ident(&mut self) -> Result<(String, Pos), Abort> {
    match self.peek().clone() {
      Token::Ident(name) => {
        let pos = self.advance().pos;
        Ok((name, pos))
      }
      _ => Err(self.syntax_error("identifier")),
    }
  }

  fn definition(&mut self) -> Result<Option<Definition>, Abort> {
    let (name, name_pos) = self.ident()?;
    match self.peek() {
      Token::LBrace => {
        let map = self.map()?;
        Ok(Some(Definition::Module(ModuleDef {
          type_name: name,
          type_pos: name_pos,
          map,
        })))
      }
      Token::Equals => {
        self.advance();
        let value = self.expression()?;
        Ok(self.assign(name, name_pos, AssignOp::Set, value))
      }
      Token::PlusEquals => {
        self.advance();
        let value = self.expression()?;
        Ok(self.assign(name, name_pos, AssignOp::Append, value))
      }
      _ => Err(self.syntax_error("'{', '=' or '+='")),
    }
  }

  fn assign(&mut self, name: String, name_pos: Pos, op: AssignOp, value: Expression) -> Option<Definition> {
    match op {
      AssignOp::Set => {
        if let Some(prev) = self.scope.get(&name) {
          let msg = format!("variable already set, previous assignment: {}", prev.pos);
          self.errors.push(ParseError::new(name_pos, msg));
          return None;
        }
        self.scope.insert(
          name.clone(),
          Binding {
            value: value.clone(),
            pos: name_pos.clone(),
            referenced: false,
          },
        );
      }
      AssignOp::Append => {
        let Some(prev) = self.scope.get(&name) else {
          let msg = format!("modified non-existent variable {:?} with +=", name);
          self.errors.push(ParseError::new(name_pos, msg));
          return None;
        };
        if prev.referenced {
          let msg = format!("modified variable {:?} with += after referencing", name);
          self.errors.push(ParseError::new(name_pos, msg));
          return None;
        }
        let combined = match add_values(prev.value.eval(), value.eval()) {
          Ok(v) => v,
          Err(msg) => {
            self.errors.push(ParseError::new(name_pos, msg));
            return None;
          }
        };
        if let Some(binding) = self.scope.get_mut(&name) {
          binding.value = combined;
        }
      }
    }
    Some(Definition::Assignment(Assignment {
      name,
      name_pos,
      op,
      value,
    }))
  }

  fn map(&mut self) -> Result<Map, Abort> {
    let lbrace = self.expect(Token::LBrace, "'{'")?;
    let mut properties = Vec::new();
    while self.peek() != &Token::RBrace {
      let (name, name_pos) = self.ident()?;
      let colon_pos = self.expect(Token::Colon, "':'")?;
      let value = self.expression()?;
      properties.push(Property {
        name,
        name_pos,
        colon_pos,
        value,
      });
      if self.peek() == &Token::Comma {
        self.advance();
      } else if self.peek() != &Token::RBrace {
        return Err(self.syntax_error("',' or '}'"));
      }
    }
    let rbrace = self.advance().pos;
    Ok(Map {
      lbrace,
      rbrace,
      properties,
    })
  }

  fn list(&mut self) -> Result<List, Abort> {
    let lbracket = self.expect(Token::LBracket, "'['")?;
    let mut values = Vec::new();
    while self.peek() != &Token::RBracket {
      values.push(self.expression()?);
      if self.peek() == &Token::Comma {
        self.advance();
      } else if self.peek() != &Token::RBracket {
        return Err(self.syntax_error("',' or ']'"));
      }
    }
    let rbracket = self.advance().pos;
    Ok(List {
      lbracket,
      rbracket,
      values,
    })
  }

  fn expression(&mut self) -> Result<Expression, Abort> {
    let mut value = self.operand()?;
    while self.peek() == &Token::Plus {
      let op_pos = self.advance().pos;
      let rhs = self.operand()?;
      let folded = match add_values(value.eval(), rhs.eval()) {
        Ok(v) => v,
        Err(msg) => {
          self.errors.push(ParseError::new(op_pos.clone(), msg));
          value.eval().clone()
        }
      };
      value = Expression::Operator(Operator {
        operator: '+',
        op_pos,
        args: Box::new([value, rhs]),
        value: Box::new(folded),
      });
    }
    Ok(value)
  }

  fn operand(&mut self) -> Result<Expression, Abort> {
    let pos = self.pos();
    match self.peek().clone() {
      Token::String(value) => {
        self.advance();
        Ok(Expression::String { pos, value })
      }
      Token::Int(value) => {
        self.advance();
        Ok(Expression::Int64 { pos, value })
      }
      Token::LBracket => Ok(Expression::List(self.list()?)),
      Token::LBrace => Ok(Expression::Map(self.map()?)),
      Token::Ident(name) => {
        self.advance();
        match name.as_str() {
          "true" => Ok(Expression::Bool { pos, value: true }),
          "false" => Ok(Expression::Bool { pos, value: false }),
          _ => Ok(self.reference(name, pos)),
        }
      }
      _ => Err(self.syntax_error("value")),
    }
  }

  fn reference(&mut self, name: String, pos: Pos) -> Expression {
    match self.scope.get_mut(&name) {
      Some(binding) => {
        binding.referenced = true;
        Expression::Variable(Variable {
          name,
          pos,
          value: Box::new(binding.value.eval().clone()),
        })
      }
      None => {
        self
          .errors
          .push(ParseError::new(pos.clone(), format!("variable {:?} is not set", name)));
        Expression::Variable(Variable {
          name,
          pos: pos.clone(),
          value: Box::new(Expression::String { pos, value: String::new() }),
        })
      }
    }
  }
}

/// Folds `a + b` for two concrete values.
fn add_values(a: &Expression, b: &Expression) -> Result<Expression, String> {
  match (a, b) {
    (Expression::String { pos, value: x }, Expression::String { value: y, .. }) => Ok(Expression::String {
      pos: pos.clone(),
      value: format!("{}{}", x, y),
    }),
    (Expression::Int64 { pos, value: x }, Expression::Int64 { value: y, .. }) => Ok(Expression::Int64 {
      pos: pos.clone(),
      value: x.wrapping_add(*y),
    }),
    (Expression::List(x), Expression::List(y)) => {
      let mut values = x.values.clone();
      values.extend(y.values.iter().cloned());
      Ok(Expression::List(List {
        lbracket: x.lbracket.clone(),
        rbracket: y.rbracket.clone(),
        values,
      }))
    }
    (Expression::Map(x), Expression::Map(y)) => {
      let mut properties = x.properties.clone();
      for prop in &y.properties {
        match properties.iter_mut().find(|p| p.name == prop.name) {
          Some(existing) => {
            existing.value = add_values(existing.value.eval(), prop.value.eval())?;
          }
          None => properties.push(prop.clone()),
        }
      }
      Ok(Expression::Map(Map {
        lbrace: x.lbrace.clone(),
        rbrace: y.rbrace.clone(),
        properties,
      }))
    }
    _ => Err(format!(
      "mismatched type in operator +: {} and {}",
      a.value_type(),
      b.value_type()
    )),
  }
}
