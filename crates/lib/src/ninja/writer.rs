//! Low-level writer for the manifest's line format.
//!
//! Long `build` and `default` lines are wrapped at 80 columns with a `$`
//! continuation; continuation lines are indented past the statement's own
//! indentation so they read as part of it.

use crate::consts::{NINJA_INDENT as INDENT, NINJA_LINE_WIDTH as MAX_LINE_LEN};

const CONTINUATION_INDENT: &str = "    ";

#[derive(Debug)]
pub(crate) struct NinjaWriter {
  out: String,
  just_did_blank_line: bool,
}

impl NinjaWriter {
  pub(crate) fn new() -> Self {
    Self {
      out: String::new(),
      just_did_blank_line: false,
    }
  }

  pub(crate) fn finish(self) -> String {
    self.out
  }

  fn line(&mut self, text: &str) {
    self.out.push_str(text);
    self.out.push('\n');
    self.just_did_blank_line = false;
  }

  /// A `#` comment, wrapped at word boundaries.
  pub(crate) fn comment(&mut self, text: &str) {
    for paragraph in text.split('\n') {
      let mut line = String::from("#");
      for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
        if line.len() > 1 && line.len() + 1 + word.len() > MAX_LINE_LEN {
          self.line(&line);
          line = String::from("#");
        }
        line.push(' ');
        line.push_str(word);
      }
      self.line(&line);
    }
  }

  /// A comment line written exactly as given.
  pub(crate) fn raw_comment(&mut self, text: &str) {
    let line = format!("# {}", text);
    self.line(line.trim_end());
  }

  pub(crate) fn blank_line(&mut self) {
    if !self.just_did_blank_line && !self.out.is_empty() {
      self.out.push('\n');
      self.just_did_blank_line = true;
    }
  }

  pub(crate) fn assign(&mut self, name: &str, value: &str) {
    self.line(&format!("{} = {}", name, value));
  }

  pub(crate) fn scoped_assign(&mut self, name: &str, value: &str) {
    self.line(&format!("{}{} = {}", INDENT, name, value));
  }

  pub(crate) fn pool(&mut self, name: &str, depth: usize) {
    self.line(&format!("pool {}", name));
    self.scoped_assign("depth", &depth.to_string());
  }

  pub(crate) fn rule(&mut self, name: &str) {
    self.line(&format!("rule {}", name));
  }

  /// `build OUTS | IMPLICIT_OUTS: RULE INS | IMPLICITS || ORDER_ONLY |@ VALIDATIONS`
  ///
  /// Paths must already be escaped.
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn build(
    &mut self,
    rule: &str,
    outputs: &[String],
    implicit_outputs: &[String],
    inputs: &[String],
    implicits: &[String],
    order_only: &[String],
    validations: &[String],
  ) {
    let mut wrapper = Wrapper::new("build");
    wrapper.words(outputs);
    if !implicit_outputs.is_empty() {
      wrapper.word("|");
      wrapper.words(implicit_outputs);
    }
    wrapper.attach(":");
    wrapper.word(rule);
    wrapper.words(inputs);
    if !implicits.is_empty() {
      wrapper.word("|");
      wrapper.words(implicits);
    }
    if !order_only.is_empty() {
      wrapper.word("||");
      wrapper.words(order_only);
    }
    if !validations.is_empty() {
      wrapper.word("|@");
      wrapper.words(validations);
    }
    let text = wrapper.finish();
    self.out.push_str(&text);
    self.just_did_blank_line = false;
  }

  pub(crate) fn default(&mut self, targets: &[String]) {
    let mut wrapper = Wrapper::new("default");
    wrapper.words(targets);
    let text = wrapper.finish();
    self.out.push_str(&text);
    self.just_did_blank_line = false;
  }

  pub(crate) fn subninja(&mut self, path: &str) {
    self.line(&format!("subninja {}", path));
  }
}

/// Accumulates space separated words, breaking before a word that would
/// overflow the line.
struct Wrapper {
  out: String,
  line_len: usize,
}

impl Wrapper {
  fn new(keyword: &str) -> Self {
    Self {
      out: keyword.to_string(),
      line_len: keyword.len(),
    }
  }

  fn word(&mut self, word: &str) {
    // room for " word $"
    if self.line_len + 1 + word.len() + 2 > MAX_LINE_LEN && self.line_len > CONTINUATION_INDENT.len() {
      self.out.push_str(" $\n");
      self.out.push_str(CONTINUATION_INDENT);
      self.out.push_str(word);
      self.line_len = CONTINUATION_INDENT.len() + word.len();
    } else {
      self.out.push(' ');
      self.out.push_str(word);
      self.line_len += 1 + word.len();
    }
  }

  fn words(&mut self, words: &[String]) {
    for word in words {
      self.word(word);
    }
  }

  /// Append to the previous word without a separator.
  fn attach(&mut self, text: &str) {
    self.out.push_str(text);
    self.line_len += text.len();
  }

  fn finish(mut self) -> String {
    self.out.push('\n');
    self.out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn build_line_sections() {
    let mut w = NinjaWriter::new();
    w.build(
      "g.cc.cc",
      &strings(&["out/a.o"]),
      &strings(&["out/a.d"]),
      &strings(&["a.c"]),
      &strings(&["a.h"]),
      &strings(&["gen"]),
      &strings(&["check"]),
    );
    assert_eq!(w.finish(), "build out/a.o | out/a.d: g.cc.cc a.c | a.h || gen |@ check\n");
  }

  #[test]
  fn long_lines_wrap() {
    let inputs: Vec<String> = (0..8).map(|i| format!("some/long/source/path/file{}.c", i)).collect();
    let mut w = NinjaWriter::new();
    w.build("phony", &strings(&["out"]), &[], &inputs, &[], &[], &[]);
    let text = w.finish();
    for line in text.lines() {
      assert!(line.len() <= MAX_LINE_LEN, "{:?}", line);
    }
    assert!(text.starts_with("build out: phony some/long/source/path/file0.c"));
    assert!(text.contains(" $\n    some/long/source/path/file"));
  }

  #[test]
  fn pools_rules_and_comments() {
    let mut w = NinjaWriter::new();
    w.comment("Module:  foo");
    w.blank_line();
    w.blank_line();
    w.pool("local", 4);
    w.rule("g.cc.cc");
    w.scoped_assign("command", "cc $in");
    w.default(&strings(&["a", "b"]));
    w.subninja("out/other.ninja");
    assert_eq!(
      w.finish(),
      "# Module: foo\n\npool local\n  depth = 4\nrule g.cc.cc\n  command = cc $in\ndefault a b\nsubninja out/other.ninja\n"
    );
  }
}
