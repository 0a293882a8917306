// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Field tokenizer shared by sketch records and dependency lists.
//!
//! Fields are separated by commas, but a comma inside `"..."` or inside
//! balanced parentheses does not end a field.  Inside quotes `""` is an
//! escaped quote and parentheses carry no meaning.

use std::borrow::Cow;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Normal,
    /// `depth` is the paren depth to return to when the quote closes.
    InQuotes { depth: usize },
    InParens { depth: usize },
}

impl State {
    fn after_close_quote(depth: usize) -> State {
        if depth == 0 {
            State::Normal
        } else {
            State::InParens { depth }
        }
    }
}

/// What a single byte meant to the scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Char,
    /// the separator byte outside of any quotes or parens
    Separator,
    /// the paren that brought depth back to zero
    CloseOuter,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    state: State,
    separator: u8,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a str, state: State, separator: u8) -> Self {
        Scanner {
            bytes: s.as_bytes(),
            pos: 0,
            state,
            separator,
        }
    }

    /// Consume one byte (two for an escaped quote) and report what it was.
    /// Every byte that matters is ASCII, so multi-byte UTF-8 sequences
    /// pass through as plain `Char`s.
    fn next_step(&mut self) -> Option<(usize, Step)> {
        let at = self.pos;
        let b = *self.bytes.get(at)?;
        self.pos += 1;

        let step = match (self.state, b) {
            (State::Normal, b'"') => {
                self.state = State::InQuotes { depth: 0 };
                Step::Char
            }
            (State::Normal, b'(') => {
                self.state = State::InParens { depth: 1 };
                Step::Char
            }
            (State::Normal, b) if b == self.separator => Step::Separator,
            (State::InParens { depth }, b'"') => {
                self.state = State::InQuotes { depth };
                Step::Char
            }
            (State::InParens { depth }, b'(') => {
                self.state = State::InParens { depth: depth + 1 };
                Step::Char
            }
            (State::InParens { depth }, b')') => {
                if depth == 1 {
                    self.state = State::Normal;
                    Step::CloseOuter
                } else {
                    self.state = State::InParens { depth: depth - 1 };
                    Step::Char
                }
            }
            (State::InQuotes { depth }, b'"') => {
                if self.bytes.get(self.pos) == Some(&b'"') {
                    self.pos += 1;
                } else {
                    self.state = State::after_close_quote(depth);
                }
                Step::Char
            }
            _ => Step::Char,
        };

        Some((at, step))
    }
}

/// Split `line` on top-level commas.  Fields are returned raw: quotes are
/// kept and no whitespace is trimmed.
pub fn split_fields(line: &str) -> Vec<&str> {
    split_top_level(line, b',')
}

/// Split on an ASCII separator that is outside quotes and parens.
pub fn split_top_level(s: &str, separator: u8) -> Vec<&str> {
    let mut scanner = Scanner::new(s, State::Normal, separator);
    let mut fields = vec![];
    let mut start = 0;
    while let Some((at, step)) = scanner.next_step() {
        if step == Step::Separator {
            fields.push(&s[start..at]);
            start = at + 1;
        }
    }
    fields.push(&s[start..]);
    fields
}

/// Byte index of the first top-level `separator`, if any.
pub fn find_top_level(s: &str, separator: u8) -> Option<usize> {
    let mut scanner = Scanner::new(s, State::Normal, separator);
    while let Some((at, step)) = scanner.next_step() {
        if step == Step::Separator {
            return Some(at);
        }
    }
    None
}

/// Given the byte index of an opening `(`, find the byte index of the
/// paren that closes it, skipping quoted text and nested parens.
pub fn find_closing_paren(s: &str, open: usize) -> Option<usize> {
    if s.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let rest = &s[open + 1..];
    let mut scanner = Scanner::new(rest, State::InParens { depth: 1 }, b',');
    while let Some((at, step)) = scanner.next_step() {
        if step == Step::CloseOuter {
            return Some(open + 1 + at);
        }
    }
    None
}

/// Trim a raw field and strip surrounding quotes, undoubling `""`.
pub fn unquote(field: &str) -> Cow<'_, str> {
    let field = field.trim();
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        let inner = &field[1..field.len() - 1];
        if inner.contains("\"\"") {
            Cow::Owned(inner.replace("\"\"", "\""))
        } else {
            Cow::Borrowed(inner)
        }
    } else {
        Cow::Borrowed(field)
    }
}

/// Quote a variable name if it would not survive tokenizing bare.
pub fn quote_name(name: &str) -> Cow<'_, str> {
    let needs_quotes = name.contains([',', '(', ')', '|', '"', '\n']) || name != name.trim();
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(name)
    }
}
