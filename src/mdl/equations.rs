// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Equation-section reader.
//!
//! A block is `lhs = rhs ~ units ~ description |`, usually spread over
//! three or four lines.  Only the dependency structure matters here, so
//! the right-hand side is either an `A FUNCTION OF( ... )` list or kept
//! verbatim.

use super::tokenizer::{find_closing_paren, find_top_level, split_top_level, unquote};
use crate::model::{Dependency, Equation, EquationBody};

const FUNCTION_OF: &str = "A FUNCTION OF";
const UTF8_MARKER: &str = "{UTF-8}";

/// Read every equation block up to the control banner or the end of the
/// section.  Blocks without an `=` (group banners, lookups) are skipped.
pub fn parse_equations(section: &str) -> Vec<Equation> {
    let mut equations = vec![];
    let mut block = String::new();

    for line in section.lines() {
        let trimmed = line.trim();
        if block.is_empty() {
            if trimmed.is_empty() || trimmed == UTF8_MARKER {
                continue;
            }
            if trimmed.starts_with("***") {
                log::debug!("stopping at control banner");
                break;
            }
        }
        block.push_str(line);
        block.push('\n');
        if trimmed.ends_with('|') {
            if let Some(eqn) = parse_block(&block) {
                equations.push(eqn);
            }
            block.clear();
        }
    }

    if !block.trim().is_empty() {
        log::debug!("unterminated equation block at end of section");
        if let Some(eqn) = parse_block(&block) {
            equations.push(eqn);
        }
    }

    equations
}

fn parse_block(block: &str) -> Option<Equation> {
    let parts = split_top_level(block, b'~');
    let definition = parts[0];
    let units = parts.get(1).map(|u| u.trim()).unwrap_or_default();
    let description = if parts.len() > 2 {
        parts[2..].join("~")
    } else {
        String::new()
    };
    let description = description.trim().trim_end_matches('|').trim_end();

    let eq_pos = find_top_level(definition, b'=')?;
    let lhs = &definition[..eq_pos];
    // `:=` and `==` forms still have a name on the left
    let lhs = lhs.trim_end_matches(':');
    let name = normalize_name(&join_continuations(lhs));
    if name.is_empty() {
        return None;
    }
    let rhs = definition[eq_pos + 1..].trim_start_matches('=');
    let rhs = join_continuations(rhs);

    Some(Equation {
        name,
        body: parse_rhs(rhs.trim()),
        units: units.to_owned(),
        description: description.to_owned(),
    })
}

fn parse_rhs(rhs: &str) -> EquationBody {
    if let Some(deps) = parse_function_of(rhs) {
        EquationBody::FunctionOf(deps)
    } else {
        EquationBody::Expression(rhs.to_owned())
    }
}

/// Extract the dependency list of an `A FUNCTION OF( ... )` right-hand side.
pub fn parse_function_of(rhs: &str) -> Option<Vec<Dependency>> {
    let rest = rhs.trim_start().strip_prefix(FUNCTION_OF)?;
    let offset = rhs.len() - rest.len();
    let open = offset + rest.find('(')?;
    if !rhs[offset..open].trim().is_empty() {
        return None;
    }
    let close = find_closing_paren(rhs, open)?;
    let inner = &rhs[open + 1..close];

    let deps = split_top_level(inner, b',')
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.trim();
            let (negative, raw) = match raw.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let name = normalize_name(raw);
            if name.is_empty() {
                None
            } else {
                Some(Dependency { name, negative })
            }
        })
        .collect();

    Some(deps)
}

/// The variable defined by the first line of a block, if it has an `=`.
pub fn defined_name(line: &str) -> Option<String> {
    let eq_pos = find_top_level(line, b'=')?;
    let name = normalize_name(line[..eq_pos].trim_end_matches(':'));
    (!name.is_empty()).then_some(name)
}

fn join_continuations(s: &str) -> String {
    s.replace("\\\r\n", " ").replace("\\\n", " ")
}

/// Unquote a name, and for bare names collapse the whitespace runs that
/// line wrapping leaves behind.
fn normalize_name(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with('"') {
        unquote(raw).into_owned()
    } else {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
