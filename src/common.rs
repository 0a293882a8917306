// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Structural problems with a file that make it unsafe to continue.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("no sketch section")]
    NoSketchSection,
    #[error("cannot locate insertion anchor: {anchor}")]
    MissingAnchor { anchor: &'static str },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// A problem with a single record or reference.  Parsing and patching
/// continue past these; they are logged and handed back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("line {line}: skipping malformed record ({reason})")]
    MalformedRecord { line: usize, reason: String },
    #[error("duplicate name '{original}' for id {id}, renamed to '{renamed}'")]
    DuplicateName {
        id: i32,
        original: String,
        renamed: String,
    },
    #[error("duplicate sketch id {id}, keeping the first record")]
    DuplicateId { id: i32 },
    #[error("dropping reference {from} -> {to}: {reason}")]
    UnresolvedReference {
        from: String,
        to: String,
        reason: String,
    },
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },
}

/// Best-effort layout results that did not meet every constraint.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LayoutDegradation {
    #[error("all routes from {from} to {to} blocked, forcing H-V-H waypoints")]
    ForcedFallback { from: i32, to: i32 },
    #[error("overlaps remain after {iterations} iterations")]
    OverlapIterationCap { iterations: usize },
}

/// Log a recoverable warning and record it.
pub(crate) fn push_warning(warnings: &mut Vec<Warning>, warning: Warning) {
    log::warn!("{warning}");
    warnings.push(warning);
}
