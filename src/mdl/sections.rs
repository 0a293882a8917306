// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::common::{FormatError, Result};

pub const STANDARD_MARKER: &str = r"\\\---///";
pub const ALTERNATE_MARKER: &str = "--///";
pub const SKETCH_END_PREFIX: &str = "///---";

/// Which of the two legacy marker pairs a file uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SketchMarker {
    #[default]
    Standard,
    Alternate,
}

impl SketchMarker {
    pub fn header(self) -> &'static str {
        match self {
            SketchMarker::Standard => {
                "\\\\\\---/// Sketch information - do not modify anything except names\n"
            }
            SketchMarker::Alternate => "--/// Sketch information - do not modify anything except names\n",
        }
    }

    pub fn footer(self) -> &'static str {
        match self {
            SketchMarker::Standard => "///---\\\\\\\n",
            SketchMarker::Alternate => "///---\\\n",
        }
    }

    /// Recognize a sketch-start line.
    pub fn detect(line: &str) -> Option<SketchMarker> {
        if line.contains(STANDARD_MARKER) {
            Some(SketchMarker::Standard)
        } else if line.contains(ALTERNATE_MARKER) {
            Some(SketchMarker::Alternate)
        } else {
            None
        }
    }
}

/// A file split at its first sketch marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sections<'a> {
    pub equations: &'a str,
    /// Everything from the marker line to the end of the file.
    pub sketch: &'a str,
    pub marker: SketchMarker,
    /// Zero-based line number of the marker line.
    pub sketch_line: usize,
}

pub fn split_sections(text: &str) -> Result<Sections<'_>> {
    let mut offset = 0;
    for (lineno, line) in text.split_inclusive('\n').enumerate() {
        if let Some(marker) = SketchMarker::detect(line) {
            log::debug!(line = lineno; "found sketch marker");
            return Ok(Sections {
                equations: &text[..offset],
                sketch: &text[offset..],
                marker,
                sketch_line: lineno,
            });
        }
        offset += line.len();
    }
    Err(FormatError::NoSketchSection.into())
}

/// The lines of a sketch section that can hold records: after the
/// marker line and before the closing `///---` line.
pub fn record_lines(sketch: &str) -> impl Iterator<Item = (usize, &str)> {
    sketch
        .lines()
        .enumerate()
        .skip(1)
        .take_while(|(_, line)| !line.trim_start().starts_with(SKETCH_END_PREFIX))
}
