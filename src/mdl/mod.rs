// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Reading MDL text: section split, equation blocks and sketch records.

pub mod equations;
pub mod records;
pub mod sections;
pub mod tokenizer;

use crate::common::{Result, Warning, push_warning};
use crate::model::Equation;

pub use records::SketchRecord;
pub use sections::SketchMarker;

/// The raw contents of a file, before any cross-referencing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdlFile {
    pub equations: Vec<Equation>,
    pub records: Vec<SketchRecord>,
    pub marker: SketchMarker,
}

/// Tokenize a whole file.  Only a missing sketch marker is fatal; bad
/// record lines are skipped and reported in `warnings`.
pub fn read_mdl(text: &str, warnings: &mut Vec<Warning>) -> Result<MdlFile> {
    log::trace!("{text}");
    let sections = sections::split_sections(text)?;
    let equations = equations::parse_equations(sections.equations);

    let mut records = vec![];
    for (offset, line) in sections::record_lines(sections.sketch) {
        match records::parse_record_line(line) {
            Some(Ok(record)) => records.push(record),
            Some(Err(reason)) => push_warning(
                warnings,
                Warning::MalformedRecord {
                    line: sections.sketch_line + offset + 1,
                    reason,
                },
            ),
            None => {}
        }
    }

    log::debug!(
        equations = equations.len(), records = records.len();
        "read mdl"
    );

    Ok(MdlFile {
        equations,
        records,
        marker: sections.marker,
    })
}
