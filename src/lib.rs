// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Reading, regenerating and surgically editing system dynamics sketch
//! files (`.mdl`), plus the geometry used to place new variables and
//! route arrows around existing ones.

use std::fs;
use std::path::Path;

pub mod builder;
pub mod common;
pub mod json;
pub mod layout;
pub mod mdl;
pub mod model;
pub mod patch;
pub mod uid;
pub mod writer;

pub use self::builder::{ParserState, build_model};
pub use self::common::{Error, FormatError, LayoutDegradation, Result, Warning};
pub use self::json::Documents;
pub use self::layout::LayoutConfig;
pub use self::mdl::SketchMarker;
pub use self::model::{
    Connection, Point, Polarity, Provenance, Rgb, StructuralModel, Variable, VariableKind,
};
pub use self::patch::{NewConnection, NewVariable, PatchDelta, PatchOptions, SurgicalPatcher};
pub use self::writer::{WriteOptions, write_mdl};

/// A parsed file along with what was learned reading it.
#[derive(Clone, Debug, PartialEq)]
pub struct Parsed {
    pub model: StructuralModel,
    pub marker: SketchMarker,
    /// The first variable id not used in the file.
    pub next_id: i32,
    pub warnings: Vec<Warning>,
}

pub fn parse_mdl(text: &str) -> Result<Parsed> {
    let mut state = ParserState::new();
    let file = mdl::read_mdl(text, &mut state.warnings)?;
    let marker = file.marker;
    let model = build_model(file, &mut state);
    log::info!(
        variables = model.variables.len(),
        connections = model.connections.len(),
        warnings = state.warnings.len();
        "parsed mdl"
    );
    Ok(Parsed {
        model,
        marker,
        next_id: state.next_id(),
        warnings: state.warnings,
    })
}

pub fn open_mdl(path: &Path) -> Result<Parsed> {
    let text = fs::read_to_string(path)?;
    parse_mdl(&text)
}

pub fn save_mdl(path: &Path, model: &StructuralModel, options: &WriteOptions) -> Result<()> {
    let text = write_mdl(model, options)?;
    fs::write(path, text)?;
    Ok(())
}
