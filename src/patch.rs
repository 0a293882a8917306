// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Surgical patcher: edit an existing file in place.
//!
//! Only the lines being added, removed or repositioned change; every
//! other byte of the input (valves, clouds, flow pipes, formatting) is
//! carried through untouched.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::common::{FormatError, Result, Warning, push_warning};
use crate::layout::{LayoutConfig, OverlapReport, Position, Waypoints, resolve_overlaps};
use crate::mdl::equations::defined_name;
use crate::mdl::records::parse_atoi;
use crate::mdl::sections::SketchMarker;
use crate::mdl::tokenizer::{quote_name, split_fields, unquote};
use crate::model::{Point, Polarity, Rgb, VariableKind};
use crate::uid::{IdAllocator, NameRegistry};
use crate::writer::polyline;

const CONTROL_BANNER: &str = "********************************************************";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Theory,
    Archetype,
}

impl ColorScheme {
    pub fn border(self) -> Rgb {
        match self {
            ColorScheme::Theory => Rgb::GREEN,
            ColorScheme::Archetype => Rgb::PURPLE,
        }
    }

    /// Connector fields 8 to 10 for a tinted arrow.
    fn line_fields(self) -> &'static str {
        match self {
            ColorScheme::Theory => "0,192,0",
            ColorScheme::Archetype => "128,0,128",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatchOptions {
    /// Tag new records with the scheme's colors.  Existing records are
    /// never recolored.
    pub add_colors: bool,
    pub scheme: ColorScheme,
    pub layout: LayoutConfig,
}

impl Default for PatchOptions {
    fn default() -> Self {
        PatchOptions {
            add_colors: true,
            scheme: ColorScheme::default(),
            layout: LayoutConfig::default(),
        }
    }
}

fn auxiliary() -> VariableKind {
    VariableKind::Auxiliary
}

fn positive() -> Polarity {
    Polarity::Positive
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewVariable {
    pub name: String,
    #[serde(rename = "type", default = "auxiliary")]
    pub kind: VariableKind,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub description: String,
}

impl NewVariable {
    pub fn new(name: &str, kind: VariableKind) -> Self {
        NewVariable {
            name: name.to_owned(),
            kind,
            x: None,
            y: None,
            width: None,
            height: None,
            units: String::new(),
            description: String::new(),
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewConnection {
    pub from: String,
    pub to: String,
    #[serde(rename = "relationship", default = "positive")]
    pub polarity: Polarity,
    #[serde(skip)]
    pub points: Vec<Point>,
}

impl NewConnection {
    pub fn new(from: &str, to: &str, polarity: Polarity) -> Self {
        NewConnection {
            from: from.to_owned(),
            to: to.to_owned(),
            polarity,
            points: vec![],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PatchDelta {
    pub variables: Vec<NewVariable>,
    pub connections: Vec<NewConnection>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Final name and id of each inserted variable, in request order.
    pub variables: Vec<(String, i32)>,
    pub connection_ids: Vec<i32>,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub variable_ids: Vec<i32>,
    pub equation_removed: bool,
    pub connectors_removed: usize,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelayoutReport {
    pub variables_moved: usize,
    pub arrows_simplified: usize,
    pub overlap: OverlapReport,
}

/// What one pass over the lines learned about where things go.
#[derive(Clone, Debug, Default)]
struct Anchors {
    /// New equation blocks go before this line.
    equation_end: usize,
    sketch_start: usize,
    last_variable: Option<usize>,
    last_connector: Option<usize>,
    max_connector_id: i32,
    max_x: i32,
    names: NameRegistry,
}

impl Anchors {
    fn scan(lines: &[String]) -> Result<Anchors> {
        let sketch_start = lines
            .iter()
            .position(|l| SketchMarker::detect(l).is_some())
            .ok_or(FormatError::NoSketchSection)?;

        let control = lines[..sketch_start]
            .windows(2)
            .position(|w| w[0].contains(CONTROL_BANNER) && w[1].contains(".Control"));

        let mut anchors = Anchors {
            equation_end: control.unwrap_or(sketch_start),
            sketch_start,
            ..Default::default()
        };

        for (i, line) in lines.iter().enumerate().skip(sketch_start + 1) {
            if line.starts_with("10,") {
                anchors.last_variable = Some(i);
                let fields = split_fields(line);
                if let Some(id) = fields.get(1).and_then(|f| f.trim().parse::<i32>().ok()) {
                    let name = fields.get(2).map(|f| unquote(f)).unwrap_or_default();
                    anchors.names.add(id, &name);
                    anchors.max_x = anchors.max_x.max(fields.get(3).map_or(0, |f| parse_atoi(f)));
                }
            } else if line.starts_with("1,") {
                anchors.last_connector = Some(i);
                if let Some(id) = line.split(',').nth(1).and_then(|f| f.trim().parse::<i32>().ok()) {
                    anchors.max_connector_id = anchors.max_connector_id.max(id);
                }
            }
        }

        log::debug!(
            equation_end = anchors.equation_end,
            last_variable:? = anchors.last_variable,
            last_connector:? = anchors.last_connector,
            max_variable_id = anchors.names.max_id(),
            max_connector_id = anchors.max_connector_id;
            "found insertion anchors"
        );
        Ok(anchors)
    }
}

/// An existing file opened for in-place edits.
#[derive(Clone, Debug)]
pub struct SurgicalPatcher {
    lines: Vec<String>,
    eol: &'static str,
    anchors: Anchors,
}

impl SurgicalPatcher {
    /// Fails if the text has no sketch section.
    pub fn new(text: &str) -> Result<Self> {
        let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let lines: Vec<String> = text.split(eol).map(str::to_owned).collect();
        let anchors = Anchors::scan(&lines)?;
        Ok(SurgicalPatcher { lines, eol, anchors })
    }

    pub fn text(&self) -> String {
        self.lines.join(self.eol)
    }

    pub fn max_variable_id(&self) -> i32 {
        self.anchors.names.max_id()
    }

    pub fn max_connector_id(&self) -> i32 {
        self.anchors.max_connector_id
    }

    fn rescan(&mut self) -> Result<()> {
        self.anchors = Anchors::scan(&self.lines)?;
        Ok(())
    }

    /// Insert new variables and connections.
    ///
    /// Variable ids continue from the largest `10,` id and connector ids
    /// from the largest `1,` id.  A name that is already taken gets a
    /// numeric suffix, and connections naming it follow the renamed
    /// variable.  Connections with an unknown endpoint are skipped with a
    /// warning.  Nothing is modified if an insertion anchor is missing.
    ///
    /// The two counters are independent of each other and of valve and
    /// comment ids, so a new variable may share its number with an
    /// existing connector or valve.  Readers key records by type and id.
    pub fn apply(&mut self, delta: &PatchDelta, options: &PatchOptions) -> Result<PatchOutcome> {
        if !delta.variables.is_empty() && self.anchors.last_variable.is_none() {
            return Err(FormatError::MissingAnchor {
                anchor: "last variable record",
            }
            .into());
        }
        if !delta.connections.is_empty()
            && self.anchors.last_connector.is_none()
            && self.anchors.last_variable.is_none()
        {
            return Err(FormatError::MissingAnchor {
                anchor: "last connector record",
            }
            .into());
        }

        let mut outcome = PatchOutcome::default();
        let mut names = self.anchors.names.clone();
        // requested name -> final name, for the variables added here
        let mut added: HashMap<&str, String> = HashMap::new();

        let mut variable_lines = vec![];
        let mut unplaced = 0;
        let mut placed = vec![];
        for var in &delta.variables {
            let registered = names.alloc(&var.name)?;
            if registered.renamed {
                push_warning(
                    &mut outcome.warnings,
                    Warning::DuplicateName {
                        id: registered.id,
                        original: var.name.clone(),
                        renamed: registered.name.clone(),
                    },
                );
            }
            let position = match (var.x, var.y) {
                (Some(x), Some(y)) => Point::new(x, y),
                _ => {
                    let p = fallback_position(self.anchors.max_x, unplaced, var.kind);
                    unplaced += 1;
                    p
                }
            };
            variable_lines.push(self.variable_line(registered.id, &registered.name, var, position, options));
            added.insert(var.name.as_str(), registered.name.clone());
            placed.push((registered.name.clone(), registered.id, var));
            outcome.variables.push((registered.name, registered.id));
        }

        let resolve = |name: &str| added.get(name).cloned().unwrap_or_else(|| name.to_owned());

        let mut connector_ids = IdAllocator::starting_after(self.anchors.max_connector_id);
        let mut connector_lines = vec![];
        let mut resolved_connections = vec![];
        for conn in &delta.connections {
            let from = resolve(&conn.from);
            let to = resolve(&conn.to);
            let (Some(from_id), Some(to_id)) = (names.id_of(&from), names.id_of(&to)) else {
                push_warning(
                    &mut outcome.warnings,
                    Warning::UnresolvedReference {
                        from: conn.from.clone(),
                        to: conn.to.clone(),
                        reason: "variable not found".to_owned(),
                    },
                );
                continue;
            };
            let id = connector_ids.alloc()?;
            let color = if options.add_colors {
                options.scheme.line_fields()
            } else {
                "0,0,0"
            };
            connector_lines.push(format!(
                "1,{id},{from_id},{to_id},0,0,0,22,{color},-1--1--1,,1{}",
                polyline(&conn.points)
            ));
            outcome.connection_ids.push(id);
            resolved_connections.push((from, to, conn.polarity));
        }

        let mut equation_lines = vec![];
        for (name, _, var) in &placed {
            let deps: Vec<String> = resolved_connections
                .iter()
                .filter(|(_, to, _)| to == name)
                .map(|(from, _, polarity)| {
                    let quoted = quote_name(from);
                    if *polarity == Polarity::Negative {
                        format!("-{quoted}")
                    } else {
                        quoted.into_owned()
                    }
                })
                .collect();
            equation_lines.push(format!("{}  = A FUNCTION OF( {})", quote_name(name), deps.join(",")));
            equation_lines.push(format!("\t~\t{}", var.units));
            equation_lines.push(format!("\t~\t{}\t|", var.description));
            equation_lines.push(String::new());
        }

        // later anchors shift down by whatever was spliced in above them
        let mut shift = 0;
        let equation_count = equation_lines.len();
        splice(&mut self.lines, self.anchors.equation_end, equation_lines);
        shift += equation_count;

        let mut last_variable = self.anchors.last_variable.map(|i| i + shift);
        if let Some(at) = last_variable {
            let count = variable_lines.len();
            splice(&mut self.lines, at + 1, variable_lines);
            shift += count;
            last_variable = Some(at + count);
        }

        let connector_anchor = self.anchors.last_connector.map(|i| i + shift).or(last_variable);
        if let Some(at) = connector_anchor {
            splice(&mut self.lines, at + 1, connector_lines);
        }

        log::info!(
            variables = outcome.variables.len(), connections = outcome.connection_ids.len(),
            warnings = outcome.warnings.len();
            "patched mdl"
        );
        self.rescan()?;
        Ok(outcome)
    }

    fn variable_line(
        &self,
        id: i32,
        name: &str,
        var: &NewVariable,
        position: Point,
        options: &PatchOptions,
    ) -> String {
        let width = var.width.unwrap_or(options.layout.default_width);
        let height = var.height.unwrap_or(options.layout.default_height);
        let head = format!(
            "10,{id},{},{},{},{width},{height},{}",
            quote_name(name),
            position.x,
            position.y,
            var.kind.shape_code()
        );
        if options.add_colors {
            let border = options.scheme.border();
            format!("{head},3,0,1,-1,1,0,0,{border},0-0-0,|||0-0-0,0,0,0,0,0,0")
        } else {
            format!("{head},3,0,0,-1,0,0,0,0,0,0,0,0,0")
        }
    }

    /// Remove a variable's equation block, its `10,` records and every
    /// `1,` record that references one of its ids.
    pub fn remove_variable(&mut self, name: &str) -> Result<RemovalReport> {
        let mut report = RemovalReport::default();

        let equation_end = self.anchors.equation_end;
        if let Some((start, end)) = find_equation_block(&self.lines[..equation_end], name) {
            self.lines.drain(start..end);
            report.equation_removed = true;
        }
        self.rescan()?;

        let sketch_start = self.anchors.sketch_start;
        let mut keep = Vec::with_capacity(self.lines.len());
        for (i, line) in self.lines.iter().enumerate() {
            if i > sketch_start && line.starts_with("10,") {
                let fields = split_fields(line);
                if fields.get(2).is_some_and(|f| unquote(f) == name) {
                    if let Some(id) = fields.get(1).and_then(|f| f.trim().parse::<i32>().ok()) {
                        report.variable_ids.push(id);
                    }
                    continue;
                }
            }
            keep.push(line);
        }

        let ids = &report.variable_ids;
        let mut lines = Vec::with_capacity(keep.len());
        for line in keep {
            if line.starts_with("1,") {
                let mut fields = line.split(',').skip(2);
                let from = fields.next().map(parse_atoi);
                let to = fields.next().map(parse_atoi);
                if from.is_some_and(|id| ids.contains(&id)) || to.is_some_and(|id| ids.contains(&id)) {
                    report.connectors_removed += 1;
                    continue;
                }
            }
            lines.push(line.clone());
        }
        self.lines = lines;

        if report.variable_ids.is_empty() && !report.equation_removed {
            push_warning(
                &mut report.warnings,
                Warning::UnknownVariable {
                    name: name.to_owned(),
                },
            );
        }
        log::info!(
            name = name, ids:? = report.variable_ids, connectors = report.connectors_removed;
            "removed variable"
        );
        self.rescan()?;
        Ok(report)
    }

    /// Move variables to new positions and straighten every arrow.
    ///
    /// The requested positions are first spread out to the configured
    /// minimum spacing.  Names not present in the sketch are ignored.
    pub fn relayout(&mut self, positions: &BTreeMap<String, Point>, config: &LayoutConfig) -> RelayoutReport {
        let names: Vec<&String> = positions.keys().collect();
        let mut spread: Vec<Position> = positions.values().map(|&p| Position::from(p)).collect();
        let overlap = resolve_overlaps(&mut spread, config);
        let target: HashMap<&str, Point> = names
            .iter()
            .zip(spread)
            .map(|(name, p)| (name.as_str(), p.to_point()))
            .collect();

        let sketch_start = self.anchors.sketch_start;
        let mut variables_moved = 0;
        let mut arrows_simplified = 0;
        for line in self.lines.iter_mut().skip(sketch_start + 1) {
            if line.starts_with("10,") {
                let moved = {
                    let fields = split_fields(line);
                    let position = fields.get(2).and_then(|f| target.get(unquote(f).as_ref()).copied());
                    match position {
                        Some(p) if fields.len() >= 5 => {
                            let (x, y) = (p.x.to_string(), p.y.to_string());
                            let mut out: Vec<&str> = fields[..3].to_vec();
                            out.push(&x);
                            out.push(&y);
                            out.extend_from_slice(&fields[5..]);
                            Some(out.join(","))
                        }
                        _ => None,
                    }
                };
                if let Some(moved) = moved {
                    *line = moved;
                    variables_moved += 1;
                }
            } else if line.starts_with("1,") {
                if let Some(stripped) = with_points(line, &[]) {
                    if stripped != *line {
                        *line = stripped;
                        arrows_simplified += 1;
                    }
                }
            }
        }

        log::info!(moved = variables_moved, straightened = arrows_simplified; "relayout");
        RelayoutReport {
            variables_moved,
            arrows_simplified,
            overlap,
        }
    }

    /// Replace the polyline of every `1,` record whose `(from, to)` has
    /// routed waypoints.  Returns the number of records changed.
    pub fn apply_waypoints(&mut self, waypoints: &BTreeMap<(i32, i32), Waypoints>) -> usize {
        let sketch_start = self.anchors.sketch_start;
        let mut changed = 0;
        for line in self.lines.iter_mut().skip(sketch_start + 1) {
            if !line.starts_with("1,") {
                continue;
            }
            let mut fields = line.split(',').skip(2);
            let (Some(from), Some(to)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some(points) = waypoints.get(&(parse_atoi(from), parse_atoi(to))) else {
                continue;
            };
            if let Some(updated) = with_points(line, points) {
                if updated != *line {
                    *line = updated;
                    changed += 1;
                }
            }
        }
        changed
    }
}

fn splice(lines: &mut Vec<String>, at: usize, new: Vec<String>) {
    lines.splice(at..at, new);
}

/// Grid slot for the `index`th new variable without a position, to the
/// right of everything already drawn.
pub fn fallback_position(max_x: i32, index: i32, kind: VariableKind) -> Point {
    let x = max_x + 500 + (index % 3) * 250;
    let base_y = match kind {
        VariableKind::Stock => 300,
        VariableKind::Flow => 200,
        VariableKind::Auxiliary | VariableKind::Cloud => 400,
    };
    Point::new(x, base_y + (index / 3) * 150)
}

/// Rewrite a connector's trailing `1|(...)|` polyline.  `None` if the
/// record has no polyline.
fn with_points(line: &str, points: &[Point]) -> Option<String> {
    if !line.contains("|(") {
        return None;
    }
    let parts: Vec<&str> = line.split(',').collect();
    let start = parts.iter().position(|p| p.contains("1|("))?;
    let mut out = parts[..start].join(",");
    out.push_str(",1");
    out.push_str(&polyline(points));
    Some(out)
}

/// Line range `[start, end)` of the equation block defining `name`,
/// including the blank line that follows it.
fn find_equation_block(lines: &[String], name: &str) -> Option<(usize, usize)> {
    let mut at_block_start = true;
    let mut start = None;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if start.is_none() && at_block_start && defined_name(line).is_some_and(|n| n == name) {
            start = Some(i);
        }
        if let Some(s) = start {
            if trimmed.ends_with('|') {
                let mut end = i + 1;
                if lines.get(end).is_some_and(|l| l.trim().is_empty()) {
                    end += 1;
                }
                return Some((s, end));
            }
        }
        at_block_start = trimmed.is_empty() || trimmed.ends_with('|') || trimmed == "{UTF-8}";
    }
    None
}
