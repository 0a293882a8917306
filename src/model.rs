// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The structural model: what a sketch file says about variables and the
//! links between them, independent of how the file laid out its records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableKind {
    Stock,
    Flow,
    Auxiliary,
    Cloud,
}

impl VariableKind {
    /// Classify a `10,` record by its shape field.
    pub fn from_shape_code(code: i32) -> Self {
        match code {
            3 => VariableKind::Stock,
            40 => VariableKind::Flow,
            _ => VariableKind::Auxiliary,
        }
    }

    /// The shape field written for a variable of this kind.
    pub fn shape_code(self) -> i32 {
        match self {
            VariableKind::Stock => 3,
            VariableKind::Flow => 40,
            VariableKind::Auxiliary | VariableKind::Cloud => 8,
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VariableKind::Stock => "Stock",
            VariableKind::Flow => "Flow",
            VariableKind::Auxiliary => "Auxiliary",
            VariableKind::Cloud => "Cloud",
        };
        write!(f, "{s}")
    }
}

/// An `R-G-B` color triple as it appears in sketch records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const DARK_GREEN: Rgb = Rgb::new(0, 192, 0);
    pub const PURPLE: Rgb = Rgb::new(128, 0, 128);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}-{}", self.r, self.g, self.b)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseRgbError(String);

impl fmt::Display for ParseRgbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "not an R-G-B color: '{}'", self.0)
    }
}

impl std::error::Error for ParseRgbError {}

impl FromStr for Rgb {
    type Err = ParseRgbError;

    /// Only non-negative triples are colors; `-1--1--1` means "default".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRgbError(s.to_owned());
        let mut parts = s.trim().split('-');
        let mut component = || -> Result<u8, ParseRgbError> {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(err)
        };
        let rgb = Rgb::new(component()?, component()?, component()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(rgb)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ParseRgbError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Rgb> for String {
    fn from(rgb: Rgb) -> Self {
        rgb.to_string()
    }
}

/// Integer sketch coordinates, as stored in the file.  Serialized as
/// an `[x, y]` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Point::new(x, y)
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub id: i32,
    pub name: String,
    pub kind: VariableKind,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub border_color: Option<Rgb>,
    pub fill_color: Option<Rgb>,
}

impl Variable {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_colored(&self) -> bool {
        self.border_color.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
    Undeclared,
}

impl Polarity {
    pub fn is_declared(self) -> bool {
        self != Polarity::Undeclared
    }
}

/// Where a connection was learned from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "equation")]
    FromEquation,
    #[serde(rename = "sketch")]
    FromSketch,
    #[serde(rename = "enhancement")]
    FromEnhancement,
}

/// The four connector fields between the endpoint ids and the
/// fixed styling fields, kept verbatim so a connector can be re-emitted
/// exactly as read.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorParams {
    #[serde(rename = "field3")]
    pub shape: String,
    #[serde(rename = "field4")]
    pub hidden: String,
    #[serde(rename = "field5")]
    pub polarity: String,
    #[serde(rename = "field6")]
    pub thickness: String,
}

impl ConnectorParams {
    /// Shape codes 100 and 4 mark flow pipes rather than influence arrows.
    pub fn is_flow_pipe(&self) -> bool {
        matches!(self.shape.as_str(), "100" | "4")
    }
}

impl Default for ConnectorParams {
    fn default() -> Self {
        ConnectorParams {
            shape: "0".to_owned(),
            hidden: "0".to_owned(),
            polarity: "0".to_owned(),
            thickness: "22".to_owned(),
        }
    }
}

/// A final link between two real variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub id: Option<i32>,
    pub from: i32,
    pub to: i32,
    pub polarity: Polarity,
    pub points: Vec<Point>,
    pub color: Option<Rgb>,
    pub provenance: Provenance,
    pub params: Option<ConnectorParams>,
}

impl Connection {
    pub fn new(from: i32, to: i32, polarity: Polarity, provenance: Provenance) -> Self {
        Connection {
            id: None,
            from,
            to,
            polarity,
            points: vec![],
            color: None,
            provenance,
            params: None,
        }
    }

    pub fn key(&self) -> (i32, i32) {
        (self.from, self.to)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Valve {
    pub id: i32,
    pub code: i32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A `12,` record with shape code 48.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cloud {
    pub id: i32,
    pub code: i32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Cloud {
    pub const SHAPE_CODE: i32 = 48;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowEndpoint {
    Stock(i32),
    Cloud(i32),
}

impl FlowEndpoint {
    pub fn id(self) -> i32 {
        match self {
            FlowEndpoint::Stock(id) | FlowEndpoint::Cloud(id) => id,
        }
    }
}

/// A pipe through a valve, derived from the sketch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flow {
    pub valve: i32,
    pub flow_variable: Option<i32>,
    pub from: FlowEndpoint,
    pub to: FlowEndpoint,
}

/// A raw connector touching a valve or cloud, kept so it can be
/// re-emitted next to its valve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowConnection {
    pub id: Option<i32>,
    pub from: i32,
    pub to: i32,
    pub params: ConnectorParams,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub negative: bool,
}

impl Dependency {
    pub fn polarity(&self) -> Polarity {
        if self.negative {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EquationBody {
    /// `A FUNCTION OF( a,-b )`
    FunctionOf(Vec<Dependency>),
    /// Any other right-hand side, kept verbatim.
    Expression(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Equation {
    pub name: String,
    pub body: EquationBody,
    pub units: String,
    pub description: String,
}

impl Equation {
    pub fn dependencies(&self) -> &[Dependency] {
        match &self.body {
            EquationBody::FunctionOf(deps) => deps,
            EquationBody::Expression(_) => &[],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructuralModel {
    pub variables: Vec<Variable>,
    pub connections: Vec<Connection>,
    pub valves: Vec<Valve>,
    pub clouds: Vec<Cloud>,
    pub flows: Vec<Flow>,
    pub flow_connections: Vec<FlowConnection>,
    pub equations: Vec<Equation>,
    pub valve_to_flow: BTreeMap<i32, i32>,
}

impl StructuralModel {
    pub fn variable(&self, id: i32) -> Option<&Variable> {
        self.variables.iter().find(|v| v.id == id)
    }

    pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn equation(&self, name: &str) -> Option<&Equation> {
        self.equations.iter().find(|e| e.name == name)
    }

    /// The largest id used by any sketch element.
    pub fn max_id(&self) -> i32 {
        let vars = self.variables.iter().map(|v| v.id);
        let valves = self.valves.iter().map(|v| v.id);
        let clouds = self.clouds.iter().map(|c| c.id);
        vars.chain(valves).chain(clouds).max().unwrap_or(0)
    }
}
