// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Typed sketch records.
//!
//! Each record line starts with its type code: `10` variable, `11` valve,
//! `12` cloud or comment, `1` connector.  Coordinates use atoi-style
//! parsing so that stray suffixes do not reject a whole line; ids must be
//! real integers.

use super::tokenizer::{split_fields, unquote};
use crate::model::{ConnectorParams, Point, Polarity, Rgb};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableRecord {
    pub id: i32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub shape: i32,
    pub border: Option<Rgb>,
    pub fill: Option<Rgb>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValveRecord {
    pub id: i32,
    pub code: i32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A `12,` record.  Only shape code 48 is a cloud; the rest are comments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudRecord {
    pub id: i32,
    pub code: i32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CloudRecord {
    pub fn is_cloud(&self) -> bool {
        self.code == crate::model::Cloud::SHAPE_CODE
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectorRecord {
    pub id: i32,
    pub from: i32,
    pub to: i32,
    pub params: ConnectorParams,
    pub polarity: Polarity,
    pub color: Option<Rgb>,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SketchRecord {
    Variable(VariableRecord),
    Valve(ValveRecord),
    Cloud(CloudRecord),
    Connector(ConnectorRecord),
}

impl SketchRecord {
    pub fn id(&self) -> i32 {
        match self {
            SketchRecord::Variable(v) => v.id,
            SketchRecord::Valve(v) => v.id,
            SketchRecord::Cloud(c) => c.id,
            SketchRecord::Connector(c) => c.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            SketchRecord::Variable(_) => RecordKind::Variable,
            SketchRecord::Valve(_) => RecordKind::Valve,
            SketchRecord::Cloud(_) => RecordKind::Cloud,
            SketchRecord::Connector(_) => RecordKind::Connector,
        }
    }
}

/// The record type a line declares, judged from its leading digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Connector,
    Variable,
    Valve,
    Cloud,
}

impl RecordKind {
    pub fn of_line(line: &str) -> Option<RecordKind> {
        let code = line.split(',').next()?;
        match code {
            "1" => Some(RecordKind::Connector),
            "10" => Some(RecordKind::Variable),
            "11" => Some(RecordKind::Valve),
            "12" => Some(RecordKind::Cloud),
            _ => None,
        }
    }
}

/// Parse an integer using atoi semantics: optional sign, then digits up
/// to the first non-digit.  Empty or non-numeric input is 0.
pub fn parse_atoi(s: &str) -> i32 {
    let bytes = s.trim_start().as_bytes();
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };

    let mut result: i32 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        result = result.saturating_mul(10).saturating_add((b - b'0') as i32);
    }

    if negative { -result } else { result }
}

/// Connector polarity byte, stored as its ASCII code.
fn parse_polarity(ascii_val: i32) -> Polarity {
    match ascii_val {
        43 | 83 | 115 => Polarity::Positive, // '+', 'S' or 's'
        45 | 79 | 48 => Polarity::Negative,  // '-', 'O' or '0'
        _ => Polarity::Undeclared,
    }
}

/// Parse the control points of a `np|(x,y)(x2,y2)|` field.  A single
/// `(0,0)` point is the "no waypoints" placeholder.
pub fn parse_points(s: &str) -> Vec<Point> {
    let Some(start) = s.find('|') else {
        return vec![];
    };
    let mut points = vec![];
    let mut rest = &s[start + 1..];
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')') else {
            break;
        };
        let inner = &rest[open + 1..open + close];
        if let Some((x, y)) = inner.split_once(',') {
            points.push(Point::new(parse_atoi(x), parse_atoi(y)));
        }
        rest = &rest[open + close + 1..];
    }
    if points == [Point::new(0, 0)] {
        points.clear();
    }
    points
}

fn parse_id(field: Option<&&str>, what: &str) -> Result<i32, String> {
    let field = field.ok_or_else(|| format!("missing {what}"))?;
    field
        .trim()
        .parse()
        .map_err(|_| format!("bad {what} '{}'", field.trim()))
}

/// A record's own id.  `i32::MAX` is refused so new elements always
/// have an id to take.
fn parse_record_id(field: Option<&&str>) -> Result<i32, String> {
    let id = parse_id(field, "id")?;
    if id == i32::MAX {
        return Err(format!("id {id} is out of range"));
    }
    Ok(id)
}

fn int_at(fields: &[&str], i: usize) -> i32 {
    fields.get(i).map(|f| parse_atoi(f)).unwrap_or(0)
}

fn rgb_at(fields: &[&str], i: usize) -> Option<Rgb> {
    fields.get(i).and_then(|f| f.parse().ok())
}

fn require_fields(fields: &[&str], n: usize) -> Result<(), String> {
    if fields.len() < n {
        Err(format!("expected at least {n} fields, found {}", fields.len()))
    } else {
        Ok(())
    }
}

fn parse_variable(fields: &[&str]) -> Result<VariableRecord, String> {
    require_fields(fields, 8)?;
    let id = parse_record_id(fields.get(1))?;
    let name = unquote(fields[2]).into_owned();
    if name.is_empty() {
        return Err("empty name".to_owned());
    }
    // the colored form carries border and fill triples at 15 and 16
    let border = rgb_at(fields, 15);
    let fill = border.and(rgb_at(fields, 16));
    Ok(VariableRecord {
        id,
        name,
        x: int_at(fields, 3),
        y: int_at(fields, 4),
        width: int_at(fields, 5),
        height: int_at(fields, 6),
        shape: int_at(fields, 7),
        border,
        fill,
    })
}

fn parse_valve(fields: &[&str]) -> Result<ValveRecord, String> {
    require_fields(fields, 7)?;
    Ok(ValveRecord {
        id: parse_record_id(fields.get(1))?,
        code: int_at(fields, 2),
        x: int_at(fields, 3),
        y: int_at(fields, 4),
        width: int_at(fields, 5),
        height: int_at(fields, 6),
    })
}

fn parse_cloud(fields: &[&str]) -> Result<CloudRecord, String> {
    require_fields(fields, 7)?;
    Ok(CloudRecord {
        id: parse_record_id(fields.get(1))?,
        code: int_at(fields, 2),
        x: int_at(fields, 3),
        y: int_at(fields, 4),
        width: int_at(fields, 5),
        height: int_at(fields, 6),
    })
}

fn parse_connector(fields: &[&str]) -> Result<ConnectorRecord, String> {
    require_fields(fields, 4)?;
    let id = parse_record_id(fields.get(1))?;
    let from = parse_id(fields.get(2), "source id")?;
    let to = parse_id(fields.get(3), "target id")?;

    let param = |i: usize, default: &str| {
        fields
            .get(i)
            .map(|f| f.trim().to_owned())
            .unwrap_or_else(|| default.to_owned())
    };
    let params = ConnectorParams {
        shape: param(4, "0"),
        hidden: param(5, "0"),
        polarity: param(6, "0"),
        thickness: param(7, "22"),
    };

    let color = if fields.get(8).map(|f| f.trim()) == Some("1") {
        rgb_at(fields, 11)
    } else {
        None
    };

    let points = fields.last().map(|f| parse_points(f)).unwrap_or_default();

    Ok(ConnectorRecord {
        id,
        from,
        to,
        polarity: parse_polarity(int_at(fields, 6)),
        params,
        color,
        points,
    })
}

/// Parse one sketch line.  `None` means the line is not a record this
/// crate reads (view headers, comment text, other record types);
/// `Some(Err(reason))` means it claimed to be one but is malformed.
pub fn parse_record_line(line: &str) -> Option<Result<SketchRecord, String>> {
    let kind = RecordKind::of_line(line)?;
    let fields = split_fields(line);
    let record = match kind {
        RecordKind::Variable => parse_variable(&fields).map(SketchRecord::Variable),
        RecordKind::Valve => parse_valve(&fields).map(SketchRecord::Valve),
        RecordKind::Cloud => parse_cloud(&fields).map(SketchRecord::Cloud),
        RecordKind::Connector => parse_connector(&fields).map(SketchRecord::Connector),
    };
    Some(record)
}
