// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Serializer: regenerate MDL text from a [`StructuralModel`] in the
//! field layouts the authoring tool expects.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::common::{Error, Result};
use crate::mdl::sections::SketchMarker;
use crate::mdl::tokenizer::quote_name;
use crate::model::{
    Cloud, Connection, ConnectorParams, Dependency, EquationBody, Point, Polarity, Provenance,
    Rgb, StructuralModel, Valve, Variable, VariableKind,
};
use crate::uid::IdAllocator;

pub const VIEW_HEADER: &str = "V300  Do not put anything below this section - it will be ignored\n\
    *View 1\n\
    $-1--1--1,0,|12||-1--1--1|-1--1--1|-1--1--1|-1--1--1|-1--1--1|96,96,67,2\n";

pub const FOOTER_LINES: &str = ":L<%^E!@\n5:Time\n19:67,0\n24:0\n25:0\n26:0\n";

pub const CONTROL_BLOCK: &str = "********************************************************\n\
    \t.Control\n\
    ********************************************************~\n\
    \t\tSimulation Control Parameters\n\
    \t|\n\n\
    FINAL TIME  = 100\n\
    \t~\tMonth\n\
    \t~\tThe final time for the simulation.\n\
    \t|\n\n\
    INITIAL TIME  = 0\n\
    \t~\tMonth\n\
    \t~\tThe initial time for the simulation.\n\
    \t|\n\n\
    SAVEPER  = \n        TIME STEP\n\
    \t~\tMonth [0,?]\n\
    \t~\tThe frequency with which output is stored.\n\
    \t|\n\n\
    TIME STEP  = 1\n\
    \t~\tMonth [0,?]\n\
    \t~\tThe time step for the simulation.\n\
    \t|\n\n";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub markers: SketchMarker,
    /// Emit the simulation control block after the model equations.
    pub with_control: bool,
}

/// `|(x,y)(x,y)|`, or `|(0,0)|` for a straight arrow.
pub fn polyline(points: &[Point]) -> String {
    if points.is_empty() {
        return "|(0,0)|".to_owned();
    }
    let mut out = String::from("|");
    for p in points {
        out.push_str(&format!("({},{})", p.x, p.y));
    }
    out.push('|');
    out
}

/// A `10,` record, in the extended form when the variable has a border
/// color.
pub fn variable_record(var: &Variable) -> String {
    let head = format!(
        "10,{},{},{},{},{},{},{}",
        var.id,
        quote_name(&var.name),
        var.x,
        var.y,
        var.width,
        var.height,
        var.kind.shape_code()
    );
    match var.border_color {
        Some(border) => {
            let fill = var.fill_color.unwrap_or(Rgb::BLACK);
            format!("{head},3,0,1,-1,1,0,0,{border},{fill},|||0-0-0,0,0,0,0,0,0")
        }
        None => format!("{head},3,0,0,-1,0,0,0,0,0,0,0,0,0"),
    }
}

pub fn valve_record(valve: &Valve) -> String {
    format!(
        "11,{},{},{},{},{},{},34,3,0,0,1,0,0,0,0,0,0,0,0,0",
        valve.id, valve.code, valve.x, valve.y, valve.width, valve.height
    )
}

pub fn cloud_record(cloud: &Cloud) -> String {
    format!(
        "12,{},{},{},{},{},{},0,3,0,0,-1,0,0,0,0,0,0,0,0,0",
        cloud.id, cloud.code, cloud.x, cloud.y, cloud.width, cloud.height
    )
}

/// How a `1,` record's styling fields are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectorStyle<'a> {
    Standard,
    Colored(Rgb),
    Params(&'a ConnectorParams),
}

pub fn connector_record(id: i32, from: i32, to: i32, style: ConnectorStyle, points: &[Point]) -> String {
    let poly = polyline(points);
    match style {
        ConnectorStyle::Standard => {
            format!("1,{id},{from},{to},0,0,0,22,0,192,0,-1--1--1,,1{poly}")
        }
        ConnectorStyle::Colored(color) => {
            format!("1,{id},{from},{to},0,0,0,0,1,64,0,{color},|||0-0-0,1{poly}")
        }
        ConnectorStyle::Params(p) => format!(
            "1,{id},{from},{to},{},{},{},{},0,192,0,-1--1--1,,1{poly}",
            p.shape, p.hidden, p.polarity, p.thickness
        ),
    }
}

/// One equation block with its trailing blank line.
pub fn equation_block(name: &str, rhs: &str, units: &str, description: &str) -> String {
    format!("{}  = {rhs}\n\t~\t{units}\n\t~\t{description}\t|\n\n", quote_name(name))
}

fn function_of(deps: &[Dependency]) -> String {
    let deps: Vec<String> = deps
        .iter()
        .map(|d| {
            let name = quote_name(&d.name);
            if d.negative { format!("-{name}") } else { name.into_owned() }
        })
        .collect();
    format!("A FUNCTION OF( {})", deps.join(","))
}

fn validate(model: &StructuralModel) -> Result<()> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for var in &model.variables {
        if !ids.insert(var.id) {
            return Err(Error::InvalidModel(format!("duplicate variable id {}", var.id)));
        }
        if !names.insert(var.name.as_str()) {
            return Err(Error::InvalidModel(format!("duplicate variable name '{}'", var.name)));
        }
    }
    for conn in &model.connections {
        for end in [conn.from, conn.to] {
            if !ids.contains(&end) {
                return Err(Error::InvalidModel(format!(
                    "connection {} -> {} references unknown variable {end}",
                    conn.from, conn.to
                )));
            }
        }
    }
    Ok(())
}

/// Dependencies of a variable with no parsed equation, rebuilt from the
/// connections.  Outflows recorded as stock-to-flow pairs come back as
/// negated flows on the stock.
pub fn derived_dependencies(model: &StructuralModel, var: &Variable) -> Vec<Dependency> {
    let kind_of = |id: i32| model.variable(id).map(|v| v.kind);
    let name_of = |id: i32| model.variable(id).map(|v| v.name.clone());
    let is_outflow = |conn: &Connection| {
        conn.provenance == Provenance::FromEquation
            && !conn.polarity.is_declared()
            && kind_of(conn.from) == Some(VariableKind::Stock)
            && kind_of(conn.to) == Some(VariableKind::Flow)
    };

    let mut deps = vec![];
    for conn in &model.connections {
        if conn.to == var.id && !is_outflow(conn) {
            if let Some(name) = name_of(conn.from) {
                deps.push(Dependency {
                    name,
                    negative: conn.polarity == Polarity::Negative,
                });
            }
        } else if conn.from == var.id && is_outflow(conn) {
            if let Some(name) = name_of(conn.to) {
                deps.push(Dependency { name, negative: true });
            }
        }
    }
    deps
}

fn write_equations(model: &StructuralModel, out: &mut String) {
    let mut names: BTreeSet<&str> = model.variables.iter().map(|v| v.name.as_str()).collect();
    names.extend(model.equations.iter().map(|e| e.name.as_str()));

    for name in names {
        let block = match model.equation(name) {
            Some(eqn) => {
                let rhs = match &eqn.body {
                    EquationBody::FunctionOf(deps) => function_of(deps),
                    EquationBody::Expression(expr) => expr.clone(),
                };
                equation_block(name, &rhs, &eqn.units, &eqn.description)
            }
            None => {
                let deps = model
                    .variable_by_name(name)
                    .map(|var| derived_dependencies(model, var))
                    .unwrap_or_default();
                equation_block(name, &function_of(&deps), "", "")
            }
        };
        out.push_str(&block);
    }
}

enum Element<'a> {
    Variable(&'a Variable),
    Valve(&'a Valve),
    Cloud(&'a Cloud),
}

/// Regenerate a complete file.
///
/// Sketch elements are written in ascending id order.  Flow pipes leaving
/// a valve are written immediately before that valve; influence arrows,
/// then any remaining raw valve and cloud connectors, follow the
/// elements.  Connections without an id get one after the largest id in
/// use.
pub fn write_mdl(model: &StructuralModel, options: &WriteOptions) -> Result<String> {
    validate(model)?;

    let mut out = String::from("{UTF-8}\n");
    write_equations(model, &mut out);
    if options.with_control {
        out.push_str(CONTROL_BLOCK);
    }
    out.push_str(options.markers.header());
    out.push_str(VIEW_HEADER);

    let mut ids = IdAllocator::new();
    let mut elements: BTreeMap<(i32, u8), Element> = BTreeMap::new();
    for var in &model.variables {
        elements.insert((var.id, 0), Element::Variable(var));
    }
    for valve in &model.valves {
        elements.insert((valve.id, 1), Element::Valve(valve));
    }
    for cloud in &model.clouds {
        elements.insert((cloud.id, 2), Element::Cloud(cloud));
    }
    for &(id, _) in elements.keys() {
        ids.observe(id);
    }
    let explicit_ids = model
        .connections
        .iter()
        .filter_map(|c| c.id)
        .chain(model.flow_connections.iter().filter_map(|c| c.id));
    for id in explicit_ids {
        ids.observe(id);
    }

    // indices into flow_connections, by the valve they leave
    let mut pipes: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, fc) in model.flow_connections.iter().enumerate() {
        if fc.params.is_flow_pipe() && model.valves.iter().any(|v| v.id == fc.from) {
            pipes.entry(fc.from).or_default().push(i);
        }
    }

    for (&(id, _), element) in &elements {
        let line = match element {
            Element::Variable(var) => variable_record(var),
            Element::Valve(valve) => {
                for &i in pipes.get(&id).into_iter().flatten() {
                    let fc = &model.flow_connections[i];
                    let conn_id = match fc.id {
                        Some(conn_id) => conn_id,
                        None => ids.alloc()?,
                    };
                    out.push_str(&connector_record(
                        conn_id,
                        fc.from,
                        fc.to,
                        ConnectorStyle::Params(&fc.params),
                        &fc.points,
                    ));
                    out.push('\n');
                }
                valve_record(valve)
            }
            Element::Cloud(cloud) => cloud_record(cloud),
        };
        out.push_str(&line);
        out.push('\n');
    }

    let raw_ids: HashSet<i32> = model.flow_connections.iter().filter_map(|c| c.id).collect();
    for conn in &model.connections {
        if conn.provenance == Provenance::FromEquation {
            continue;
        }
        if conn.id.is_some_and(|id| raw_ids.contains(&id)) {
            continue;
        }
        let id = match conn.id {
            Some(id) => id,
            None => ids.alloc()?,
        };
        let style = match (&conn.color, &conn.params) {
            (Some(color), _) => ConnectorStyle::Colored(*color),
            (None, Some(params)) => ConnectorStyle::Params(params),
            (None, None) => ConnectorStyle::Standard,
        };
        out.push_str(&connector_record(id, conn.from, conn.to, style, &conn.points));
        out.push('\n');
    }

    let emitted_pipes: HashSet<usize> = pipes.values().flatten().copied().collect();
    for (i, fc) in model.flow_connections.iter().enumerate() {
        if emitted_pipes.contains(&i) {
            continue;
        }
        let id = match fc.id {
            Some(id) => id,
            None => ids.alloc()?,
        };
        out.push_str(&connector_record(
            id,
            fc.from,
            fc.to,
            ConnectorStyle::Params(&fc.params),
            &fc.points,
        ));
        out.push('\n');
    }

    out.push_str(options.markers.footer());
    out.push_str(FOOTER_LINES);

    log::info!(
        variables = model.variables.len(), valves = model.valves.len(),
        clouds = model.clouds.len(), connections = model.connections.len();
        "wrote mdl"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Equation, FlowConnection};

    fn var(id: i32, name: &str, kind: VariableKind, x: i32, y: i32) -> Variable {
        Variable {
            id,
            name: name.to_owned(),
            kind,
            x,
            y,
            width: 60,
            height: 26,
            border_color: None,
            fill_color: None,
        }
    }

    fn sketch_lines(text: &str) -> Vec<&str> {
        text.lines()
            .skip_while(|l| !l.contains("---///"))
            .skip(4)
            .take_while(|l| !l.starts_with("///---"))
            .collect()
    }

    #[test]
    fn test_standard_variable_record() {
        let v = var(3, "Knowledge", VariableKind::Stock, 400, 200);
        let line = variable_record(&v);
        assert_eq!("10,3,Knowledge,400,200,60,26,3,3,0,0,-1,0,0,0,0,0,0,0,0,0", line);
        assert_eq!(21, line.split(',').count());
    }

    #[test]
    fn test_colored_variable_record() {
        let mut v = var(13, "Trust", VariableKind::Auxiliary, 10, 20);
        v.border_color = Some(Rgb::GREEN);
        assert_eq!(
            "10,13,Trust,10,20,60,26,8,3,0,1,-1,1,0,0,0-255-0,0-0-0,|||0-0-0,0,0,0,0,0,0",
            variable_record(&v)
        );
        v.fill_color = Some(Rgb::new(255, 255, 128));
        assert!(variable_record(&v).contains(",0-255-0,255-255-128,|||"));
    }

    #[test]
    fn test_quoted_names() {
        let v = var(1, "Rate, adjusted", VariableKind::Flow, 0, 0);
        assert!(variable_record(&v).starts_with("10,1,\"Rate, adjusted\",0,0,60,26,40,"));
    }

    #[test]
    fn test_connector_styles() {
        assert_eq!(
            "1,5,1,2,0,0,0,22,0,192,0,-1--1--1,,1|(0,0)|",
            connector_record(5, 1, 2, ConnectorStyle::Standard, &[])
        );
        assert_eq!(
            "1,5,1,2,0,0,0,0,1,64,0,0-192-0,|||0-0-0,1|(10,20)(30,40)|",
            connector_record(
                5,
                1,
                2,
                ConnectorStyle::Colored(Rgb::DARK_GREEN),
                &[Point::new(10, 20), Point::new(30, 40)]
            )
        );
        let params = ConnectorParams {
            shape: "4".to_owned(),
            hidden: "0".to_owned(),
            polarity: "0".to_owned(),
            thickness: "22".to_owned(),
        };
        assert_eq!(
            "1,7,6,3,4,0,0,22,0,192,0,-1--1--1,,1|(0,0)|",
            connector_record(7, 6, 3, ConnectorStyle::Params(&params), &[])
        );
    }

    #[test]
    fn test_equation_block() {
        assert_eq!(
            "Trust  = A FUNCTION OF( Contact,-Conflict)\n\t~\tDmnl\n\t~\tHow much.\t|\n\n",
            equation_block("Trust", "A FUNCTION OF( Contact,-Conflict)", "Dmnl", "How much.")
        );
    }

    #[test]
    fn test_write_orders_pipes_before_valves() {
        let mut model = StructuralModel {
            variables: vec![
                var(1, "Stock A", VariableKind::Stock, 100, 100),
                var(4, "Outflow", VariableKind::Flow, 200, 130),
            ],
            valves: vec![Valve {
                id: 3,
                code: 0,
                x: 200,
                y: 100,
                width: 6,
                height: 8,
            }],
            clouds: vec![Cloud {
                id: 2,
                code: 48,
                x: 300,
                y: 100,
                width: 10,
                height: 8,
            }],
            ..Default::default()
        };
        let pipe = |id, to| FlowConnection {
            id: Some(id),
            from: 3,
            to,
            params: ConnectorParams {
                shape: "4".to_owned(),
                ..ConnectorParams::default()
            },
            points: vec![],
        };
        model.flow_connections = vec![pipe(5, 1), pipe(6, 2)];

        let text = write_mdl(&model, &WriteOptions::default()).unwrap();
        let lines = sketch_lines(&text);
        assert_eq!(
            vec![
                "10,1,Stock A,100,100,60,26,3,3,0,0,-1,0,0,0,0,0,0,0,0,0",
                "12,2,48,300,100,10,8,0,3,0,0,-1,0,0,0,0,0,0,0,0,0",
                "1,5,3,1,4,0,0,22,0,192,0,-1--1--1,,1|(0,0)|",
                "1,6,3,2,4,0,0,22,0,192,0,-1--1--1,,1|(0,0)|",
                "11,3,0,200,100,6,8,34,3,0,0,1,0,0,0,0,0,0,0,0,0",
                "10,4,Outflow,200,130,60,26,40,3,0,0,-1,0,0,0,0,0,0,0,0,0",
            ],
            lines
        );
    }

    #[test]
    fn test_write_allocates_connection_ids() {
        let mut model = StructuralModel {
            variables: vec![
                var(1, "A", VariableKind::Auxiliary, 100, 100),
                var(2, "B", VariableKind::Auxiliary, 300, 100),
            ],
            ..Default::default()
        };
        let mut with_id = Connection::new(1, 2, Polarity::Positive, Provenance::FromSketch);
        with_id.id = Some(9);
        model.connections = vec![
            with_id,
            Connection::new(2, 1, Polarity::Negative, Provenance::FromEnhancement),
            Connection::new(2, 1, Polarity::Negative, Provenance::FromEquation),
        ];
        let text = write_mdl(&model, &WriteOptions::default()).unwrap();
        let lines = sketch_lines(&text);
        assert_eq!(4, lines.len());
        assert!(lines[2].starts_with("1,9,1,2,"));
        assert!(lines[3].starts_with("1,10,2,1,"));
    }

    #[test]
    fn test_unnumbered_pipes_take_fresh_ids() {
        let big = 30_000_000;
        let mut model = StructuralModel {
            variables: vec![var(1, "Stock A", VariableKind::Stock, 100, 100)],
            valves: vec![Valve {
                id: big,
                code: 0,
                x: 200,
                y: 100,
                width: 6,
                height: 8,
            }],
            ..Default::default()
        };
        model.flow_connections = vec![FlowConnection {
            id: None,
            from: big,
            to: 1,
            params: ConnectorParams {
                shape: "4".to_owned(),
                ..ConnectorParams::default()
            },
            points: vec![],
        }];
        let text = write_mdl(&model, &WriteOptions::default()).unwrap();
        let lines = sketch_lines(&text);
        assert_eq!("1,30000001,30000000,1,4,0,0,22,0,192,0,-1--1--1,,1|(0,0)|", lines[1]);

        model.valves[0].id = i32::MAX;
        model.flow_connections[0].from = i32::MAX;
        assert!(matches!(
            write_mdl(&model, &WriteOptions::default()),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn test_equations_sorted_and_derived() {
        let mut model = StructuralModel {
            variables: vec![
                var(1, "Zeta", VariableKind::Auxiliary, 100, 100),
                var(2, "Alpha", VariableKind::Auxiliary, 300, 100),
                var(3, "Beta", VariableKind::Auxiliary, 300, 300),
            ],
            ..Default::default()
        };
        model.connections = vec![
            Connection::new(2, 1, Polarity::Positive, Provenance::FromSketch),
            Connection::new(3, 1, Polarity::Negative, Provenance::FromSketch),
        ];
        model.equations = vec![Equation {
            name: "Beta".to_owned(),
            body: EquationBody::FunctionOf(vec![Dependency {
                name: "Alpha".to_owned(),
                negative: true,
            }]),
            units: "people".to_owned(),
            description: String::new(),
        }];
        let text = write_mdl(&model, &WriteOptions::default()).unwrap();
        let alpha = text.find("Alpha  = A FUNCTION OF( )").unwrap();
        let beta = text.find("Beta  = A FUNCTION OF( -Alpha)\n\t~\tpeople\n").unwrap();
        let zeta = text.find("Zeta  = A FUNCTION OF( Alpha,-Beta)").unwrap();
        assert!(alpha < beta && beta < zeta);
        assert!(text.starts_with("{UTF-8}\n"));
    }

    #[test]
    fn test_stock_outflows_are_negated() {
        let mut model = StructuralModel {
            variables: vec![
                var(1, "Pool", VariableKind::Stock, 100, 100),
                var(2, "Drain", VariableKind::Flow, 300, 100),
                var(3, "Fill", VariableKind::Flow, 300, 300),
            ],
            ..Default::default()
        };
        model.connections = vec![
            Connection::new(1, 2, Polarity::Undeclared, Provenance::FromEquation),
            Connection::new(3, 1, Polarity::Undeclared, Provenance::FromEquation),
        ];
        let text = write_mdl(&model, &WriteOptions::default()).unwrap();
        assert!(text.contains("Pool  = A FUNCTION OF( -Drain,Fill)"));
        assert!(text.contains("Drain  = A FUNCTION OF( )"));
    }

    #[test]
    fn test_control_block_and_markers() {
        let model = StructuralModel {
            variables: vec![var(1, "A", VariableKind::Auxiliary, 100, 100)],
            ..Default::default()
        };
        let options = WriteOptions {
            markers: SketchMarker::Alternate,
            with_control: true,
        };
        let text = write_mdl(&model, &options).unwrap();
        let control = text.find("\t.Control\n").unwrap();
        let marker = text.find("--/// Sketch information").unwrap();
        assert!(control < marker);
        assert!(text.contains("SAVEPER  = \n        TIME STEP\n"));
        assert!(text.ends_with("///---\\\n:L<%^E!@\n5:Time\n19:67,0\n24:0\n25:0\n26:0\n"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let model = StructuralModel {
            variables: vec![
                var(1, "A", VariableKind::Auxiliary, 100, 100),
                var(2, "A", VariableKind::Auxiliary, 300, 100),
            ],
            ..Default::default()
        };
        let err = write_mdl(&model, &WriteOptions::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate variable name 'A'"));
    }

    #[test]
    fn test_dangling_connection_rejected() {
        let model = StructuralModel {
            variables: vec![var(1, "A", VariableKind::Auxiliary, 100, 100)],
            connections: vec![Connection::new(1, 7, Polarity::Positive, Provenance::FromSketch)],
            ..Default::default()
        };
        assert!(matches!(
            write_mdl(&model, &WriteOptions::default()),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn test_polyline() {
        assert_eq!("|(0,0)|", polyline(&[]));
        assert_eq!("|(1,2)(3,-4)|", polyline(&[Point::new(1, 2), Point::new(3, -4)]));
    }
}
