// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! JSON interchange documents: `variables.json`, `connections.json` and
//! the optional `plumbing.json`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::model::{
    Cloud, Connection, ConnectorParams, Equation, EquationBody, Flow, FlowConnection,
    FlowEndpoint, Point, Polarity, Provenance, Rgb, StructuralModel, Valve, Variable, VariableKind,
};
use crate::writer::derived_dependencies;

pub const VARIABLES_FILE: &str = "variables.json";
pub const CONNECTIONS_FILE: &str = "connections.json";
pub const PLUMBING_FILE: &str = "plumbing.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableColor {
    pub border: Rgb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Rgb>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<VariableColor>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub units: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineColor {
    pub line: Rgb,
}

fn undeclared() -> Polarity {
    Polarity::Undeclared
}

fn sketch() -> Provenance {
    Provenance::FromSketch
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// Connector id as a string; absent for links not yet drawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from_var: String,
    pub to_var: String,
    #[serde(default = "undeclared")]
    pub relationship: Polarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<LineColor>,
    #[serde(default = "sketch")]
    pub source: Provenance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ConnectorParams>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveEntry {
    pub id: i32,
    /// Name of the flow variable the valve draws, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_name: Option<String>,
    #[serde(default)]
    pub code: i32,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

fn cloud_code() -> i32 {
    Cloud::SHAPE_CODE
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEntry {
    pub id: i32,
    #[serde(default = "cloud_code")]
    pub code: i32,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Stock,
    Cloud,
}

/// A stock is referenced by name, a cloud by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointValue {
    Id(i32),
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef {
    pub kind: EndpointKind,
    #[serde(rename = "ref")]
    pub reference: EndpointValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub valve_id: i32,
    pub from: EndpointRef,
    pub to: EndpointRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConnectionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from_id: i32,
    pub to_id: i32,
    #[serde(default)]
    pub params: ConnectorParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPoints {
    pub from_id: i32,
    pub to_id: i32,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariablesDoc {
    pub variables: Vec<VariableEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionsDoc {
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlumbingDoc {
    pub valves: Vec<ValveEntry>,
    pub clouds: Vec<CloudEntry>,
    pub flows: Vec<FlowEntry>,
    pub flow_connections: Vec<FlowConnectionEntry>,
    /// Routed geometry for links that carry no points of their own.
    pub link_points: Vec<LinkPoints>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Documents {
    pub variables: VariablesDoc,
    pub connections: ConnectionsDoc,
    pub plumbing: Option<PlumbingDoc>,
}

fn parse_id(id: &Option<String>) -> Option<i32> {
    id.as_deref().and_then(|s| s.trim().parse().ok())
}

impl Documents {
    pub fn from_model(model: &StructuralModel) -> Self {
        let name_of = |id: i32| model.variable(id).map(|v| v.name.clone());

        let variables = model
            .variables
            .iter()
            .map(|var| {
                let eqn = model.equation(&var.name);
                VariableEntry {
                    id: var.id,
                    name: var.name.clone(),
                    kind: var.kind,
                    x: var.x,
                    y: var.y,
                    width: var.width,
                    height: var.height,
                    color: var.border_color.map(|border| VariableColor {
                        border,
                        fill: var.fill_color,
                    }),
                    units: eqn.map(|e| e.units.clone()).unwrap_or_default(),
                    description: eqn.map(|e| e.description.clone()).unwrap_or_default(),
                }
            })
            .collect();

        let connections = model
            .connections
            .iter()
            .filter_map(|conn| {
                Some(ConnectionEntry {
                    id: conn.id.map(|id| id.to_string()),
                    from_var: name_of(conn.from)?,
                    to_var: name_of(conn.to)?,
                    relationship: conn.polarity,
                    color: conn.color.map(|line| LineColor { line }),
                    source: conn.provenance,
                    points: conn.points.clone(),
                    params: conn.params.clone(),
                })
            })
            .collect();

        let plumbing = if model.valves.is_empty() && model.clouds.is_empty() && model.flows.is_empty() {
            None
        } else {
            let endpoint = |ep: FlowEndpoint| match ep {
                FlowEndpoint::Cloud(id) => EndpointRef {
                    kind: EndpointKind::Cloud,
                    reference: EndpointValue::Id(id),
                },
                FlowEndpoint::Stock(id) => EndpointRef {
                    kind: EndpointKind::Stock,
                    reference: name_of(id).map_or(EndpointValue::Id(id), EndpointValue::Name),
                },
            };
            Some(PlumbingDoc {
                valves: model
                    .valves
                    .iter()
                    .map(|v| ValveEntry {
                        id: v.id,
                        var_name: model.valve_to_flow.get(&v.id).and_then(|&flow| name_of(flow)),
                        code: v.code,
                        x: v.x,
                        y: v.y,
                        w: v.width,
                        h: v.height,
                    })
                    .collect(),
                clouds: model
                    .clouds
                    .iter()
                    .map(|c| CloudEntry {
                        id: c.id,
                        code: c.code,
                        x: c.x,
                        y: c.y,
                        w: c.width,
                        h: c.height,
                    })
                    .collect(),
                flows: model
                    .flows
                    .iter()
                    .map(|f| FlowEntry {
                        valve_id: f.valve,
                        from: endpoint(f.from),
                        to: endpoint(f.to),
                    })
                    .collect(),
                flow_connections: model
                    .flow_connections
                    .iter()
                    .map(|fc| FlowConnectionEntry {
                        id: fc.id.map(|id| id.to_string()),
                        from_id: fc.from,
                        to_id: fc.to,
                        params: fc.params.clone(),
                        points: fc.points.clone(),
                    })
                    .collect(),
                link_points: vec![],
            })
        };

        Documents {
            variables: VariablesDoc { variables },
            connections: ConnectionsDoc { connections },
            plumbing,
        }
    }

    /// Build a model from documents.  Connection endpoints are resolved
    /// by name; an unknown or duplicated name is an error.  Every
    /// variable gets an equation whose dependencies are its inbound
    /// links.
    pub fn to_model(&self) -> Result<StructuralModel> {
        let mut model = StructuralModel::default();
        let mut ids: HashMap<&str, i32> = HashMap::new();

        for entry in &self.variables.variables {
            if ids.insert(entry.name.as_str(), entry.id).is_some() {
                return Err(Error::InvalidModel(format!("duplicate variable name '{}'", entry.name)));
            }
            model.variables.push(Variable {
                id: entry.id,
                name: entry.name.clone(),
                kind: entry.kind,
                x: entry.x,
                y: entry.y,
                width: entry.width,
                height: entry.height,
                border_color: entry.color.as_ref().map(|c| c.border),
                fill_color: entry.color.as_ref().and_then(|c| c.fill),
            });
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| Error::InvalidModel(format!("unknown variable '{name}'")))
        };

        let link_points: BTreeMap<(i32, i32), &Vec<Point>> = self
            .plumbing
            .iter()
            .flat_map(|p| &p.link_points)
            .map(|lp| ((lp.from_id, lp.to_id), &lp.points))
            .collect();
        let points_for = |own: &Vec<Point>, key: (i32, i32)| -> Vec<Point> {
            if own.is_empty() {
                link_points.get(&key).map(|p| p.to_vec()).unwrap_or_default()
            } else {
                own.clone()
            }
        };

        for entry in &self.connections.connections {
            let from = lookup(&entry.from_var)?;
            let to = lookup(&entry.to_var)?;
            model.connections.push(Connection {
                id: parse_id(&entry.id),
                from,
                to,
                polarity: entry.relationship,
                points: points_for(&entry.points, (from, to)),
                color: entry.color.as_ref().map(|c| c.line),
                provenance: entry.source,
                params: entry.params.clone(),
            });
        }

        if let Some(plumbing) = &self.plumbing {
            for v in &plumbing.valves {
                model.valves.push(Valve {
                    id: v.id,
                    code: v.code,
                    x: v.x,
                    y: v.y,
                    width: v.w,
                    height: v.h,
                });
                if let Some(flow) = v.var_name.as_deref().and_then(|n| ids.get(n)) {
                    model.valve_to_flow.insert(v.id, *flow);
                }
            }
            for c in &plumbing.clouds {
                model.clouds.push(Cloud {
                    id: c.id,
                    code: c.code,
                    x: c.x,
                    y: c.y,
                    width: c.w,
                    height: c.h,
                });
            }
            let endpoint = |ep: &EndpointRef| -> Result<FlowEndpoint> {
                let id = match &ep.reference {
                    EndpointValue::Id(id) => *id,
                    EndpointValue::Name(name) => lookup(name)?,
                };
                Ok(match ep.kind {
                    EndpointKind::Cloud => FlowEndpoint::Cloud(id),
                    EndpointKind::Stock => FlowEndpoint::Stock(id),
                })
            };
            for f in &plumbing.flows {
                model.flows.push(Flow {
                    valve: f.valve_id,
                    flow_variable: model.valve_to_flow.get(&f.valve_id).copied(),
                    from: endpoint(&f.from)?,
                    to: endpoint(&f.to)?,
                });
            }
            for fc in &plumbing.flow_connections {
                model.flow_connections.push(FlowConnection {
                    id: parse_id(&fc.id),
                    from: fc.from_id,
                    to: fc.to_id,
                    params: fc.params.clone(),
                    points: points_for(&fc.points, (fc.from_id, fc.to_id)),
                });
            }
        }

        let equations = self
            .variables
            .variables
            .iter()
            .zip(&model.variables)
            .map(|(entry, var)| Equation {
                name: var.name.clone(),
                body: EquationBody::FunctionOf(derived_dependencies(&model, var)),
                units: entry.units.clone(),
                description: entry.description.clone(),
            })
            .collect();
        model.equations = equations;

        Ok(model)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Write the documents into `dir`, creating it if needed.  The plumbing
/// document is only written when present.
pub fn write_dir(dir: &Path, docs: &Documents) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_json(&dir.join(VARIABLES_FILE), &docs.variables)?;
    write_json(&dir.join(CONNECTIONS_FILE), &docs.connections)?;
    if let Some(plumbing) = &docs.plumbing {
        write_json(&dir.join(PLUMBING_FILE), plumbing)?;
    }
    log::info!(dir:? = dir, plumbing = docs.plumbing.is_some(); "wrote json documents");
    Ok(())
}

pub fn read_dir(dir: &Path) -> Result<Documents> {
    let plumbing_path = dir.join(PLUMBING_FILE);
    let plumbing = if plumbing_path.exists() {
        Some(read_json(&plumbing_path)?)
    } else {
        None
    };
    Ok(Documents {
        variables: read_json(&dir.join(VARIABLES_FILE))?,
        connections: read_json(&dir.join(CONNECTIONS_FILE))?,
        plumbing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: i32, name: &str, kind: VariableKind) -> Variable {
        Variable {
            id,
            name: name.to_owned(),
            kind,
            x: id * 100,
            y: 100,
            width: 60,
            height: 26,
            border_color: None,
            fill_color: None,
        }
    }

    #[test]
    fn test_generator_documents_parse() {
        let vars: VariablesDoc = serde_json::from_str(
            r#"{"variables": [
                {"id": 1, "name": "Trust", "type": "Stock", "x": 10, "y": 20, "width": 60, "height": 26,
                 "color": {"border": "0-255-0"}},
                {"id": 2, "name": "Contact", "type": "Auxiliary", "x": 30, "y": 40, "width": 60, "height": 26}
            ]}"#,
        )
        .unwrap();
        let conns: ConnectionsDoc = serde_json::from_str(
            r#"{"connections": [
                {"id": "5", "from_var": "Contact", "to_var": "Trust", "relationship": "negative",
                 "color": {"line": "0-192-0"}},
                {"from_var": "Trust", "to_var": "Contact", "source": "equation"}
            ]}"#,
        )
        .unwrap();
        let docs = Documents {
            variables: vars,
            connections: conns,
            plumbing: None,
        };
        let model = docs.to_model().unwrap();
        assert_eq!(Some(Rgb::GREEN), model.variables[0].border_color);
        assert_eq!(Some(5), model.connections[0].id);
        assert_eq!(Polarity::Negative, model.connections[0].polarity);
        assert_eq!(Some(Rgb::DARK_GREEN), model.connections[0].color);
        assert_eq!(None, model.connections[1].id);
        assert_eq!(Polarity::Undeclared, model.connections[1].polarity);
        assert_eq!(Provenance::FromEquation, model.connections[1].provenance);

        let trust = model.equation("Trust").unwrap();
        assert_eq!(1, trust.dependencies().len());
        assert!(trust.dependencies()[0].negative);
    }

    #[test]
    fn test_unknown_endpoint_is_an_error() {
        let docs = Documents {
            variables: VariablesDoc {
                variables: vec![VariableEntry {
                    id: 1,
                    name: "A".to_owned(),
                    kind: VariableKind::Auxiliary,
                    x: 0,
                    y: 0,
                    width: 60,
                    height: 26,
                    color: None,
                    units: String::new(),
                    description: String::new(),
                }],
            },
            connections: ConnectionsDoc {
                connections: vec![ConnectionEntry {
                    id: None,
                    from_var: "A".to_owned(),
                    to_var: "Nope".to_owned(),
                    relationship: Polarity::Positive,
                    color: None,
                    source: Provenance::FromEnhancement,
                    points: vec![],
                    params: None,
                }],
            },
            plumbing: None,
        };
        let err = docs.to_model().unwrap_err();
        assert!(err.to_string().contains("unknown variable 'Nope'"));
    }

    #[test]
    fn test_model_documents_round_trip() {
        let mut model = StructuralModel {
            variables: vec![
                var(1, "Pool", VariableKind::Stock),
                var(4, "Drain", VariableKind::Flow),
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
            flows: vec![Flow {
                valve: 3,
                flow_variable: Some(4),
                from: FlowEndpoint::Stock(1),
                to: FlowEndpoint::Cloud(2),
            }],
            ..Default::default()
        };
        model.valve_to_flow.insert(3, 4);
        model.connections.push(Connection::new(1, 4, Polarity::Undeclared, Provenance::FromEquation));

        let docs = Documents::from_model(&model);
        let plumbing = docs.plumbing.as_ref().unwrap();
        assert_eq!(Some("Drain".to_owned()), plumbing.valves[0].var_name);
        assert_eq!(EndpointValue::Name("Pool".to_owned()), plumbing.flows[0].from.reference);
        assert_eq!(EndpointValue::Id(2), plumbing.flows[0].to.reference);

        let back = docs.to_model().unwrap();
        assert_eq!(model.variables, back.variables);
        assert_eq!(model.valves, back.valves);
        assert_eq!(model.clouds, back.clouds);
        assert_eq!(model.flows, back.flows);
        assert_eq!(model.connections, back.connections);
        let pool = back.equation("Pool").unwrap();
        assert_eq!("Drain", pool.dependencies()[0].name);
        assert!(pool.dependencies()[0].negative);
    }

    #[test]
    fn test_link_points_fill_missing_geometry() {
        let json = r#"{"valves": [], "clouds": [], "flows": [],
            "flow_connections": [{"id": "7", "from_id": 3, "to_id": 1,
                                  "params": {"field3": "4", "field4": "0", "field5": "0", "field6": "22"}}],
            "link_points": [{"from_id": 3, "to_id": 1, "points": [[5, 6], [7, 8]]}]}"#;
        let plumbing: PlumbingDoc = serde_json::from_str(json).unwrap();
        let docs = Documents {
            plumbing: Some(plumbing),
            ..Default::default()
        };
        let model = docs.to_model().unwrap();
        assert_eq!(vec![Point::new(5, 6), Point::new(7, 8)], model.flow_connections[0].points);
        assert!(model.flow_connections[0].params.is_flow_pipe());
    }

    #[test]
    fn test_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = StructuralModel {
            variables: vec![var(1, "A", VariableKind::Auxiliary)],
            ..Default::default()
        };
        let docs = Documents::from_model(&model);
        write_dir(dir.path(), &docs).unwrap();
        assert!(dir.path().join(VARIABLES_FILE).exists());
        assert!(dir.path().join(CONNECTIONS_FILE).exists());
        assert!(!dir.path().join(PLUMBING_FILE).exists());
        assert_eq!(docs, read_dir(dir.path()).unwrap());
    }
}
