// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Structural model builder.
//!
//! Turns tokenized records and equations into a [`StructuralModel`]:
//! variables with unique names, valves resolved to the flow variables
//! they draw, flows with their endpoints, and the merged set of
//! variable-to-variable connections.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ordered_float::OrderedFloat;

use crate::common::{Warning, push_warning};
use crate::mdl::MdlFile;
use crate::mdl::records::{ConnectorRecord, SketchRecord};
use crate::model::{
    Cloud, Connection, Equation, EquationBody, Flow, FlowConnection, FlowEndpoint, Point,
    Polarity, Provenance, StructuralModel, Valve, Variable, VariableKind,
};
use crate::uid::NameRegistry;

/// Everything learned while building one model.  Nothing here is shared
/// between files.
#[derive(Debug, Default)]
pub struct ParserState {
    pub names: NameRegistry,
    pub warnings: Vec<Warning>,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first id not used by any variable seen so far.
    pub fn next_id(&self) -> i32 {
        self.names.next_id()
    }

    fn warn(&mut self, warning: Warning) {
        push_warning(&mut self.warnings, warning);
    }
}

/// Proximity between a valve and a candidate flow variable.  The worse
/// aligned axis counts double, so a valve sitting on a horizontal pipe
/// prefers the flow label directly above or below it, and a vertical pipe
/// the label beside it.
pub fn proximity_score(valve: Point, flow: Point) -> OrderedFloat<f64> {
    let dx = f64::from((valve.x - flow.x).abs());
    let dy = f64::from((valve.y - flow.y).abs());
    OrderedFloat(dx.min(dy) + 2.0 * dx.max(dy))
}

/// True if `eqn` refers to `name` on its right-hand side.
fn mentions(eqn: &Equation, name: &str) -> bool {
    match &eqn.body {
        EquationBody::FunctionOf(deps) => deps.iter().any(|d| d.name == name),
        EquationBody::Expression(expr) => expr.contains(name),
    }
}

/// Sign of `name` in `eqn`: `Some(true)` if it appears negated.
fn dependency_sign(eqn: &Equation, name: &str) -> Option<bool> {
    eqn.dependencies()
        .iter()
        .find(|d| d.name == name)
        .map(|d| d.negative)
}

/// Lookup tables shared by the resolution passes.
struct Index<'a> {
    variables: HashMap<i32, &'a Variable>,
    valves: HashMap<i32, &'a Valve>,
    clouds: HashSet<i32>,
    equations: HashMap<&'a str, &'a Equation>,
}

impl<'a> Index<'a> {
    fn new(
        variables: &'a [Variable],
        valves: &'a [Valve],
        clouds: &'a [Cloud],
        equations: &'a [Equation],
    ) -> Self {
        let mut eqn_index = HashMap::new();
        for eqn in equations {
            eqn_index.entry(eqn.name.as_str()).or_insert(eqn);
        }
        Index {
            variables: variables.iter().map(|v| (v.id, v)).collect(),
            valves: valves.iter().map(|v| (v.id, v)).collect(),
            clouds: clouds.iter().map(|c| c.id).collect(),
            equations: eqn_index,
        }
    }

    fn kind(&self, id: i32) -> Option<VariableKind> {
        self.variables.get(&id).map(|v| v.kind)
    }

    fn is_stock(&self, id: i32) -> bool {
        self.kind(id) == Some(VariableKind::Stock)
    }

    fn equation_of(&self, id: i32) -> Option<&'a Equation> {
        let var = self.variables.get(&id)?;
        self.equations.get(var.name.as_str()).copied()
    }
}

/// Map each valve id to the id of the flow variable it draws.
///
/// A valve sharing its id with a flow variable is that flow.  Otherwise
/// the flows named in the equations of the stocks the valve touches are
/// intersected (falling back to the first stock's flows when they have
/// nothing in common), and the closest candidate wins, lowest id first
/// on ties.
fn resolve_valves(index: &Index, valves: &[Valve], connectors: &[ConnectorRecord]) -> BTreeMap<i32, i32> {
    let mut valve_to_flow = BTreeMap::new();

    let mut flows: Vec<&Variable> = index
        .variables
        .values()
        .copied()
        .filter(|v| v.kind == VariableKind::Flow)
        .collect();
    flows.sort_by_key(|v| v.id);

    let mut adjacent: HashMap<i32, Vec<i32>> = HashMap::new();
    for conn in connectors {
        let pair = if index.valves.contains_key(&conn.from) && index.is_stock(conn.to) {
            Some((conn.from, conn.to))
        } else if index.valves.contains_key(&conn.to) && index.is_stock(conn.from) {
            Some((conn.to, conn.from))
        } else {
            None
        };
        if let Some((valve, stock)) = pair {
            let stocks = adjacent.entry(valve).or_default();
            if !stocks.contains(&stock) {
                stocks.push(stock);
            }
        }
    }

    for valve in valves {
        if index.kind(valve.id) == Some(VariableKind::Flow) {
            valve_to_flow.insert(valve.id, valve.id);
            continue;
        }

        let Some(stocks) = adjacent.get(&valve.id) else {
            log::debug!(valve = valve.id; "valve touches no stocks");
            continue;
        };

        let flow_sets: Vec<BTreeSet<i32>> = stocks
            .iter()
            .filter_map(|&stock| index.equation_of(stock))
            .map(|eqn| {
                flows
                    .iter()
                    .filter(|flow| mentions(eqn, &flow.name))
                    .map(|flow| flow.id)
                    .collect::<BTreeSet<_>>()
            })
            .filter(|set| !set.is_empty())
            .collect();

        let Some(first) = flow_sets.first() else {
            log::debug!(valve = valve.id; "no stock equation names a flow");
            continue;
        };
        let common = flow_sets[1..]
            .iter()
            .fold(first.clone(), |acc, set| &acc & set);
        let candidates = if common.is_empty() { first } else { &common };

        let valve_pos = Point::new(valve.x, valve.y);
        let best = candidates.iter().copied().min_by_key(|id| {
            let score = index
                .variables
                .get(id)
                .map(|flow| proximity_score(valve_pos, flow.position()))
                .unwrap_or(OrderedFloat(f64::INFINITY));
            (score, *id)
        });

        if let Some(flow) = best {
            log::debug!(valve = valve.id, flow = flow; "resolved valve by stock equations");
            valve_to_flow.insert(valve.id, flow);
        }
    }

    valve_to_flow
}

/// Pair each valve with the two stocks or clouds its pipes reach.
///
/// Direction comes from the stock equations: a stock that adds the flow
/// is the `to` end, a stock that subtracts it the `from` end.  Without
/// that information record order decides.
fn assemble_flows(
    index: &Index,
    valves: &[Valve],
    connectors: &[ConnectorRecord],
    valve_to_flow: &BTreeMap<i32, i32>,
) -> Vec<Flow> {
    let mut flows = vec![];

    for valve in valves {
        let mut ends: Vec<FlowEndpoint> = vec![];
        for conn in connectors.iter().filter(|c| c.from == valve.id) {
            let end = if index.is_stock(conn.to) {
                FlowEndpoint::Stock(conn.to)
            } else if index.clouds.contains(&conn.to) {
                FlowEndpoint::Cloud(conn.to)
            } else {
                continue;
            };
            if !ends.contains(&end) {
                ends.push(end);
            }
            if ends.len() == 2 {
                break;
            }
        }
        if ends.len() != 2 {
            log::debug!(valve = valve.id, ends = ends.len(); "valve is not a two-ended flow");
            continue;
        }

        let flow_variable = valve_to_flow.get(&valve.id).copied();
        let flow_name = flow_variable.and_then(|id| index.variables.get(&id).map(|v| v.name.as_str()));

        let mut to_index = None;
        if let Some(flow_name) = flow_name {
            for (i, end) in ends.iter().enumerate() {
                let FlowEndpoint::Stock(stock) = *end else {
                    continue;
                };
                let sign = index
                    .equation_of(stock)
                    .and_then(|eqn| dependency_sign(eqn, flow_name));
                match sign {
                    Some(false) => to_index = Some(i),
                    Some(true) if to_index.is_none() => to_index = Some(1 - i),
                    _ => {}
                }
            }
        }
        let to_index = to_index.unwrap_or(1);

        flows.push(Flow {
            valve: valve.id,
            flow_variable,
            from: ends[1 - to_index],
            to: ends[to_index],
        });
    }

    flows
}

/// Connections keyed by `(from, to)`.  The first entry for a key wins,
/// except that a declared polarity replaces an undeclared one.
#[derive(Default)]
struct ConnectionSet {
    list: Vec<Connection>,
    index: HashMap<(i32, i32), usize>,
}

impl ConnectionSet {
    fn insert(&mut self, conn: Connection) {
        match self.index.get(&conn.key()) {
            Some(&i) => {
                let existing = &mut self.list[i];
                if !existing.polarity.is_declared() && conn.polarity.is_declared() {
                    existing.polarity = conn.polarity;
                }
            }
            None => {
                self.index.insert(conn.key(), self.list.len());
                self.list.push(conn);
            }
        }
    }
}

/// Sketch arrows between variables, with valve ends replaced by their
/// flow.  A pipe always points away from its valve, so on an outflow it
/// reads flow to stock; those pipes are dropped when `stock_flow` already
/// holds the stock to flow pair from the equation signs.
fn sketch_connections(
    index: &Index,
    connectors: &[ConnectorRecord],
    valve_to_flow: &BTreeMap<i32, i32>,
    known_ids: &HashSet<i32>,
    stock_flow: &HashSet<(i32, i32)>,
    state: &mut ParserState,
) -> Vec<Connection> {
    let mut out = vec![];
    for conn in connectors {
        let from = valve_to_flow.get(&conn.from).copied().unwrap_or(conn.from);
        let to = valve_to_flow.get(&conn.to).copied().unwrap_or(conn.to);

        if valve_to_flow.contains_key(&conn.from) && stock_flow.contains(&(to, from)) {
            log::trace!(connector = conn.id; "pipe runs against an outflow");
            continue;
        }
        if index.variables.contains_key(&from) && index.variables.contains_key(&to) {
            out.push(Connection {
                id: Some(conn.id),
                from,
                to,
                polarity: conn.polarity,
                points: conn.points.clone(),
                color: conn.color,
                provenance: Provenance::FromSketch,
                params: Some(conn.params.clone()),
            });
        } else if !known_ids.contains(&conn.from) || !known_ids.contains(&conn.to) {
            state.warn(Warning::UnresolvedReference {
                from: conn.from.to_string(),
                to: conn.to.to_string(),
                reason: format!("connector {} names an unknown sketch id", conn.id),
            });
        } else {
            log::trace!(connector = conn.id; "connector does not join two variables");
        }
    }
    out
}

/// Stock and flow pairs from the signs in stock equations: `-flow` is an
/// outflow (stock to flow), a bare flow an inflow (flow to stock).
fn stock_flow_connections(index: &Index, equations: &[Equation], state: &ParserState) -> Vec<Connection> {
    let mut out = vec![];
    for eqn in equations {
        let Some(stock) = state.names.id_of(&eqn.name) else {
            continue;
        };
        if !index.is_stock(stock) {
            continue;
        }
        for dep in eqn.dependencies() {
            let Some(flow) = state.names.id_of(&dep.name) else {
                continue;
            };
            if index.kind(flow) != Some(VariableKind::Flow) {
                continue;
            }
            let (from, to) = if dep.negative { (stock, flow) } else { (flow, stock) };
            out.push(Connection::new(from, to, Polarity::Undeclared, Provenance::FromEquation));
        }
    }
    out
}

/// Influence links named by `A FUNCTION OF` lists.  Flows feeding stocks
/// are left to the sign analysis above.
fn equation_connections(index: &Index, equations: &[Equation], state: &mut ParserState) -> Vec<Connection> {
    let mut out = vec![];
    for eqn in equations {
        let Some(target) = state.names.id_of(&eqn.name) else {
            log::trace!(name = eqn.name.as_str(); "equation has no sketch variable");
            continue;
        };
        let target_is_stock = index.is_stock(target);
        for dep in eqn.dependencies() {
            let Some(source) = state.names.id_of(&dep.name) else {
                state.warn(Warning::UnresolvedReference {
                    from: dep.name.clone(),
                    to: eqn.name.clone(),
                    reason: "dependency is not on the sketch".to_owned(),
                });
                continue;
            };
            if source == target {
                continue;
            }
            if target_is_stock && index.kind(source) == Some(VariableKind::Flow) {
                continue;
            }
            out.push(Connection::new(source, target, dep.polarity(), Provenance::FromEquation));
        }
    }
    out
}

/// Build the structural model of one tokenized file.
pub fn build_model(file: MdlFile, state: &mut ParserState) -> StructuralModel {
    let MdlFile {
        equations: parsed_equations,
        records,
        ..
    } = file;

    // valves may share an id with the flow variable they draw, so ids
    // only collide within one record kind
    let mut seen = HashSet::new();
    let mut known_ids = HashSet::new();
    let mut variables = vec![];
    let mut valves = vec![];
    let mut clouds = vec![];
    let mut connectors = vec![];

    for record in records {
        if let SketchRecord::Connector(conn) = record {
            connectors.push(conn);
            continue;
        }
        if !seen.insert((record.kind(), record.id())) {
            state.warn(Warning::DuplicateId { id: record.id() });
            continue;
        }
        known_ids.insert(record.id());
        match record {
            SketchRecord::Variable(rec) => {
                let registered = state.names.add(rec.id, &rec.name);
                if registered.renamed {
                    state.warn(Warning::DuplicateName {
                        id: rec.id,
                        original: rec.name.clone(),
                        renamed: registered.name.clone(),
                    });
                }
                variables.push(Variable {
                    id: rec.id,
                    name: registered.name,
                    kind: VariableKind::from_shape_code(rec.shape),
                    x: rec.x,
                    y: rec.y,
                    width: rec.width,
                    height: rec.height,
                    border_color: rec.border,
                    fill_color: rec.fill,
                });
            }
            SketchRecord::Valve(rec) => valves.push(Valve {
                id: rec.id,
                code: rec.code,
                x: rec.x,
                y: rec.y,
                width: rec.width,
                height: rec.height,
            }),
            SketchRecord::Cloud(rec) if rec.is_cloud() => clouds.push(Cloud {
                id: rec.id,
                code: rec.code,
                x: rec.x,
                y: rec.y,
                width: rec.width,
                height: rec.height,
            }),
            SketchRecord::Cloud(rec) => {
                log::trace!(id = rec.id, code = rec.code; "skipping sketch comment");
            }
            SketchRecord::Connector(_) => {}
        }
    }

    let mut seen_equations = HashSet::new();
    let equations: Vec<Equation> = parsed_equations
        .into_iter()
        .filter(|eqn| seen_equations.insert(eqn.name.clone()))
        .collect();

    let index = Index::new(&variables, &valves, &clouds, &equations);
    let valve_to_flow = resolve_valves(&index, &valves, &connectors);
    let flows = assemble_flows(&index, &valves, &connectors, &valve_to_flow);

    let flow_connections = connectors
        .iter()
        .filter(|c| {
            index.valves.contains_key(&c.from)
                || index.valves.contains_key(&c.to)
                || index.clouds.contains(&c.from)
                || index.clouds.contains(&c.to)
        })
        .map(|c| FlowConnection {
            id: Some(c.id),
            from: c.from,
            to: c.to,
            params: c.params.clone(),
            points: c.points.clone(),
        })
        .collect();

    let stock_flow = stock_flow_connections(&index, &equations, state);
    let stock_flow_keys: HashSet<(i32, i32)> = stock_flow.iter().map(Connection::key).collect();

    let mut merged = ConnectionSet::default();
    for conn in sketch_connections(&index, &connectors, &valve_to_flow, &known_ids, &stock_flow_keys, state) {
        merged.insert(conn);
    }
    for conn in stock_flow {
        merged.insert(conn);
    }
    for conn in equation_connections(&index, &equations, state) {
        merged.insert(conn);
    }
    let connections = merged.list;

    log::info!(
        variables = variables.len(), valves = valves.len(), clouds = clouds.len(),
        connections = connections.len();
        "built structural model"
    );

    StructuralModel {
        variables,
        connections,
        valves,
        clouds,
        flows,
        flow_connections,
        equations,
        valve_to_flow,
    }
}
