// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::path::Path;

use sd_sketch::json::{self, Documents};
use sd_sketch::model::{Connection, Equation, FlowEndpoint};
use sd_sketch::{
    Point, Polarity, Provenance, Rgb, SketchMarker, StructuralModel, VariableKind, WriteOptions,
    open_mdl, parse_mdl, save_mdl, write_mdl,
};

static FIXTURE: &str = "tests/data/knowledge_sharing.mdl";

fn fixture() -> StructuralModel {
    let parsed = open_mdl(Path::new(FIXTURE)).unwrap();
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    parsed.model
}

fn find<'a>(model: &'a StructuralModel, from: &str, to: &str) -> &'a Connection {
    let from = model.variable_by_name(from).unwrap().id;
    let to = model.variable_by_name(to).unwrap().id;
    model
        .connections
        .iter()
        .find(|c| c.key() == (from, to))
        .unwrap_or_else(|| panic!("no connection {from} -> {to}"))
}

fn sorted_connections(model: &StructuralModel) -> Vec<Connection> {
    let mut conns = model.connections.clone();
    conns.sort_by_key(|c| c.key());
    conns
}

fn sorted_equations(model: &StructuralModel) -> Vec<Equation> {
    let mut eqns = model.equations.clone();
    eqns.sort_by(|a, b| a.name.cmp(&b.name));
    eqns
}

#[test]
fn reads_knowledge_sharing() {
    let parsed = open_mdl(Path::new(FIXTURE)).unwrap();
    assert_eq!(SketchMarker::Standard, parsed.marker);
    assert_eq!(15, parsed.next_id);

    let model = parsed.model;
    let names: Vec<&str> = model.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(
        vec![
            "Knowledge Stock",
            "Learning",
            "Forgetting",
            "Peer Trust",
            "Contact Frequency",
            "Core Developer"
        ],
        names
    );
    assert_eq!(VariableKind::Stock, model.variables[0].kind);
    assert_eq!(VariableKind::Flow, model.variables[1].kind);

    let trust = model.variable_by_name("Peer Trust").unwrap();
    assert_eq!(Some(Rgb::GREEN), trust.border_color);
    assert_eq!(Some(Rgb::BLACK), trust.fill_color);

    // comment records are not clouds
    assert_eq!(vec![2, 8], model.clouds.iter().map(|c| c.id).collect::<Vec<_>>());
    assert_eq!(vec![5, 9], model.valves.iter().map(|v| v.id).collect::<Vec<_>>());

    // neither valve shares an id with its flow
    assert_eq!(Some(&6), model.valve_to_flow.get(&5));
    assert_eq!(Some(&10), model.valve_to_flow.get(&9));

    let learning = model.flows.iter().find(|f| f.valve == 5).unwrap();
    assert_eq!(FlowEndpoint::Cloud(2), learning.from);
    assert_eq!(FlowEndpoint::Stock(1), learning.to);
    let forgetting = model.flows.iter().find(|f| f.valve == 9).unwrap();
    assert_eq!(FlowEndpoint::Stock(1), forgetting.from);
    assert_eq!(FlowEndpoint::Cloud(8), forgetting.to);
    assert_eq!(4, model.flow_connections.len());

    assert_eq!(5, model.connections.len());
    // the outflow pipe 9 -> stock is only kept as stock -> flow
    let forgetting_id = model.variable_by_name("Forgetting").unwrap().id;
    assert!(model.connections.iter().all(|c| c.key() != (forgetting_id, 1)));
    assert_eq!(Some(18), find(&model, "Knowledge Stock", "Forgetting").id);
    assert_eq!(Polarity::Positive, find(&model, "Contact Frequency", "Peer Trust").polarity);

    let core = find(&model, "Core Developer", "Peer Trust");
    assert_eq!(Some(Rgb::DARK_GREEN), core.color);
    // undeclared in the sketch, taken from the equation
    assert_eq!(Polarity::Negative, core.polarity);

    let trust_to_learning = find(&model, "Peer Trust", "Learning");
    assert_eq!(Some(17), trust_to_learning.id);
    assert_eq!(vec![Point::new(380, 240)], trust_to_learning.points);
    assert_eq!(Provenance::FromSketch, trust_to_learning.provenance);

    let stock = model.equation("Knowledge Stock").unwrap();
    assert_eq!("ideas", stock.units);
    assert_eq!("Shared knowledge accumulated by the team.", stock.description);
    // the control section is not part of the model
    assert!(model.equation("FINAL TIME").is_none());
}

#[test]
fn regenerated_file_reads_back_the_same() {
    let model = fixture();
    let text = write_mdl(&model, &WriteOptions::default()).unwrap();
    let reread = parse_mdl(&text).unwrap();
    assert!(reread.warnings.is_empty(), "{:?}", reread.warnings);
    let reread = reread.model;

    assert_eq!(model.variables, reread.variables);
    assert_eq!(model.valves, reread.valves);
    assert_eq!(model.clouds, reread.clouds);
    assert_eq!(model.flows, reread.flows);
    assert_eq!(model.flow_connections, reread.flow_connections);
    assert_eq!(model.valve_to_flow, reread.valve_to_flow);
    assert_eq!(sorted_connections(&model), sorted_connections(&reread));
    assert_eq!(sorted_equations(&model), sorted_equations(&reread));

    assert_eq!(text, write_mdl(&reread, &WriteOptions::default()).unwrap());
}

#[test]
fn regenerated_sketch_keeps_record_order() {
    let model = fixture();
    let text = write_mdl(&model, &WriteOptions::default()).unwrap();
    let records: Vec<String> = text
        .lines()
        .filter(|l| ["1,", "10,", "11,", "12,"].iter().any(|p| l.starts_with(p)))
        .map(|l| l.split(',').take(2).collect::<Vec<_>>().join(","))
        .collect();
    assert_eq!(
        vec![
            "10,1", "12,2", "1,3", "1,4", "11,5", "10,6", "12,8", "1,7", "1,11", "11,9", "10,10",
            "10,12", "10,13", "10,14", "1,15", "1,16", "1,17", "1,18",
        ],
        records
    );
    assert!(text.contains("10,12,Peer Trust,400,150,60,26,8,3,0,1,-1,1,0,0,0-255-0,0-0-0,|||0-0-0,0,0,0,0,0,0\n"));
    assert!(text.contains("1,16,14,12,0,0,0,0,1,64,0,0-192-0,|||0-0-0,1|(0,0)|\n"));
    assert!(text.contains("1,17,12,6,0,0,0,22,0,192,0,-1--1--1,,1|(380,240)|\n"));
    assert!(text.contains("Peer Trust  = A FUNCTION OF( Contact Frequency,-Core Developer)\n"));
    assert!(text.contains("Learning  = A FUNCTION OF( Peer Trust)\n"));
}

#[test]
fn control_block_and_alternate_markers() {
    let model = fixture();
    let options = WriteOptions {
        markers: SketchMarker::Alternate,
        with_control: true,
    };
    let text = write_mdl(&model, &options).unwrap();
    assert!(text.contains(".Control"));
    assert!(text.contains("FINAL TIME  = 100"));
    assert!(text.contains("\n--/// Sketch information"));
    assert!(text.contains("\n///---\\\n"));

    let reread = parse_mdl(&text).unwrap();
    assert_eq!(SketchMarker::Alternate, reread.marker);
    assert_eq!(model.variables, reread.model.variables);
    assert!(reread.model.equation("FINAL TIME").is_none());
}

#[test]
fn save_and_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.mdl");
    let model = fixture();
    save_mdl(&path, &model, &WriteOptions::default()).unwrap();
    let reread = open_mdl(&path).unwrap();
    assert_eq!(model.variables, reread.model.variables);
}

#[test]
fn json_documents_carry_the_sketch() {
    let dir = tempfile::tempdir().unwrap();
    let model = fixture();
    json::write_dir(dir.path(), &Documents::from_model(&model)).unwrap();
    assert!(dir.path().join(json::PLUMBING_FILE).exists());

    let rebuilt = json::read_dir(dir.path()).unwrap().to_model().unwrap();
    assert_eq!(model.variables, rebuilt.variables);
    assert_eq!(model.connections, rebuilt.connections);
    assert_eq!(model.valves, rebuilt.valves);
    assert_eq!(model.clouds, rebuilt.clouds);
    assert_eq!(model.flows, rebuilt.flows);
    assert_eq!(model.flow_connections, rebuilt.flow_connections);
    assert_eq!(model.valve_to_flow, rebuilt.valve_to_flow);

    let stock = rebuilt.equation("Knowledge Stock").unwrap();
    assert_eq!("ideas", stock.units);

    // a model built from documents can be written out
    let text = write_mdl(&rebuilt, &WriteOptions::default()).unwrap();
    let reread = parse_mdl(&text).unwrap();
    assert_eq!(model.variables, reread.model.variables);
}

#[test]
fn missing_sketch_is_fatal() {
    let err = parse_mdl("{UTF-8}\nA  = 1\n\t~\t\n\t~\t\t|\n").unwrap_err();
    assert!(err.to_string().contains("no sketch section"));
}
