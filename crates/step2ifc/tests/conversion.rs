// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::{valve_zone, Solid, StepBuilder};
use std::collections::HashMap;
use std::f64::consts::PI;
use step2ifc::{
    convert, CancelToken, ConfigError, ConversionConfig, ConversionResult, ConvertError,
    Converter, GeometryMode, IfcDocument, IfcEntity, IfcValue, IngestError, LengthUnit,
    OnInvalid, PartStatus, PropertyMapping, RunOutcome, TypeMappingRule,
};

fn valve_rules() -> ConversionConfig {
    ConversionConfig {
        type_mappings: vec![TypeMappingRule::by_name("^Valve", "IfcValve")],
        ..Default::default()
    }
}

fn run(builder: &StepBuilder, config: &ConversionConfig) -> ConversionResult {
    let dir = tempfile::tempdir().unwrap();
    let path = builder.write(dir.path(), "plant.step");
    convert(&path, config).unwrap()
}

/// GlobalId of every authored element of `class`, in document order
fn element_guids(doc: &IfcDocument, class: &str) -> Vec<String> {
    doc.by_type(class)
        .iter()
        .map(|e| e.attr(0).and_then(IfcValue::as_str).unwrap().to_string())
        .collect()
}

#[test]
fn duplicate_names_become_distinct_elements() {
    let result = run(&valve_zone(), &valve_rules());
    let doc = &result.document;

    let valves = element_guids(doc, "IfcValve");
    assert_eq!(valves.len(), 2);
    assert_ne!(valves[0], valves[1]);
    let tags: Vec<&str> = doc
        .by_type("IfcValve")
        .iter()
        .map(|e| e.attr(7).and_then(IfcValue::as_str).unwrap())
        .collect();
    assert_eq!(tags[0].len(), 12);
    assert_ne!(tags[0], tags[1]);
    assert_eq!(doc.count("IfcBuildingElementProxy"), 1);
    assert_eq!(
        doc.by_type("IfcBuildingElementProxy")[0].attr(2).and_then(IfcValue::as_str),
        Some("Pipe-02")
    );

    let report = &result.qc_report;
    assert_eq!(report.totals.total_parts, 3);
    assert_eq!(report.totals.converted_parts, 3);
    assert_eq!(report.totals.elements, 3);
    let valve_records: Vec<_> = report
        .parts
        .iter()
        .filter(|p| p.canonical_name == "Valve-01")
        .collect();
    assert_eq!(valve_records[0].occurrence_index, 0);
    assert_eq!(valve_records[1].occurrence_index, 1);
    assert_eq!(valve_records[0].assembly_path, "System/Zone1");
    assert_eq!(valve_records[0].guid.as_deref(), Some(valves[0].as_str()));

    // Valid input heals to itself
    for part in &report.parts {
        assert_eq!(part.status, PartStatus::Ok);
        assert!(part.repairs.is_empty());
    }
    assert_eq!(result.outcome(), RunOutcome::Clean);
    assert!(report.basic_checks.all_passed());
}

#[test]
fn first_matching_rule_wins() {
    let config = ConversionConfig {
        type_mappings: vec![
            TypeMappingRule::by_name("valve", "IfcValve"),
            TypeMappingRule::by_name("^Valve-01$", "IfcPipeSegment"),
            TypeMappingRule::by_prefix("System/Zone1", "IfcFlowSegment"),
        ],
        ..Default::default()
    };
    let result = run(&valve_zone(), &config);
    assert_eq!(result.document.count("IfcValve"), 2);
    assert_eq!(result.document.count("IfcPipeSegment"), 0);
    // Pipe-02 only matches the prefix rule
    assert_eq!(result.document.count("IfcFlowSegment"), 1);
}

#[test]
fn every_element_has_exactly_one_container() {
    let result = run(&valve_zone(), &valve_rules());
    let doc = &result.document;

    let mut elements: Vec<_> = doc.by_type("IfcValve");
    elements.extend(doc.by_type("IfcBuildingElementProxy"));
    assert_eq!(elements.len(), 3);

    for element in elements {
        let target = IfcValue::Ref(element.id);
        let containers = doc
            .by_type("IfcRelContainedInSpatialStructure")
            .iter()
            .filter(|rel| rel.attr(4).unwrap().as_list().unwrap().contains(&target))
            .count();
        assert_eq!(containers, 1);

        let decompositions = doc
            .by_type("IfcRelAggregates")
            .iter()
            .filter(|rel| {
                rel.attr(4) == Some(&target)
                    || rel.attr(5).unwrap().as_list().unwrap().contains(&target)
            })
            .count();
        assert_eq!(decompositions, 0);
    }
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = valve_zone().write(dir.path(), "plant.step");
    let config = valve_rules();

    let first = convert(&path, &config).unwrap();
    let second = convert(&path, &config).unwrap();

    assert_ne!(first.run_id, second.run_id);
    for class in ["IfcProject", "IfcSite", "IfcBuildingStorey", "IfcValve", "IfcPropertySet"] {
        assert_eq!(
            element_guids(&first.document, class),
            element_guids(&second.document, class)
        );
    }
    assert_eq!(first.document, second.document);
    assert_eq!(
        first.qc_report.to_json_without_timestamp().unwrap(),
        second.qc_report.to_json_without_timestamp().unwrap()
    );
}

#[test]
fn unrepairable_shape_skip_or_fallback() {
    let mut b = StepBuilder::new();
    let root = b.product("Skid", Solid::None);
    let block = b.product("Block-01", Solid::Cube(10.0));
    let cover = b.product("Cover-01", Solid::OpenBox(10.0));
    b.place(root, block, [0.0, 0.0, 0.0]);
    b.place(root, cover, [50.0, 0.0, 0.0]);

    let skip = ConversionConfig {
        on_invalid: OnInvalid::Skip,
        ..Default::default()
    };
    let result = run(&b, &skip);
    let cover_record = result
        .qc_report
        .parts
        .iter()
        .find(|p| p.canonical_name == "Cover-01")
        .unwrap();
    assert_eq!(cover_record.status, PartStatus::Invalid);
    assert!(!cover_record.converted);
    assert!(cover_record.guid.is_none());
    assert_eq!(result.document.count("IfcBuildingElementProxy"), 1);
    assert_eq!(result.outcome(), RunOutcome::CompletedWithIssues);

    let fallback = ConversionConfig {
        on_invalid: OnInvalid::MeshFallback,
        ..Default::default()
    };
    let result = run(&b, &fallback);
    let cover_record = result
        .qc_report
        .parts
        .iter()
        .find(|p| p.canonical_name == "Cover-01")
        .unwrap();
    assert_eq!(cover_record.status, PartStatus::Invalid);
    assert!(cover_record.converted);
    assert_eq!(cover_record.representation.as_deref(), Some("tessellation"));
    assert_eq!(result.document.count("IfcBuildingElementProxy"), 2);
    assert_eq!(result.document.count("IfcTriangulatedFaceSet"), 1);
    assert_eq!(result.document.count("IfcFacetedBrep"), 1);
    assert!(result
        .audit_log
        .records()
        .iter()
        .any(|r| matches!(r.event, step2ifc::AuditEvent::GeometryInvalid { fallback: true, .. })));
}

#[test]
fn curved_parts_are_faceted_and_measured() {
    let mut b = StepBuilder::new();
    let root = b.product("Skid", Solid::None);
    let tank = b.product("Tank-01", Solid::Cylinder(10.0, 20.0));
    b.place(root, tank, [0.0, 0.0, 0.0]);

    let coarse = run(&b, &ConversionConfig::default());
    let fine = run(
        &b,
        &ConversionConfig {
            mesh_deflection: 0.01,
            ..Default::default()
        },
    );

    let exact = PI * 10.0 * 10.0 * 20.0;
    let mut volumes = Vec::new();
    for result in [&coarse, &fine] {
        let record = result
            .qc_report
            .parts
            .iter()
            .find(|p| p.canonical_name == "Tank-01")
            .unwrap();
        assert_eq!(record.status, PartStatus::Ok);
        assert!(record.converted);
        assert_eq!(result.document.count("IfcFacetedBrep"), 1);
        volumes.push(record.volume.unwrap());
    }
    assert!(volumes[0] > 0.9 * exact);
    assert!(volumes[0] < volumes[1] && volumes[1] < exact);
    assert!(fine.document.count("IfcFace") > coarse.document.count("IfcFace"));
}

/// Signed volume of an IfcTriangulatedFaceSet from its point list and
/// 1-based indices
fn face_set_volume(doc: &IfcDocument, face_set: &IfcEntity) -> f64 {
    let real = |v: &IfcValue| match v {
        IfcValue::Real(r) => *r,
        other => panic!("expected a real, got {:?}", other),
    };
    let list = face_set
        .attr(0)
        .and_then(IfcValue::as_entity)
        .and_then(|id| doc.get(id))
        .unwrap();
    let coordinates: Vec<[f64; 3]> = list
        .attr(0)
        .and_then(IfcValue::as_list)
        .unwrap()
        .iter()
        .map(|p| {
            let xyz = p.as_list().unwrap();
            [real(&xyz[0]), real(&xyz[1]), real(&xyz[2])]
        })
        .collect();

    let mut volume = 0.0;
    for triangle in face_set.attr(3).and_then(IfcValue::as_list).unwrap() {
        let corner: Vec<[f64; 3]> = triangle
            .as_list()
            .unwrap()
            .iter()
            .map(|i| match i {
                IfcValue::Int(i) => coordinates[*i as usize - 1],
                other => panic!("expected an index, got {:?}", other),
            })
            .collect();
        let [a, b, c] = [corner[0], corner[1], corner[2]];
        let cross = [
            b[1] * c[2] - b[2] * c[1],
            b[2] * c[0] - b[0] * c[2],
            b[0] * c[1] - b[1] * c[0],
        ];
        volume += (a[0] * cross[0] + a[1] * cross[1] + a[2] * cross[2]) / 6.0;
    }
    volume
}

#[test]
fn mesh_mode_writes_closed_face_sets() {
    let config = ConversionConfig {
        geom: GeometryMode::Mesh,
        ..valve_rules()
    };
    let result = run(&valve_zone(), &config);
    let doc = &result.document;

    assert_eq!(doc.count("IfcValve") + doc.count("IfcBuildingElementProxy"), 3);
    assert_eq!(doc.count("IfcFacetedBrep"), 0);
    let face_sets = doc.by_type("IfcTriangulatedFaceSet");
    assert_eq!(face_sets.len(), 3);
    for record in &result.qc_report.parts {
        assert_eq!(record.representation.as_deref(), Some("tessellation"));
    }

    let mut volumes: Vec<f64> = face_sets
        .iter()
        .map(|face_set| {
            assert_eq!(face_set.attr(2), Some(&IfcValue::Bool(true)));
            face_set_volume(doc, face_set)
        })
        .collect();
    volumes.sort_by(f64::total_cmp);
    // Two 10 mm valves and one 20 mm pipe, written in millimetres
    for (volume, expected) in volumes.iter().zip([1000.0, 1000.0, 8000.0]) {
        assert!((volume - expected).abs() < 1e-6 * expected, "{} != {}", volume, expected);
    }
}

#[test]
fn undefined_token_fails_only_that_part() {
    let mut rule = TypeMappingRule::by_name("^Valve", "IfcValve");
    rule.properties.push(PropertyMapping {
        pset: Some("Pset_ValveCommon".into()),
        name: "Reference".into(),
        value: "${ProjectKey}-${Missing}".into(),
        data_type: "IfcLabel".into(),
    });
    let config = ConversionConfig {
        type_mappings: vec![rule],
        ..Default::default()
    };
    let result = run(&valve_zone(), &config);

    assert_eq!(result.document.count("IfcValve"), 0);
    assert_eq!(result.document.count("IfcBuildingElementProxy"), 1);

    let failed: Vec<_> = result
        .qc_report
        .parts
        .iter()
        .filter(|p| p.status == PartStatus::MappingFailed)
        .collect();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].reason.as_deref(), Some("undefined token: Missing"));
    assert!(!failed[0].converted);
    assert_eq!(result.qc_report.totals.mapping_failed, 2);
    assert!(result.qc_report.to_json().unwrap().contains("Missing"));
    assert!(result.qc_report.to_text().contains("undefined token: Missing"));
}

#[test]
fn mapped_properties_and_classification_are_written() {
    let mut rule = TypeMappingRule::by_name("^Valve", "IfcValve");
    rule.object_type = Some("GateValve".into());
    rule.classification = Some(step2ifc::ClassificationMapping {
        system: "Uniclass".into(),
        code: "Pr_65_54_95".into(),
        title: Some("Valves".into()),
    });
    rule.properties.push(PropertyMapping {
        pset: None,
        name: "Reference".into(),
        value: "${ProjectKey}:${Name}#${OccurrenceIndex}".into(),
        data_type: "IfcLabel".into(),
    });
    let config = ConversionConfig {
        type_mappings: vec![rule],
        ..Default::default()
    };
    let result = run(&valve_zone(), &config);
    let doc = &result.document;

    assert_eq!(
        doc.by_type("IfcValve")[0].attr(4).and_then(IfcValue::as_str),
        Some("GateValve")
    );
    let references: Vec<&str> = doc
        .by_type("IfcPropertySingleValue")
        .iter()
        .filter(|p| p.attr(0).and_then(IfcValue::as_str) == Some("Reference"))
        .filter_map(|p| match p.attr(2) {
            Some(IfcValue::Typed(_, inner)) => inner.as_str(),
            _ => None,
        })
        .collect();
    assert_eq!(references, vec!["plant:Valve-01#0", "plant:Valve-01#1"]);
    assert!(doc
        .by_type("IfcPropertySet")
        .iter()
        .any(|p| p.attr(2).and_then(IfcValue::as_str) == Some("Pset_Mapped")));

    // One shared reference for both valves
    assert_eq!(doc.count("IfcClassificationReference"), 1);
    let rels = doc.by_type("IfcRelAssociatesClassification");
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].attr(4).unwrap().as_list().unwrap().len(), 2);

    // Audit pset on every element
    let source_sets = doc
        .by_type("IfcPropertySet")
        .iter()
        .filter(|p| p.attr(2).and_then(IfcValue::as_str) == Some("Pset_Source"))
        .count();
    assert_eq!(source_sets, 3);
    assert!(result.spf.contains("'StepLabel'"));
}

/// GlobalIds of every rooted entity in the document
fn all_global_ids(doc: &IfcDocument) -> Vec<&str> {
    const ROOTED: [&str; 8] = [
        "IFCPROJECT",
        "IFCSITE",
        "IFCBUILDING",
        "IFCBUILDINGSTOREY",
        "IFCPROPERTYSET",
        "IFCVALVE",
        "IFCPIPESEGMENT",
        "IFCBUILDINGELEMENTPROXY",
    ];
    doc.entities()
        .iter()
        .filter(|e| e.keyword.starts_with("IFCREL") || ROOTED.contains(&e.keyword.as_str()))
        .filter_map(|e| e.attr(0).and_then(IfcValue::as_str))
        .collect()
}

#[test]
fn global_ids_are_unique_within_a_document() {
    let classified = |pattern: &str, class: &str, system: &str, code: &str| {
        let mut rule = TypeMappingRule::by_name(pattern, class);
        rule.classification = Some(step2ifc::ClassificationMapping {
            system: system.into(),
            code: code.into(),
            title: None,
        });
        rule
    };
    let config = ConversionConfig {
        type_mappings: vec![
            classified("^Valve", "IfcValve", "A:B", "C"),
            classified("^Pipe", "IfcPipeSegment", "A", "B:C"),
        ],
        ..Default::default()
    };
    let result = run(&valve_zone(), &config);
    let doc = &result.document;
    assert_eq!(doc.count("IfcRelAssociatesClassification"), 2);

    let ids = all_global_ids(doc);
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(ids.len(), unique.len());
    assert!(ids.len() > 10);
}

#[test]
fn mapped_properties_cannot_target_the_source_pset() {
    let mut rule = TypeMappingRule::by_name("^Valve", "IfcValve");
    rule.properties.push(PropertyMapping {
        pset: Some("Pset_Source".into()),
        name: "Reference".into(),
        value: "${Name}".into(),
        data_type: "IfcLabel".into(),
    });
    let config = ConversionConfig {
        type_mappings: vec![rule],
        ..Default::default()
    };
    let err = Converter::new(&config).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Config(ConfigError::InvalidField { .. })
    ));
}

#[test]
fn guids_survive_sibling_reordering() {
    use step2ifc::{derive_guid, GuidAllocator};
    use step2ifc_model::AssemblyReader;
    use step2ifc_parser::StepReader;

    let build = |valve_first: bool| {
        let mut b = StepBuilder::new();
        let zone = b.product("Zone1", Solid::None);
        let valve = b.product("Valve-01", Solid::Cube(10.0));
        let pipe = b.product("Pipe-02", Solid::Cube(10.0));
        if valve_first {
            b.place(zone, valve, [100.0, 0.0, 0.0]);
            b.place(zone, pipe, [0.0, 100.0, 0.0]);
            b.place(zone, valve, [200.0, 0.0, 0.0]);
        } else {
            b.place(zone, pipe, [0.0, 100.0, 0.0]);
            b.place(zone, valve, [200.0, 0.0, 0.0]);
            b.place(zone, valve, [100.0, 0.0, 0.0]);
        }
        StepReader::new().read_str(&b.finish(), "zone").unwrap()
    };

    let identities = |tree: &step2ifc_model::AssemblyTree| -> HashMap<(String, i64), (String, u32)> {
        let mut allocator = GuidAllocator::new("fixed");
        tree.iter()
            .filter(|p| p.has_shape())
            .map(|p| {
                let guid = allocator
                    .allocate(&p.assembly_path, &p.name, p.occurrence_index)
                    .unwrap();
                assert_eq!(
                    guid,
                    derive_guid("fixed", &p.assembly_path.key(), &p.name, p.occurrence_index)
                );
                let x = p.transform.origin()[0].round() as i64;
                ((p.name.clone(), x), (guid.to_string(), p.occurrence_index))
            })
            .collect()
    };

    let a = identities(&build(true));
    let b = identities(&build(false));

    // Uniquely named sibling keeps its identity
    let pipe_key = ("Pipe-02".to_string(), 0);
    assert_eq!(a[&pipe_key], b[&pipe_key]);

    // Same-name siblings follow traversal order
    let first = ("Valve-01".to_string(), 100);
    let second = ("Valve-01".to_string(), 200);
    assert_eq!(a[&first].1, 0);
    assert_eq!(b[&first].1, 1);
    assert_eq!(a[&first].0, b[&second].0);
}

#[test]
fn merge_by_name_unions_same_level_parts() {
    let config = ConversionConfig {
        merge_by_name: true,
        ..valve_rules()
    };
    let result = run(&valve_zone(), &config);
    let doc = &result.document;

    let valves = element_guids(doc, "IfcValve");
    assert_eq!(valves.len(), 1);
    assert_eq!(doc.count("IfcFacetedBrep"), 3);

    let report = &result.qc_report;
    assert_eq!(report.merge_groups.len(), 1);
    assert_eq!(report.merge_groups[0].members.len(), 2);
    assert_eq!(report.merge_groups[0].guid, valves[0]);
    let merged: Vec<_> = report
        .parts
        .iter()
        .filter(|p| p.merged_into.is_some())
        .collect();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].occurrence_index, 1);

    let merged_count = doc
        .by_type("IfcPropertySingleValue")
        .into_iter()
        .find(|p| p.attr(0).and_then(IfcValue::as_str) == Some("MergedCount"))
        .unwrap();
    assert_eq!(
        merged_count.attr(2),
        Some(&IfcValue::typed("IfcInteger", IfcValue::Int(2)))
    );

    // The merged element keeps the GUID of occurrence 0
    let unmerged = run(&valve_zone(), &valve_rules());
    assert_eq!(element_guids(&unmerged.document, "IfcValve")[0], valves[0]);
}

#[test]
fn split_by_assembly_authors_subtrees() {
    let mut b = StepBuilder::new();
    let plant = b.product("Plant", Solid::None);
    let skid_a = b.product("Skid-A", Solid::None);
    let skid_b = b.product("Skid-B", Solid::None);
    let valve = b.product("Valve-01", Solid::Cube(10.0));
    let pipe = b.product("Pipe-02", Solid::Cube(10.0));
    b.place(plant, skid_a, [0.0, 0.0, 0.0]);
    b.place(plant, skid_b, [1000.0, 0.0, 0.0]);
    b.place(skid_a, valve, [0.0, 0.0, 0.0]);
    b.place(skid_a, pipe, [50.0, 0.0, 0.0]);
    b.place(skid_b, valve, [0.0, 0.0, 0.0]);

    let config = ConversionConfig {
        split_by_assembly: true,
        ..Default::default()
    };
    let result = run(&b, &config);
    let doc = &result.document;

    let names: Vec<&str> = doc
        .by_type("IfcBuildingElementProxy")
        .iter()
        .filter_map(|e| e.attr(2).and_then(IfcValue::as_str))
        .collect();
    assert_eq!(names, vec!["Skid-A", "Skid-B"]);
    assert_eq!(doc.count("IfcFacetedBrep"), 3);
    assert_eq!(result.qc_report.totals.total_parts, 3);
    assert_eq!(result.qc_report.totals.converted_parts, 3);
    assert_eq!(result.qc_report.totals.elements, 2);
}

#[test]
fn merge_and_split_together_are_rejected() {
    let config = ConversionConfig {
        merge_by_name: true,
        split_by_assembly: true,
        ..Default::default()
    };
    let err = Converter::new(&config).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Config(ConfigError::IncompatibleOptions)
    ));
}

#[test]
fn missing_input_is_fatal() {
    let err = convert(
        std::path::Path::new("/nonexistent/plant.step"),
        &ConversionConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Ingest(IngestError::Unreadable { .. })
    ));
}

#[test]
fn cancelled_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = valve_zone().write(dir.path(), "plant.step");
    let out = dir.path().join("out");
    let log = dir.path().join("audit.log.jsonl");

    let token = CancelToken::new();
    let converter = Converter::new(&valve_rules())
        .unwrap()
        .with_cancel_token(token.clone())
        .with_audit_file(&log);
    token.cancel();

    let err = converter.convert(&input).unwrap_err();
    assert!(matches!(err, ConvertError::Cancelled));
    assert!(!out.exists());

    let trail = std::fs::read_to_string(&log).unwrap();
    assert!(trail.lines().last().unwrap().contains("\"conversion_cancelled\""));
}

#[test]
fn artifacts_are_written_together() {
    let dir = tempfile::tempdir().unwrap();
    let input = valve_zone().write(dir.path(), "plant.step");
    let out = dir.path().join("out");

    let mut result = convert(&input, &valve_rules()).unwrap();
    let written = result.write_artifacts(&out, "plant").unwrap();
    assert_eq!(written.len(), 4);

    let ifc = std::fs::read_to_string(out.join("plant.ifc")).unwrap();
    assert!(ifc.starts_with("ISO-10303-21;"));
    assert!(ifc.contains("FILE_SCHEMA(('IFC4'));"));
    assert!(ifc.contains("IFCVALVE("));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("plant.qc.json")).unwrap())
            .unwrap();
    assert_eq!(json["totals"]["converted_parts"], 3);
    assert_eq!(json["source_hash"].as_str().unwrap().len(), 64);

    let text = std::fs::read_to_string(out.join("plant.qc.txt")).unwrap();
    assert!(text.contains("Converted: 3"));

    let log = std::fs::read_to_string(out.join("plant.log.jsonl")).unwrap();
    let events: Vec<String> = log
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["event"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(events.first().map(String::as_str), Some("conversion_start"));
    assert_eq!(events.last().map(String::as_str), Some("write_complete"));
    assert!(events.iter().any(|e| e == "part_converted"));

    // No temporary files left behind
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 4);
}

#[test]
fn ifc2x3_output_in_metres() {
    let config = ConversionConfig {
        schema: "IFC2X3".into(),
        units: "m".into(),
        ..valve_rules()
    };
    let result = run(&valve_zone(), &config);
    assert!(result.spf.contains("FILE_SCHEMA(('IFC2X3'));"));
    assert!(result.spf.contains("CoordinationView_V2.0"));
    assert_eq!(result.document.count("IfcOwnerHistory"), 1);
    // 200 mm placement written as 0.2 m
    assert!(result.spf.contains("IFCCARTESIANPOINT((0.2,0.,0.))"));
}

#[test]
fn generated_rules_classify_an_unmapped_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = valve_zone().write(dir.path(), "plant.step");
    let base = ConversionConfig::default();

    let mapping = step2ifc::auto::generate(&path, &base).unwrap();
    assert_eq!(mapping.units.unit, LengthUnit::Mm);
    assert_eq!(mapping.units.confidence, 0.9);
    assert_eq!(mapping.parts.len(), 3);
    let signatures: Vec<&str> = mapping.rules.iter().map(|r| r.signature.as_str()).collect();
    assert_eq!(signatures, vec!["PIPE", "VALVE"]);
    assert_eq!(mapping.source_hash, step2ifc::hash_file(&path).unwrap());

    let written = mapping.write(dir.path(), "plant").unwrap();
    assert!(written.exists());

    let result = convert(&path, &mapping.configure(&base)).unwrap();
    assert_eq!(result.document.count("IfcValve"), 2);
    assert_eq!(result.document.count("IfcPipeSegment"), 1);
    assert_eq!(result.document.count("IfcBuildingElementProxy"), 0);
}
