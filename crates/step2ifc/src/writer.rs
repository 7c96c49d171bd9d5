// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC authoring
//!
//! Builds the spatial hierarchy (one project, site and building, one or more
//! storeys) and appends elements with placement, representation, property
//! sets and classification. Elements are only ever contained in a storey;
//! nothing is decomposed under another element.

use crate::config::{CompiledConfig, IfcSchema, LengthUnit, SOURCE_PSET};
use crate::document::{EntityRef, IfcDocument, IfcValue, SpfHeader};
use crate::error::GuidCollisionError;
use crate::guid::{Guid, GuidAllocator};
use crate::mapping::{ClassificationRef, PropertyValue, ResolvedPset};
use rustc_hash::FxHashMap;
use step2ifc_geometry::{Shape, ShellKind, TriangleMesh};
use step2ifc_model::{AssemblyPath, Transform};

/// Geometry of one element, in the element's local coordinates and source units
#[derive(Clone, Debug)]
pub enum Representation {
    /// Faceted boundary representation of healed shapes
    Brep(Vec<Shape>),
    /// Triangle meshes
    Tessellated(Vec<TriangleMesh>),
}

impl Representation {
    pub fn kind(&self) -> &'static str {
        match self {
            Representation::Brep(_) => "brep",
            Representation::Tessellated(_) => "tessellation",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Representation::Brep(shapes) => shapes.iter().all(Shape::is_empty),
            Representation::Tessellated(meshes) => meshes.iter().all(TriangleMesh::is_empty),
        }
    }
}

/// Everything needed to author one element
#[derive(Clone, Debug)]
pub struct ElementSpec<'a> {
    pub guid: Guid,
    pub ifc_class: &'a str,
    pub name: &'a str,
    pub object_type: Option<&'a str>,
    pub tag: &'a str,
    /// Storey hint; the configured storey when `None`
    pub storey: Option<&'a str>,
    /// Placement in project coordinates, source units
    pub placement: Transform,
    pub representation: Option<Representation>,
    /// `Pset_Source` properties
    pub source_properties: Vec<(String, PropertyValue)>,
    pub psets: &'a [ResolvedPset],
    pub classification: Option<&'a ClassificationRef>,
}

struct Storey {
    name: String,
    entity: EntityRef,
    placement: EntityRef,
    elements: Vec<EntityRef>,
}

struct ReferenceUse {
    entity: EntityRef,
    key: (String, String),
    objects: Vec<EntityRef>,
}

/// Incremental IFC document builder
pub struct IfcWriter<'g> {
    doc: IfcDocument,
    schema: IfcSchema,
    /// Source units to output units
    scale: f64,
    guids: &'g mut GuidAllocator,
    owner_history: IfcValue,
    body_context: EntityRef,
    world: EntityRef,
    building: EntityRef,
    building_placement: EntityRef,
    storeys: Vec<Storey>,
    classifications: FxHashMap<String, EntityRef>,
    references: Vec<ReferenceUse>,
}

impl<'g> IfcWriter<'g> {
    /// Start a document with project, units, contexts, site, building and the default storey
    pub fn new(
        config: &CompiledConfig,
        source_unit_metres: f64,
        guids: &'g mut GuidAllocator,
        created_unix: i64,
    ) -> Result<Self, GuidCollisionError> {
        let mut doc = IfcDocument::new();
        let schema = config.schema;
        let scale = source_unit_metres / config.units.metres();

        let owner_history = match schema {
            IfcSchema::Ifc2x3 => IfcValue::Ref(owner_history(&mut doc, created_unix)),
            IfcSchema::Ifc4 => IfcValue::Null,
        };

        let origin = doc.add("IfcCartesianPoint", vec![IfcValue::reals([0.0, 0.0, 0.0])]);
        let world = doc.add(
            "IfcAxis2Placement3D",
            vec![origin.into(), IfcValue::Null, IfcValue::Null],
        );
        let context = doc.add(
            "IfcGeometricRepresentationContext",
            vec![
                IfcValue::Null,
                IfcValue::str("Model"),
                IfcValue::Int(3),
                IfcValue::Real(1e-5),
                world.into(),
                IfcValue::Null,
            ],
        );
        let body_context = doc.add(
            "IfcGeometricRepresentationSubContext",
            vec![
                IfcValue::str("Body"),
                IfcValue::str("Model"),
                IfcValue::Derived,
                IfcValue::Derived,
                IfcValue::Derived,
                IfcValue::Derived,
                context.into(),
                IfcValue::Null,
                IfcValue::enumeration("MODEL_VIEW"),
                IfcValue::Null,
            ],
        );
        let units = unit_assignment(&mut doc, config.units);

        let project = doc.add(
            "IfcProject",
            vec![
                IfcValue::str(guids.allocate_synthetic(&["project"])?.as_str()),
                owner_history.clone(),
                IfcValue::str(&config.raw.project),
                IfcValue::Null,
                IfcValue::Null,
                IfcValue::Null,
                IfcValue::Null,
                IfcValue::refs([context]),
                units.into(),
            ],
        );

        let site_placement = doc.add("IfcLocalPlacement", vec![IfcValue::Null, world.into()]);
        let site = doc.add(
            "IfcSite",
            spatial_attributes(
                guids.allocate_synthetic(&["site"])?,
                &owner_history,
                &config.raw.site,
                site_placement,
                5,
            ),
        );

        let building_placement = doc.add(
            "IfcLocalPlacement",
            vec![site_placement.into(), world.into()],
        );
        let building = doc.add(
            "IfcBuilding",
            spatial_attributes(
                guids.allocate_synthetic(&["building"])?,
                &owner_history,
                &config.raw.building,
                building_placement,
                3,
            ),
        );

        aggregate(
            &mut doc,
            guids.allocate_synthetic(&["aggregates", "project"])?,
            &owner_history,
            project,
            &[site],
        );
        aggregate(
            &mut doc,
            guids.allocate_synthetic(&["aggregates", "site"])?,
            &owner_history,
            site,
            &[building],
        );

        let mut writer = Self {
            doc,
            schema,
            scale,
            guids,
            owner_history,
            body_context,
            world,
            building,
            building_placement,
            storeys: Vec::new(),
            classifications: FxHashMap::default(),
            references: Vec::new(),
        };
        writer.storey(&config.raw.storey)?;
        Ok(writer)
    }

    /// Index of the storey called `name`, created on first use
    fn storey(&mut self, name: &str) -> Result<usize, GuidCollisionError> {
        if let Some(index) = self.storeys.iter().position(|s| s.name == name) {
            return Ok(index);
        }
        let guid = self.guids.allocate_synthetic(&["storey", name])?;
        let placement = self.doc.add(
            "IfcLocalPlacement",
            vec![self.building_placement.into(), self.world.into()],
        );
        let mut attributes = spatial_attributes(guid, &self.owner_history, name, placement, 0);
        attributes.push(IfcValue::Real(0.0));
        let entity = self.doc.add("IfcBuildingStorey", attributes);
        self.storeys.push(Storey {
            name: name.to_string(),
            entity,
            placement,
            elements: Vec::new(),
        });
        Ok(self.storeys.len() - 1)
    }

    /// GUID for the part at `assembly_path`, checked against everything allocated so far
    pub fn allocate_guid(
        &mut self,
        assembly_path: &AssemblyPath,
        canonical_name: &str,
        occurrence_index: u32,
    ) -> Result<Guid, GuidCollisionError> {
        self.guids
            .allocate(assembly_path, canonical_name, occurrence_index)
    }

    /// Author one element and contain it in its storey
    pub fn add_element(&mut self, spec: ElementSpec<'_>) -> Result<EntityRef, GuidCollisionError> {
        let storey = match spec.storey {
            Some(name) => self.storey(name)?,
            None => 0,
        };

        let axis = self.axis_placement(&spec.placement);
        let placement = self.doc.add(
            "IfcLocalPlacement",
            vec![self.storeys[storey].placement.into(), axis.into()],
        );

        let shape = match &spec.representation {
            Some(rep) if !rep.is_empty() => IfcValue::Ref(self.product_shape(rep)),
            _ => IfcValue::Null,
        };

        let keyword = spec.ifc_class.to_ascii_uppercase();
        let mut attributes = vec![
            IfcValue::str(spec.guid.as_str()),
            self.owner_history.clone(),
            IfcValue::str(spec.name),
            IfcValue::Null,
            IfcValue::opt_str(spec.object_type),
            placement.into(),
            shape,
            IfcValue::str(spec.tag),
        ];
        for _ in 0..trailing_attributes(self.schema, &keyword) {
            attributes.push(IfcValue::Null);
        }
        let element = self.doc.add(&keyword, attributes);
        self.storeys[storey].elements.push(element);

        let source: Vec<(&str, &PropertyValue)> = spec
            .source_properties
            .iter()
            .map(|(n, v)| (n.as_str(), v))
            .collect();
        self.property_set(element, &spec.guid, SOURCE_PSET, &source)?;
        for pset in spec.psets {
            let props: Vec<(&str, &PropertyValue)> = pset
                .properties
                .iter()
                .map(|p| (p.name.as_str(), &p.value))
                .collect();
            self.property_set(element, &spec.guid, &pset.name, &props)?;
        }

        if let Some(classification) = spec.classification {
            self.classify(element, classification);
        }

        Ok(element)
    }

    /// Close the hierarchy: storey aggregation, containment and classification links
    pub fn finish(mut self) -> Result<IfcDocument, GuidCollisionError> {
        let storeys: Vec<EntityRef> = self.storeys.iter().map(|s| s.entity).collect();
        let guid = self.guids.allocate_synthetic(&["aggregates", "building"])?;
        aggregate(
            &mut self.doc,
            guid,
            &self.owner_history,
            self.building,
            &storeys,
        );

        for storey in &self.storeys {
            if storey.elements.is_empty() {
                continue;
            }
            let guid = self
                .guids
                .allocate_synthetic(&["contained", storey.name.as_str()])?;
            self.doc.add(
                "IfcRelContainedInSpatialStructure",
                vec![
                    IfcValue::str(guid.as_str()),
                    self.owner_history.clone(),
                    IfcValue::Null,
                    IfcValue::Null,
                    IfcValue::refs(storey.elements.iter().copied()),
                    storey.entity.into(),
                ],
            );
        }

        for reference in &self.references {
            let guid = self.guids.allocate_synthetic(&[
                "classification",
                reference.key.0.as_str(),
                reference.key.1.as_str(),
            ])?;
            self.doc.add(
                "IfcRelAssociatesClassification",
                vec![
                    IfcValue::str(guid.as_str()),
                    self.owner_history.clone(),
                    IfcValue::Null,
                    IfcValue::Null,
                    IfcValue::refs(reference.objects.iter().copied()),
                    reference.entity.into(),
                ],
            );
        }

        Ok(self.doc)
    }

    // ------------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------------

    fn point(&mut self, p: [f64; 3]) -> EntityRef {
        let s = self.scale;
        self.doc.add(
            "IfcCartesianPoint",
            vec![IfcValue::reals([p[0] * s, p[1] * s, p[2] * s])],
        )
    }

    fn direction(&mut self, d: [f64; 3]) -> EntityRef {
        let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        let d = if len > 1e-12 {
            [d[0] / len, d[1] / len, d[2] / len]
        } else {
            d
        };
        self.doc.add("IfcDirection", vec![IfcValue::reals(d)])
    }

    fn axis_placement(&mut self, transform: &Transform) -> EntityRef {
        let location = self.point(transform.origin());
        let z = self.direction(transform.z_axis());
        let x = self.direction(transform.x_axis());
        self.doc.add(
            "IfcAxis2Placement3D",
            vec![location.into(), z.into(), x.into()],
        )
    }

    // ------------------------------------------------------------------------
    // Representation
    // ------------------------------------------------------------------------

    fn product_shape(&mut self, rep: &Representation) -> EntityRef {
        let mut items = Vec::new();
        let mut solid = false;
        match rep {
            Representation::Brep(shapes) => {
                for shape in shapes {
                    solid |= self.brep_items(shape, &mut items);
                }
            }
            Representation::Tessellated(meshes) => {
                for mesh in meshes.iter().filter(|m| !m.is_empty()) {
                    solid |= self.mesh_item(mesh, &mut items);
                }
            }
        }

        let rep_type = match (rep, self.schema, solid) {
            (Representation::Tessellated(_), IfcSchema::Ifc4, _) => "Tessellation",
            (_, _, true) => "Brep",
            (_, _, false) => "SurfaceModel",
        };
        let shape_rep = self.doc.add(
            "IfcShapeRepresentation",
            vec![
                self.body_context.into(),
                IfcValue::str("Body"),
                IfcValue::str(rep_type),
                IfcValue::refs(items),
            ],
        );
        self.doc.add(
            "IfcProductDefinitionShape",
            vec![IfcValue::Null, IfcValue::Null, IfcValue::refs([shape_rep])],
        )
    }

    /// Faceted breps for closed shells (with their voids), a surface model for open ones.
    /// Returns whether any solid item was written.
    fn brep_items(&mut self, shape: &Shape, items: &mut Vec<EntityRef>) -> bool {
        let mut points: FxHashMap<usize, EntityRef> = FxHashMap::default();
        let mut solids: Vec<(EntityRef, Vec<EntityRef>)> = Vec::new();
        let mut open: Vec<EntityRef> = Vec::new();

        for shell in &shape.shells {
            let faces: Vec<EntityRef> = shell
                .faces
                .iter()
                .map(|face| {
                    let bounds: Vec<EntityRef> = face
                        .bounds
                        .iter()
                        .enumerate()
                        .map(|(i, bound)| {
                            let pts: Vec<EntityRef> = bound
                                .iter()
                                .map(|&v| {
                                    *points
                                        .entry(v)
                                        .or_insert_with(|| self.point(vertex(shape, v)))
                                })
                                .collect();
                            let poly = self.doc.add("IfcPolyLoop", vec![IfcValue::refs(pts)]);
                            let keyword = if i == 0 { "IfcFaceOuterBound" } else { "IfcFaceBound" };
                            self.doc.add(keyword, vec![poly.into(), IfcValue::Bool(true)])
                        })
                        .collect();
                    self.doc.add("IfcFace", vec![IfcValue::refs(bounds)])
                })
                .collect();

            match shell.kind {
                ShellKind::Closed => {
                    let closed = self.doc.add("IfcClosedShell", vec![IfcValue::refs(faces)]);
                    solids.push((closed, Vec::new()));
                }
                ShellKind::Void => {
                    let closed = self.doc.add("IfcClosedShell", vec![IfcValue::refs(faces)]);
                    match solids.last_mut() {
                        Some((_, voids)) => voids.push(closed),
                        None => solids.push((closed, Vec::new())),
                    }
                }
                ShellKind::Open => {
                    open.push(self.doc.add("IfcOpenShell", vec![IfcValue::refs(faces)]));
                }
            }
        }

        let wrote_solid = !solids.is_empty();
        for (outer, voids) in solids {
            let item = if voids.is_empty() {
                self.doc.add("IfcFacetedBrep", vec![outer.into()])
            } else {
                self.doc.add(
                    "IfcFacetedBrepWithVoids",
                    vec![outer.into(), IfcValue::refs(voids)],
                )
            };
            items.push(item);
        }
        if !open.is_empty() {
            items.push(
                self.doc
                    .add("IfcShellBasedSurfaceModel", vec![IfcValue::refs(open)]),
            );
        }
        wrote_solid
    }

    /// IFC4 triangulated face set, or triangle faces for IFC2X3
    fn mesh_item(&mut self, mesh: &TriangleMesh, items: &mut Vec<EntityRef>) -> bool {
        let (positions, triangles) = compact(mesh);
        let closed = mesh.is_closed();
        let s = self.scale;

        match self.schema {
            IfcSchema::Ifc4 => {
                let coords = IfcValue::List(
                    positions
                        .iter()
                        .map(|p| IfcValue::reals([p[0] * s, p[1] * s, p[2] * s]))
                        .collect(),
                );
                let list = self.doc.add("IfcCartesianPointList3D", vec![coords]);
                let index = IfcValue::List(
                    triangles
                        .iter()
                        .map(|t| {
                            IfcValue::List(t.iter().map(|&i| IfcValue::Int(i as i64 + 1)).collect())
                        })
                        .collect(),
                );
                items.push(self.doc.add(
                    "IfcTriangulatedFaceSet",
                    vec![
                        list.into(),
                        IfcValue::Null,
                        IfcValue::Bool(closed),
                        index,
                        IfcValue::Null,
                    ],
                ));
                closed
            }
            IfcSchema::Ifc2x3 => {
                let points: Vec<EntityRef> = positions.iter().map(|p| self.point(*p)).collect();
                let faces: Vec<EntityRef> = triangles
                    .iter()
                    .map(|t| {
                        let poly = self.doc.add(
                            "IfcPolyLoop",
                            vec![IfcValue::refs(t.iter().map(|&i| points[i]))],
                        );
                        let bound = self
                            .doc
                            .add("IfcFaceOuterBound", vec![poly.into(), IfcValue::Bool(true)]);
                        self.doc.add("IfcFace", vec![IfcValue::refs([bound])])
                    })
                    .collect();
                if closed {
                    let shell = self.doc.add("IfcClosedShell", vec![IfcValue::refs(faces)]);
                    items.push(self.doc.add("IfcFacetedBrep", vec![shell.into()]));
                } else {
                    let shell = self.doc.add("IfcOpenShell", vec![IfcValue::refs(faces)]);
                    items.push(
                        self.doc
                            .add("IfcShellBasedSurfaceModel", vec![IfcValue::refs([shell])]),
                    );
                }
                closed
            }
        }
    }

    // ------------------------------------------------------------------------
    // Properties and classification
    // ------------------------------------------------------------------------

    fn property_set(
        &mut self,
        element: EntityRef,
        owner: &Guid,
        name: &str,
        properties: &[(&str, &PropertyValue)],
    ) -> Result<(), GuidCollisionError> {
        if properties.is_empty() {
            return Ok(());
        }
        let values: Vec<EntityRef> = properties
            .iter()
            .map(|(prop, value)| {
                self.doc.add(
                    "IfcPropertySingleValue",
                    vec![
                        IfcValue::str(*prop),
                        IfcValue::Null,
                        nominal_value(value),
                        IfcValue::Null,
                    ],
                )
            })
            .collect();

        let pset_guid = self
            .guids
            .allocate_synthetic(&["pset", owner.as_str(), name])?;
        let pset = self.doc.add(
            "IfcPropertySet",
            vec![
                IfcValue::str(pset_guid.as_str()),
                self.owner_history.clone(),
                IfcValue::str(name),
                IfcValue::Null,
                IfcValue::refs(values),
            ],
        );
        let rel_guid = self
            .guids
            .allocate_synthetic(&["defines", owner.as_str(), name])?;
        self.doc.add(
            "IfcRelDefinesByProperties",
            vec![
                IfcValue::str(rel_guid.as_str()),
                self.owner_history.clone(),
                IfcValue::Null,
                IfcValue::Null,
                IfcValue::refs([element]),
                pset.into(),
            ],
        );
        Ok(())
    }

    /// Attach `element` to the shared reference for `(system, code)`
    fn classify(&mut self, element: EntityRef, classification: &ClassificationRef) {
        let key = (classification.system.clone(), classification.code.clone());
        if let Some(existing) = self.references.iter_mut().find(|r| r.key == key) {
            if !existing.objects.contains(&element) {
                existing.objects.push(element);
            }
            return;
        }

        let system = match self.classifications.get(&classification.system) {
            Some(&system) => system,
            None => {
                let attributes = match self.schema {
                    IfcSchema::Ifc4 => vec![
                        IfcValue::Null,
                        IfcValue::Null,
                        IfcValue::Null,
                        IfcValue::str(&classification.system),
                        IfcValue::Null,
                        IfcValue::Null,
                        IfcValue::Null,
                    ],
                    IfcSchema::Ifc2x3 => vec![
                        IfcValue::str(""),
                        IfcValue::str(""),
                        IfcValue::Null,
                        IfcValue::str(&classification.system),
                    ],
                };
                let system = self.doc.add("IfcClassification", attributes);
                self.classifications
                    .insert(classification.system.clone(), system);
                system
            }
        };

        let mut attributes = vec![
            IfcValue::Null,
            IfcValue::str(&classification.code),
            IfcValue::str(&classification.title),
            system.into(),
        ];
        if self.schema == IfcSchema::Ifc4 {
            attributes.extend([IfcValue::Null, IfcValue::Null]);
        }
        let entity = self.doc.add("IfcClassificationReference", attributes);
        self.references.push(ReferenceUse {
            entity,
            key,
            objects: vec![element],
        });
    }
}

/// HEADER section for an authored document
pub fn spf_header(schema: IfcSchema, name: &str, timestamp: &str) -> SpfHeader {
    let view = match schema {
        IfcSchema::Ifc4 => "ViewDefinition [ReferenceView_V1.2]",
        IfcSchema::Ifc2x3 => "ViewDefinition [CoordinationView_V2.0]",
    };
    SpfHeader {
        description: vec![view.to_string()],
        name: name.to_string(),
        timestamp: timestamp.to_string(),
        author: String::new(),
        organization: String::new(),
        preprocessor: format!("step2ifc {}", env!("CARGO_PKG_VERSION")),
        originating_system: "step2ifc".to_string(),
        schema: schema.name().to_string(),
    }
}

fn vertex(shape: &Shape, index: usize) -> [f64; 3] {
    let p = shape.vertices[index];
    [p.x, p.y, p.z]
}

/// Used vertices only, with triangles re-indexed
fn compact(mesh: &TriangleMesh) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut remap: FxHashMap<u32, usize> = FxHashMap::default();
    let mut positions = Vec::new();
    let triangles = mesh
        .triangles()
        .map(|t| {
            t.map(|i| {
                *remap.entry(i).or_insert_with(|| {
                    positions.push(mesh.point(i as usize));
                    positions.len() - 1
                })
            })
        })
        .collect();
    (positions, triangles)
}

fn nominal_value(value: &PropertyValue) -> IfcValue {
    let inner = match value {
        PropertyValue::Label(s) | PropertyValue::Text(s) | PropertyValue::Identifier(s) => {
            IfcValue::str(s.as_str())
        }
        PropertyValue::Integer(i) => IfcValue::Int(*i),
        PropertyValue::Real(r) => IfcValue::Real(*r),
        PropertyValue::Boolean(b) => IfcValue::Bool(*b),
    };
    IfcValue::typed(value.data_type().name(), inner)
}

/// Attributes after `Tag` that this writer leaves unset
fn trailing_attributes(schema: IfcSchema, keyword: &str) -> usize {
    match (schema, keyword) {
        (_, "IFCELEMENTASSEMBLY") => 2,
        (IfcSchema::Ifc4, _) => 1,
        (IfcSchema::Ifc2x3, "IFCBUILDINGELEMENTPROXY") => 1,
        (IfcSchema::Ifc2x3, _) => 0,
    }
}

/// Common spatial element attributes followed by `.ELEMENT.` and `extra` unset slots
fn spatial_attributes(
    guid: Guid,
    owner_history: &IfcValue,
    name: &str,
    placement: EntityRef,
    extra: usize,
) -> Vec<IfcValue> {
    let mut attributes = vec![
        IfcValue::str(guid.as_str()),
        owner_history.clone(),
        IfcValue::str(name),
        IfcValue::Null,
        IfcValue::Null,
        placement.into(),
        IfcValue::Null,
        IfcValue::Null,
        IfcValue::enumeration("ELEMENT"),
    ];
    attributes.extend(std::iter::repeat(IfcValue::Null).take(extra));
    attributes
}

fn aggregate(
    doc: &mut IfcDocument,
    guid: Guid,
    owner_history: &IfcValue,
    relating: EntityRef,
    related: &[EntityRef],
) {
    doc.add(
        "IfcRelAggregates",
        vec![
            IfcValue::str(guid.as_str()),
            owner_history.clone(),
            IfcValue::Null,
            IfcValue::Null,
            relating.into(),
            IfcValue::refs(related.iter().copied()),
        ],
    );
}

fn owner_history(doc: &mut IfcDocument, created_unix: i64) -> EntityRef {
    let person = doc.add(
        "IfcPerson",
        vec![
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::str(""),
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::Null,
        ],
    );
    let organization = doc.add(
        "IfcOrganization",
        vec![
            IfcValue::Null,
            IfcValue::str("step2ifc"),
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::Null,
        ],
    );
    let user = doc.add(
        "IfcPersonAndOrganization",
        vec![person.into(), organization.into(), IfcValue::Null],
    );
    let application = doc.add(
        "IfcApplication",
        vec![
            organization.into(),
            IfcValue::str(env!("CARGO_PKG_VERSION")),
            IfcValue::str("step2ifc"),
            IfcValue::str("step2ifc"),
        ],
    );
    doc.add(
        "IfcOwnerHistory",
        vec![
            user.into(),
            application.into(),
            IfcValue::Null,
            IfcValue::enumeration("ADDED"),
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::Null,
            IfcValue::Int(created_unix),
        ],
    )
}

fn unit_assignment(doc: &mut IfcDocument, unit: LengthUnit) -> EntityRef {
    let si = |doc: &mut IfcDocument, unit_type: &str, prefix: Option<&str>, name: &str| {
        doc.add(
            "IfcSIUnit",
            vec![
                IfcValue::Derived,
                IfcValue::enumeration(unit_type),
                prefix.map_or(IfcValue::Null, IfcValue::enumeration),
                IfcValue::enumeration(name),
            ],
        )
    };

    let length = match unit {
        LengthUnit::Mm => si(doc, "LENGTHUNIT", Some("MILLI"), "METRE"),
        LengthUnit::Cm => si(doc, "LENGTHUNIT", Some("CENTI"), "METRE"),
        LengthUnit::M => si(doc, "LENGTHUNIT", None, "METRE"),
        LengthUnit::In | LengthUnit::Ft => {
            let metre = si(doc, "LENGTHUNIT", None, "METRE");
            let dims = doc.add(
                "IfcDimensionalExponents",
                [1, 0, 0, 0, 0, 0, 0].map(IfcValue::Int).to_vec(),
            );
            let factor = doc.add(
                "IfcMeasureWithUnit",
                vec![
                    IfcValue::typed("IfcLengthMeasure", IfcValue::Real(unit.metres())),
                    metre.into(),
                ],
            );
            let name = if unit == LengthUnit::In { "INCH" } else { "FOOT" };
            doc.add(
                "IfcConversionBasedUnit",
                vec![
                    dims.into(),
                    IfcValue::enumeration("LENGTHUNIT"),
                    IfcValue::str(name),
                    factor.into(),
                ],
            )
        }
    };
    let area = si(doc, "AREAUNIT", None, "SQUARE_METRE");
    let volume = si(doc, "VOLUMEUNIT", None, "CUBIC_METRE");
    let angle = si(doc, "PLANEANGLEUNIT", None, "RADIAN");

    doc.add(
        "IfcUnitAssignment",
        vec![IfcValue::refs([length, area, volume, angle])],
    )
}
