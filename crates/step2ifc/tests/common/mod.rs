// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP fixture builder for conversion tests

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const HEADER: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('conversion fixture'),'2;1');
FILE_NAME('fixture.stp','2024-01-01T00:00:00',(''),(''),'','Fixture CAD','');
FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'));
ENDSEC;
DATA;
#1=APPLICATION_CONTEXT('automotive design');
#2=PRODUCT_CONTEXT('',#1,'mechanical');
#3=PRODUCT_DEFINITION_CONTEXT('part definition',#1,'design');
#4=(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.));
#5=(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNIT_ASSIGNED_CONTEXT((#4))REPRESENTATION_CONTEXT('',''));
#6=CARTESIAN_POINT('',(0.,0.,0.));
#7=DIRECTION('',(0.,0.,1.));
#8=DIRECTION('',(1.,0.,0.));
#9=AXIS2_PLACEMENT_3D('',#6,#7,#8);
";

const FOOTER: &str = "ENDSEC;
END-ISO-10303-21;
";

/// Box faces as corner indices `x | y << 1 | z << 2`, outward winding
const CUBE_FACES: [[usize; 4]; 6] = [
    [0, 2, 3, 1],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 4, 6, 2],
    [1, 3, 7, 5],
];

/// Geometry attached to a product
#[derive(Clone, Copy, Debug)]
pub enum Solid {
    /// Assembly node without geometry
    None,
    /// Closed faceted box with the given edge length
    Cube(f64),
    /// Box without its top face, as a surface model
    OpenBox(f64),
    /// Advanced B-rep cylinder along Z with `(radius, height)`
    Cylinder(f64, f64),
}

#[derive(Clone, Copy, Debug)]
pub struct Product {
    pub definition: u32,
    pub representation: u32,
}

/// Writes a product structure with faceted geometry
pub struct StepBuilder {
    data: String,
    next: u32,
}

impl Default for StepBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StepBuilder {
    pub fn new() -> Self {
        Self {
            data: String::new(),
            next: 100,
        }
    }

    fn entity(&mut self, text: &str) -> u32 {
        let id = self.next;
        self.next += 1;
        let _ = writeln!(self.data, "#{}={};", id, text);
        id
    }

    pub fn product(&mut self, name: &str, solid: Solid) -> Product {
        let product = self.entity(&format!("PRODUCT('{0}','{0}','',(#2))", name));
        let formation = self.entity(&format!("PRODUCT_DEFINITION_FORMATION('','',#{})", product));
        let definition =
            self.entity(&format!("PRODUCT_DEFINITION('design','',#{},#3)", formation));
        let shape = self.entity(&format!("PRODUCT_DEFINITION_SHAPE('','',#{})", definition));
        let representation = self.entity("SHAPE_REPRESENTATION('',(#9),#5)");
        self.entity(&format!(
            "SHAPE_DEFINITION_REPRESENTATION(#{},#{})",
            shape, representation
        ));

        let item = match solid {
            Solid::None => None,
            Solid::Cube(size) => {
                let shell = self.shell("CLOSED_SHELL", size, &CUBE_FACES);
                let brep = self.entity(&format!("FACETED_BREP('',#{})", shell));
                Some(self.entity(&format!(
                    "FACETED_BREP_SHAPE_REPRESENTATION('',(#{}),#5)",
                    brep
                )))
            }
            Solid::OpenBox(size) => {
                let shell = self.shell("OPEN_SHELL", size, &open_box_faces());
                let model = self.entity(&format!("SHELL_BASED_SURFACE_MODEL('',(#{}))", shell));
                Some(self.entity(&format!("SHAPE_REPRESENTATION('',(#{}),#5)", model)))
            }
            Solid::Cylinder(radius, height) => {
                let brep = self.cylinder(radius, height);
                Some(self.entity(&format!(
                    "ADVANCED_BREP_SHAPE_REPRESENTATION('',(#{}),#5)",
                    brep
                )))
            }
        };
        if let Some(geometry) = item {
            self.entity(&format!(
                "SHAPE_REPRESENTATION_RELATIONSHIP('','',#{},#{})",
                representation, geometry
            ));
        }

        Product {
            definition,
            representation,
        }
    }

    fn shell(&mut self, keyword: &str, size: f64, faces: &[[usize; 4]]) -> u32 {
        let corners: Vec<u32> = (0..8usize)
            .map(|i| {
                let c = [i & 1, (i >> 1) & 1, (i >> 2) & 1].map(|b| b as f64 * size);
                self.entity(&format!(
                    "CARTESIAN_POINT('',({:?},{:?},{:?}))",
                    c[0], c[1], c[2]
                ))
            })
            .collect();
        let face_ids: Vec<String> = faces
            .iter()
            .map(|quad| {
                let pts: Vec<String> = quad.iter().map(|&c| format!("#{}", corners[c])).collect();
                let poly = self.entity(&format!("POLY_LOOP('',({}))", pts.join(",")));
                let bound = self.entity(&format!("FACE_OUTER_BOUND('',#{},.T.)", poly));
                format!("#{}", self.entity(&format!("FACE('',(#{}))", bound)))
            })
            .collect();
        self.entity(&format!("{}('',({}))", keyword, face_ids.join(",")))
    }

    /// Two planar caps and one cylindrical face joined by a seam edge
    fn cylinder(&mut self, radius: f64, height: f64) -> u32 {
        let top_point = self.entity(&format!("CARTESIAN_POINT('',(0.,0.,{:?}))", height));
        let top_axis = self.entity(&format!("AXIS2_PLACEMENT_3D('',#{},#7,#8)", top_point));
        let bottom_circle = self.entity(&format!("CIRCLE('',#9,{:?})", radius));
        let top_circle = self.entity(&format!("CIRCLE('',#{},{:?})", top_axis, radius));
        let p0 = self.entity(&format!("CARTESIAN_POINT('',({:?},0.,0.))", radius));
        let p1 = self.entity(&format!("CARTESIAN_POINT('',({:?},0.,{:?}))", radius, height));
        let v0 = self.entity(&format!("VERTEX_POINT('',#{})", p0));
        let v1 = self.entity(&format!("VERTEX_POINT('',#{})", p1));
        let bottom = self.entity(&format!("EDGE_CURVE('',#{0},#{0},#{1},.T.)", v0, bottom_circle));
        let top = self.entity(&format!("EDGE_CURVE('',#{0},#{0},#{1},.T.)", v1, top_circle));
        let direction = self.entity("VECTOR('',#7,1.)");
        let line = self.entity(&format!("LINE('',#{},#{})", p0, direction));
        let seam = self.entity(&format!("EDGE_CURVE('',#{},#{},#{},.T.)", v0, v1, line));

        let lateral_surface = self.entity(&format!("CYLINDRICAL_SURFACE('',#9,{:?})", radius));
        let lateral = self.face(
            &[(bottom, true), (seam, true), (top, false), (seam, false)],
            lateral_surface,
        );
        let bottom_plane = self.entity("PLANE('',#9)");
        let bottom_cap = self.face(&[(bottom, false)], bottom_plane);
        let top_plane = self.entity(&format!("PLANE('',#{})", top_axis));
        let top_cap = self.face(&[(top, true)], top_plane);

        let shell = self.entity(&format!(
            "CLOSED_SHELL('',(#{},#{},#{}))",
            lateral, bottom_cap, top_cap
        ));
        self.entity(&format!("MANIFOLD_SOLID_BREP('',#{})", shell))
    }

    /// ADVANCED_FACE over one loop of oriented edges
    fn face(&mut self, edges: &[(u32, bool)], surface: u32) -> u32 {
        let oriented: Vec<String> = edges
            .iter()
            .map(|&(edge, forward)| {
                let flag = if forward { ".T." } else { ".F." };
                format!("#{}", self.entity(&format!("ORIENTED_EDGE('',*,*,#{},{})", edge, flag)))
            })
            .collect();
        let edge_loop = self.entity(&format!("EDGE_LOOP('',({}))", oriented.join(",")));
        let bound = self.entity(&format!("FACE_OUTER_BOUND('',#{},.T.)", edge_loop));
        self.entity(&format!("ADVANCED_FACE('',(#{}),#{},.T.)", bound, surface))
    }

    /// Place `child` under `parent` with a translation
    pub fn place(&mut self, parent: Product, child: Product, offset: [f64; 3]) {
        let tag = self.next;
        let occurrence = self.entity(&format!(
            "NEXT_ASSEMBLY_USAGE_OCCURRENCE('{}','','',#{},#{},$)",
            tag, parent.definition, child.definition
        ));
        let shape = self.entity(&format!("PRODUCT_DEFINITION_SHAPE('','',#{})", occurrence));
        let point = self.entity(&format!(
            "CARTESIAN_POINT('',({:?},{:?},{:?}))",
            offset[0], offset[1], offset[2]
        ));
        let axis = self.entity(&format!("AXIS2_PLACEMENT_3D('',#{},#7,#8)", point));
        let transformation =
            self.entity(&format!("ITEM_DEFINED_TRANSFORMATION('','',#9,#{})", axis));
        let relation = self.entity(&format!(
            "(REPRESENTATION_RELATIONSHIP('','',#{},#{})REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION(#{})SHAPE_REPRESENTATION_RELATIONSHIP())",
            child.representation, parent.representation, transformation
        ));
        self.entity(&format!(
            "CONTEXT_DEPENDENT_SHAPE_REPRESENTATION(#{},#{})",
            relation, shape
        ));
    }

    pub fn finish(&self) -> String {
        format!("{}{}{}", HEADER, self.data, FOOTER)
    }

    pub fn write(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.finish()).unwrap();
        path
    }
}

/// Every box face except the top
fn open_box_faces() -> Vec<[usize; 4]> {
    CUBE_FACES
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, f)| *f)
        .collect()
}

/// System / Zone1 / {Valve-01, Valve-01, Pipe-02}
pub fn valve_zone() -> StepBuilder {
    let mut b = StepBuilder::new();
    let system = b.product("System", Solid::None);
    let zone = b.product("Zone1", Solid::None);
    let valve = b.product("Valve-01", Solid::Cube(10.0));
    let pipe = b.product("Pipe-02", Solid::Cube(20.0));
    b.place(system, zone, [0.0, 0.0, 0.0]);
    b.place(zone, valve, [100.0, 0.0, 0.0]);
    b.place(zone, valve, [200.0, 0.0, 0.0]);
    b.place(zone, pipe, [0.0, 300.0, 0.0]);
    b
}
