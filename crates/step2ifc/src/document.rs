// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory IFC entity graph and ISO 10303-21 serializer

use std::fmt::Write as _;

/// Instance name inside a document (`#n`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef(pub u32);

/// Attribute value of an authored entity
#[derive(Clone, Debug, PartialEq)]
pub enum IfcValue {
    /// `$`
    Null,
    /// `*`
    Derived,
    Ref(EntityRef),
    Str(String),
    /// `.NAME.`
    Enum(String),
    Int(i64),
    Real(f64),
    /// `.T.` / `.F.`
    Bool(bool),
    List(Vec<IfcValue>),
    /// `IFCLABEL('x')`
    Typed(String, Box<IfcValue>),
}

impl IfcValue {
    pub fn str(s: impl Into<String>) -> Self {
        IfcValue::Str(s.into())
    }

    pub fn opt_str(s: Option<impl Into<String>>) -> Self {
        s.map_or(IfcValue::Null, |s| IfcValue::Str(s.into()))
    }

    pub fn enumeration(s: &str) -> Self {
        IfcValue::Enum(s.to_string())
    }

    pub fn typed(type_name: &str, value: IfcValue) -> Self {
        IfcValue::Typed(type_name.to_ascii_uppercase(), Box::new(value))
    }

    pub fn refs(refs: impl IntoIterator<Item = EntityRef>) -> Self {
        IfcValue::List(refs.into_iter().map(IfcValue::Ref).collect())
    }

    pub fn reals(values: impl IntoIterator<Item = f64>) -> Self {
        IfcValue::List(values.into_iter().map(IfcValue::Real).collect())
    }

    pub fn as_entity(&self) -> Option<EntityRef> {
        match self {
            IfcValue::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            IfcValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[IfcValue]> {
        match self {
            IfcValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<EntityRef> for IfcValue {
    fn from(r: EntityRef) -> Self {
        IfcValue::Ref(r)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfcEntity {
    pub id: EntityRef,
    /// Upper-case keyword, e.g. `IFCWALL`
    pub keyword: String,
    pub attributes: Vec<IfcValue>,
}

impl IfcEntity {
    pub fn attr(&self, index: usize) -> Option<&IfcValue> {
        self.attributes.get(index)
    }
}

/// HEADER section contents
#[derive(Clone, Debug, PartialEq)]
pub struct SpfHeader {
    pub description: Vec<String>,
    pub name: String,
    /// ISO 8601 time stamp
    pub timestamp: String,
    pub author: String,
    pub organization: String,
    pub preprocessor: String,
    pub originating_system: String,
    pub schema: String,
}

/// Entity graph with instance names assigned in insertion order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IfcDocument {
    entities: Vec<IfcEntity>,
}

impl IfcDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity; instance names start at `#1`
    pub fn add(&mut self, keyword: &str, attributes: Vec<IfcValue>) -> EntityRef {
        let id = EntityRef(self.entities.len() as u32 + 1);
        self.entities.push(IfcEntity {
            id,
            keyword: keyword.to_ascii_uppercase(),
            attributes,
        });
        id
    }

    pub fn get(&self, id: EntityRef) -> Option<&IfcEntity> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.entities.get(index)
    }

    pub fn entities(&self) -> &[IfcEntity] {
        &self.entities
    }

    /// Entities of one class, in instance order
    pub fn by_type(&self, keyword: &str) -> Vec<&IfcEntity> {
        let keyword = keyword.to_ascii_uppercase();
        self.entities
            .iter()
            .filter(|e| e.keyword == keyword)
            .collect()
    }

    pub fn count(&self, keyword: &str) -> usize {
        self.by_type(keyword).len()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Serialize as an ISO 10303-21 exchange structure
    pub fn to_spf(&self, header: &SpfHeader) -> String {
        let mut out = String::with_capacity(64 * self.entities.len() + 512);
        out.push_str("ISO-10303-21;\nHEADER;\n");

        let description = IfcValue::List(header.description.iter().map(IfcValue::str).collect());
        let _ = writeln!(
            out,
            "FILE_DESCRIPTION({},'2;1');",
            format_value(&description)
        );
        let _ = writeln!(
            out,
            "FILE_NAME({},{},({}),({}),{},{},'');",
            encode_string(&header.name),
            encode_string(&header.timestamp),
            encode_string(&header.author),
            encode_string(&header.organization),
            encode_string(&header.preprocessor),
            encode_string(&header.originating_system),
        );
        let _ = writeln!(out, "FILE_SCHEMA(({}));", encode_string(&header.schema));
        out.push_str("ENDSEC;\nDATA;\n");

        for entity in &self.entities {
            let _ = write!(out, "#{}={}(", entity.id.0, entity.keyword);
            for (i, attr) in entity.attributes.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(&mut out, attr);
            }
            out.push_str(");\n");
        }

        out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
        out
    }
}

/// Render one value in exchange-structure syntax
pub fn format_value(value: &IfcValue) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &IfcValue) {
    match value {
        IfcValue::Null => out.push('$'),
        IfcValue::Derived => out.push('*'),
        IfcValue::Ref(r) => {
            let _ = write!(out, "#{}", r.0);
        }
        IfcValue::Str(s) => out.push_str(&encode_string(s)),
        IfcValue::Enum(e) => {
            let _ = write!(out, ".{}.", e.to_ascii_uppercase());
        }
        IfcValue::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        IfcValue::Real(r) => out.push_str(&format_real(*r)),
        IfcValue::Bool(b) => out.push_str(if *b { ".T." } else { ".F." }),
        IfcValue::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(')');
        }
        IfcValue::Typed(name, inner) => {
            out.push_str(name);
            out.push('(');
            write_value(out, inner);
            out.push(')');
        }
    }
}

/// Real literal; always carries a decimal point
pub fn format_real(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return "0.".to_string();
    }
    let text = format!("{:?}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let mantissa = if mantissa.contains('.') {
                mantissa.to_string()
            } else {
                format!("{}.", mantissa)
            };
            format!("{}E{}", mantissa, exponent)
        }
        None if text.contains('.') => text,
        None => format!("{}.", text),
    }
}

/// Quoted string literal with `''`, `\\` and `\X2\`/`\X4\` escapes
pub fn encode_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    let mut wide: Vec<char> = Vec::new();

    let flush = |out: &mut String, wide: &mut Vec<char>| {
        if wide.is_empty() {
            return;
        }
        if wide.iter().all(|c| (*c as u32) <= 0xFFFF) {
            out.push_str("\\X2\\");
            for c in wide.iter() {
                let _ = write!(out, "{:04X}", *c as u32);
            }
        } else {
            out.push_str("\\X4\\");
            for c in wide.iter() {
                let _ = write!(out, "{:08X}", *c as u32);
            }
        }
        out.push_str("\\X0\\");
        wide.clear();
    };

    for c in s.chars() {
        if (' '..='~').contains(&c) {
            flush(&mut out, &mut wide);
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                _ => out.push(c),
            }
        } else {
            wide.push(c);
        }
    }
    flush(&mut out, &mut wide);
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use step2ifc_parser::decode_step_string;

    #[test]
    fn test_reals_keep_decimal_point() {
        assert_eq!(format_real(1.0), "1.0");
        assert_eq!(format_real(-2.5), "-2.5");
        assert_eq!(format_real(0.0), "0.");
        assert_eq!(format_real(1e-7), "1.E-7");
        assert_eq!(format_real(1.5e22), "1.5E22");
    }

    #[test]
    fn test_string_escapes_decode_back() {
        let original = "O'Brien \\ Größe ∅ 🔧\n";
        let encoded = encode_string(original);
        assert!(encoded.is_ascii());
        assert!(encoded.contains("''"));
        let inner = &encoded[1..encoded.len() - 1];
        assert_eq!(decode_step_string(inner), original);
    }

    #[test]
    fn test_serialize_entities() {
        let mut doc = IfcDocument::new();
        let p = doc.add("IfcCartesianPoint", vec![IfcValue::reals([0.0, 0.0, 1.0])]);
        let a = doc.add(
            "IfcAxis2Placement3D",
            vec![p.into(), IfcValue::Null, IfcValue::Null],
        );
        doc.add(
            "IfcPropertySingleValue",
            vec![
                IfcValue::str("Weight"),
                IfcValue::Null,
                IfcValue::typed("IfcReal", IfcValue::Real(2.0)),
                IfcValue::Null,
            ],
        );
        assert_eq!(a, EntityRef(2));

        let header = SpfHeader {
            description: vec!["ViewDefinition [ReferenceView_V1.2]".into()],
            name: "out.ifc".into(),
            timestamp: "2024-01-01T00:00:00".into(),
            author: String::new(),
            organization: String::new(),
            preprocessor: "step2ifc".into(),
            originating_system: "step2ifc".into(),
            schema: "IFC4".into(),
        };
        let text = doc.to_spf(&header);
        assert!(text.starts_with("ISO-10303-21;\nHEADER;\n"));
        assert!(text.contains("FILE_SCHEMA(('IFC4'));"));
        assert!(text.contains("#1=IFCCARTESIANPOINT((0.,0.,1.0));"));
        assert!(text.contains("#2=IFCAXIS2PLACEMENT3D(#1,$,$);"));
        assert!(text.contains("#3=IFCPROPERTYSINGLEVALUE('Weight',$,IFCREAL(2.0),$);"));
        assert!(text.ends_with("END-ISO-10303-21;\n"));
    }

    #[test]
    fn test_lookup_by_type() {
        let mut doc = IfcDocument::new();
        doc.add("IfcWall", vec![]);
        doc.add("IFCSLAB", vec![]);
        doc.add("IfcWall", vec![]);
        assert_eq!(doc.count("IFCWALL"), 2);
        assert_eq!(doc.by_type("ifcslab")[0].id, EntityRef(2));
        assert!(doc.get(EntityRef(0)).is_none());
        assert_eq!(doc.get(EntityRef(3)).unwrap().keyword, "IFCWALL");
    }
}
