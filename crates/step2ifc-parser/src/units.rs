// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Length unit extraction from STEP files

use step2ifc_model::{AttributeValue, DecodedEntity, EntityResolver, SourceUnit, StepType};

/// Extract the length unit of the geometry
///
/// Prefers units assigned through a GLOBAL_UNIT_ASSIGNED_CONTEXT and falls
/// back to the first LENGTH_UNIT in the file. Returns `None` when the file
/// declares no length unit.
pub fn extract_length_unit(resolver: &dyn EntityResolver) -> Option<SourceUnit> {
    for context in resolver.entities_by_type(&StepType::GlobalUnitAssignedContext) {
        let Some(units) = attributes_of(&context, &StepType::GlobalUnitAssignedContext)
            .and_then(|attrs| attrs.first())
        else {
            continue;
        };
        for unit in resolver.resolve_ref_list(units) {
            if let Some(found) = length_unit(&unit, resolver, 0) {
                return Some(found);
            }
        }
    }

    resolver
        .entities_by_type(&StepType::LengthUnit)
        .iter()
        .find_map(|unit| length_unit(unit, resolver, 0))
}

/// Attributes of a simple instance of `step_type`, or of that partial type
/// within a complex instance
pub(crate) fn attributes_of<'a>(
    entity: &'a DecodedEntity,
    step_type: &StepType,
) -> Option<&'a [AttributeValue]> {
    if &entity.step_type == step_type {
        Some(&entity.attributes)
    } else {
        entity.component(step_type).map(|c| c.attributes.as_slice())
    }
}

/// Scale of a length unit entity (SI_UNIT or CONVERSION_BASED_UNIT)
fn length_unit(unit: &DecodedEntity, resolver: &dyn EntityResolver, depth: u8) -> Option<SourceUnit> {
    if !unit.is_a(&StepType::LengthUnit) || depth > 4 {
        return None;
    }

    // SI_UNIT(prefix, name)
    if let Some(attrs) = attributes_of(unit, &StepType::SiUnit) {
        if attrs.get(1).and_then(|a| a.as_enum()) != Some("METRE") {
            return None;
        }
        let metres = attrs.first().and_then(|a| a.as_enum()).map(prefix_scale).unwrap_or(1.0);
        return Some(SourceUnit {
            name: si_short_name(metres),
            metres,
        });
    }

    // CONVERSION_BASED_UNIT(name, conversion_factor)
    let attrs = attributes_of(unit, &StepType::ConversionBasedUnit)?;
    let name = attrs.first().and_then(|a| a.as_string()).unwrap_or("");
    let factor = resolver.resolve_ref(attrs.get(1)?)?;
    let factor_attrs = attributes_of(&factor, &StepType::LengthMeasureWithUnit)
        .or_else(|| attributes_of(&factor, &StepType::MeasureWithUnit))?;
    let value = factor_attrs.first()?.as_float()?;
    let base = factor_attrs
        .get(1)
        .and_then(|a| resolver.resolve_ref(a))
        .and_then(|u| length_unit(&u, resolver, depth + 1))
        .map(|u| u.metres)
        .unwrap_or(1.0);

    Some(SourceUnit {
        name: conversion_short_name(name),
        metres: value * base,
    })
}

fn prefix_scale(prefix: &str) -> f64 {
    match prefix {
        "EXA" => 1e18,
        "PETA" => 1e15,
        "TERA" => 1e12,
        "GIGA" => 1e9,
        "MEGA" => 1e6,
        "KILO" => 1e3,
        "HECTO" => 1e2,
        "DECA" => 1e1,
        "DECI" => 1e-1,
        "CENTI" => 1e-2,
        "MILLI" => 1e-3,
        "MICRO" => 1e-6,
        "NANO" => 1e-9,
        "PICO" => 1e-12,
        "FEMTO" => 1e-15,
        "ATTO" => 1e-18,
        _ => 1.0,
    }
}

fn si_short_name(metres: f64) -> String {
    let close = |v: f64| (metres - v).abs() <= v * 1e-9;
    if close(scales::MILLIMETRE) {
        "mm".into()
    } else if close(scales::CENTIMETRE) {
        "cm".into()
    } else if close(scales::METRE) {
        "m".into()
    } else if close(scales::KILOMETRE) {
        "km".into()
    } else {
        format!("{}m", metres)
    }
}

fn conversion_short_name(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "inch" | "in" | "inches" => "in".into(),
        "foot" | "ft" | "feet" => "ft".into(),
        "yard" | "yd" => "yd".into(),
        other => other.to_string(),
    }
}

/// Common unit scales in metres
pub mod scales {
    pub const METRE: f64 = 1.0;
    pub const MILLIMETRE: f64 = 0.001;
    pub const CENTIMETRE: f64 = 0.01;
    pub const KILOMETRE: f64 = 1000.0;
    pub const INCH: f64 = 0.0254;
    pub const FOOT: f64 = 0.3048;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParsedStep;

    fn unit_of(data: &str) -> Option<SourceUnit> {
        let content = format!(
            "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('CONFIG_CONTROL_DESIGN'));\nENDSEC;\nDATA;\n{}\nENDSEC;\nEND-ISO-10303-21;\n",
            data
        );
        let model = ParsedStep::parse(&content).unwrap();
        extract_length_unit(model.resolver.as_ref())
    }

    #[test]
    fn test_si_millimetre() {
        let unit = unit_of(
            "#1=(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.));\n\
             #2=(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNIT_ASSIGNED_CONTEXT((#1))REPRESENTATION_CONTEXT('',''));",
        )
        .unwrap();
        assert_eq!(unit.name, "mm");
        assert!((unit.metres - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_conversion_based_inch() {
        let unit = unit_of(
            "#1=(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.));\n\
             #2=LENGTH_MEASURE_WITH_UNIT(LENGTH_MEASURE(25.4),#1);\n\
             #3=(CONVERSION_BASED_UNIT('INCH',#2)LENGTH_UNIT()NAMED_UNIT(#4));\n\
             #5=(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNIT_ASSIGNED_CONTEXT((#3))REPRESENTATION_CONTEXT('',''));",
        )
        .unwrap();
        assert_eq!(unit.name, "in");
        assert!((unit.metres - scales::INCH).abs() < 1e-12);
    }

    #[test]
    fn test_plane_angle_units_ignored() {
        let unit = unit_of("#1=(NAMED_UNIT(*)PLANE_ANGLE_UNIT()SI_UNIT($,.RADIAN.));");
        assert!(unit.is_none());
    }
}
