// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HEADER section parsing

use crate::tokenizer::decode_step_string;
use step2ifc_model::ModelMetadata;

/// Check that content looks like an ISO 10303-21 exchange structure
pub fn is_exchange_structure(content: &str) -> bool {
    let head = content.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("ISO-10303-21") && content.contains("DATA;")
}

/// Parse the header section to extract metadata
pub fn parse_header(content: &str) -> ModelMetadata {
    let mut info = ModelMetadata::default();

    let header_start = content.find("HEADER;").unwrap_or(0);
    let header_end = content[header_start..]
        .find("ENDSEC;")
        .map(|p| header_start + p)
        .unwrap_or(content.len());
    let header = &content[header_start..header_end];

    // FILE_DESCRIPTION(('text', ...), '2;1')
    if let Some(desc_start) = header.find("FILE_DESCRIPTION") {
        if let Some(paren) = header[desc_start..].find('(') {
            let start = desc_start + paren + 1;
            if let Some((items, _)) = parse_header_list(&header[start..]) {
                if !items.is_empty() {
                    info.file_description = Some(items.join("; "));
                }
            }
        }
    }

    // FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'))
    if let Some(schema_start) = header.find("FILE_SCHEMA") {
        if let Some(paren) = header[schema_start..].find('(') {
            let start = schema_start + paren + 1;
            if let Some((schemas, _)) = parse_header_list(&header[start..]) {
                if let Some(first) = schemas.first() {
                    info.schema_version = first
                        .split_whitespace()
                        .next()
                        .unwrap_or(first)
                        .to_string();
                }
            }
        }
    }

    // FILE_NAME(name, timestamp, (author), (organization), preprocessor, originating_system, authorization)
    if let Some(name_start) = header.find("FILE_NAME") {
        if let Some(paren) = header[name_start..].find('(') {
            let rest = &header[name_start + paren + 1..];
            if let Some((file_name, rest)) = parse_header_string(rest) {
                info.file_name = non_empty(file_name);
                let rest = skip_comma(rest);
                if let Some((timestamp, rest)) = parse_header_string(rest) {
                    info.timestamp = non_empty(timestamp);
                    let rest = skip_comma(rest);
                    if let Some((authors, rest)) = parse_header_list(rest) {
                        info.author = authors.into_iter().next();
                        let rest = skip_comma(rest);
                        if let Some((orgs, rest)) = parse_header_list(rest) {
                            info.organization = orgs.into_iter().next();
                            let rest = skip_comma(rest);
                            if let Some((preproc, rest)) = parse_header_string(rest) {
                                info.preprocessor_version = non_empty(preproc);
                                let rest = skip_comma(rest);
                                if let Some((system, _)) = parse_header_string(rest) {
                                    info.originating_system = non_empty(system);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    info
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn skip_comma(s: &str) -> &str {
    let s = s.trim_start();
    s.strip_prefix(',').unwrap_or(s)
}

/// Parse a string from header ('value')
fn parse_header_string(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    if let Some(rest) = s.strip_prefix('$') {
        return Some((String::new(), rest));
    }
    if !s.starts_with('\'') {
        return None;
    }

    let mut end = 1;
    let bytes = s.as_bytes();
    while end < bytes.len() {
        if bytes[end] == b'\'' {
            if end + 1 < bytes.len() && bytes[end + 1] == b'\'' {
                end += 2;
                continue;
            }
            break;
        }
        end += 1;
    }

    let value = decode_step_string(s.get(1..end)?);
    Some((value, s.get(end + 1..).unwrap_or("")))
}

/// Parse a list from header (('value1', 'value2'))
fn parse_header_list(s: &str) -> Option<(Vec<String>, &str)> {
    let s = s.trim_start();
    let Some(mut current) = s.strip_prefix('(') else {
        // Tolerate a bare string where a list is expected
        return parse_header_string(s).map(|(v, rest)| (non_empty(v).into_iter().collect(), rest));
    };

    let mut items = Vec::new();
    loop {
        current = current.trim_start();
        if let Some(rest) = current.strip_prefix(')') {
            return Some((items, rest));
        }

        if let Some((item, rest)) = parse_header_string(current) {
            if !item.is_empty() {
                items.push(item);
            }
            current = skip_comma(rest);
        } else if let Some(pos) = current.find([',', ')']) {
            current = &current[pos..];
            current = current.strip_prefix(',').unwrap_or(current);
        } else {
            break;
        }
    }

    Some((items, current))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('Skid assembly'),'2;1');
FILE_NAME('skid.stp','2024-03-01T10:00:00',('J. Doe'),('Plant Co'),'ST-DEVELOPER','CAD Tool 12','');
FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'));
ENDSEC;
DATA;
ENDSEC;
END-ISO-10303-21;
"#;

    #[test]
    fn test_parse_header_fields() {
        let meta = parse_header(HEADER);
        assert_eq!(meta.schema_version, "AUTOMOTIVE_DESIGN");
        assert_eq!(meta.file_name.as_deref(), Some("skid.stp"));
        assert_eq!(meta.file_description.as_deref(), Some("Skid assembly"));
        assert_eq!(meta.author.as_deref(), Some("J. Doe"));
        assert_eq!(meta.organization.as_deref(), Some("Plant Co"));
        assert_eq!(meta.preprocessor_version.as_deref(), Some("ST-DEVELOPER"));
        assert_eq!(meta.originating_system.as_deref(), Some("CAD Tool 12"));
        assert_eq!(meta.timestamp.as_deref(), Some("2024-03-01T10:00:00"));
    }

    #[test]
    fn test_exchange_structure_detection() {
        assert!(is_exchange_structure(HEADER));
        assert!(!is_exchange_structure("solid cube\nfacet normal 0 0 1\n"));
    }
}
