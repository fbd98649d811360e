//! Render a Schema Card as OWL/RDFS Turtle.
//!
//! The output round-trips through the baseline importer: classes are
//! declared `a owl:Class` with `rdfs:label`/`rdfs:comment`, properties
//! carry `rdfs:domain`/`rdfs:range`, and datatype ranges map onto XSD. The
//! emitter shares the importer's identifier rules: a name that is not a
//! plain identifier is emitted as a percent-encoded full IRI, which the
//! importer refuses with a warning rather than silently round-tripping.

use crate::card::{name_key, SchemaCard};

pub const OWL_NS: &str = "http://www.w3.org/2002/07/owl#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

pub fn schema_card_to_turtle(card: &SchemaCard) -> String {
    let mut out = String::new();
    out.push_str(&format!("@prefix ns: <{}> .\n", card.namespace));
    out.push_str(&format!("@prefix owl: <{OWL_NS}> .\n"));
    out.push_str(&format!("@prefix rdfs: <{RDFS_NS}> .\n"));
    out.push_str(&format!("@prefix xsd: <{XSD_NS}> .\n"));

    let mut classes: Vec<_> = card.classes.iter().collect();
    classes.sort_by_key(|c| name_key(&c.name));
    for class in classes {
        out.push('\n');
        out.push_str(&format!(
            "{} a owl:Class ;\n",
            term_ref(&card.namespace, &class.name)
        ));
        out.push_str(&format!("    rdfs:label {}", turtle_string(&class.name)));
        if class.description.is_empty() {
            out.push_str(" .\n");
        } else {
            out.push_str(&format!(
                " ;\n    rdfs:comment {} .\n",
                turtle_string(&class.description)
            ));
        }
    }

    let mut datatype_properties: Vec<_> = card.datatype_properties.iter().collect();
    datatype_properties.sort_by_key(|p| name_key(&p.name));
    for prop in datatype_properties {
        out.push('\n');
        out.push_str(&format!(
            "{} a owl:DatatypeProperty ;\n",
            term_ref(&card.namespace, &prop.name)
        ));
        if !prop.domain.is_empty() {
            out.push_str(&format!(
                "    rdfs:domain {} ;\n",
                term_ref(&card.namespace, &prop.domain)
            ));
        }
        out.push_str(&format!("    rdfs:range xsd:{} ;\n", prop.range.xsd_local()));
        out.push_str(&format!("    rdfs:label {}", turtle_string(&prop.name)));
        if prop.description.is_empty() {
            out.push_str(" .\n");
        } else {
            out.push_str(&format!(
                " ;\n    rdfs:comment {} .\n",
                turtle_string(&prop.description)
            ));
        }
    }

    let mut object_properties: Vec<_> = card.object_properties.iter().collect();
    object_properties.sort_by_key(|p| name_key(&p.name));
    for prop in object_properties {
        out.push('\n');
        out.push_str(&format!(
            "{} a owl:ObjectProperty ;\n",
            term_ref(&card.namespace, &prop.name)
        ));
        if !prop.domain.is_empty() {
            out.push_str(&format!(
                "    rdfs:domain {} ;\n",
                term_ref(&card.namespace, &prop.domain)
            ));
        }
        if !prop.range.is_empty() {
            out.push_str(&format!(
                "    rdfs:range {} ;\n",
                term_ref(&card.namespace, &prop.range)
            ));
        }
        out.push_str(&format!("    rdfs:label {}", turtle_string(&prop.name)));
        if prop.description.is_empty() {
            out.push_str(" .\n");
        } else {
            out.push_str(&format!(
                " ;\n    rdfs:comment {} .\n",
                turtle_string(&prop.description)
            ));
        }
    }

    out
}

/// `true` when `name` is safe both as a Turtle prefixed local name and as
/// an IRI local name the importer will accept back.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prefixed name for identifier-safe names, percent-encoded full IRI
/// otherwise.
pub(crate) fn term_ref(namespace: &str, name: &str) -> String {
    if is_plain_identifier(name) {
        format!("ns:{name}")
    } else {
        format!("<{namespace}{}>", percent_encode(name))
    }
}

pub(crate) fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// A quoted Turtle string literal with `\`, `"`, and control characters
/// escaped.
pub(crate) fn turtle_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
