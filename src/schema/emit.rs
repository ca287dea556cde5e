//! Schema tree to .msg text emission.
//!
//! The emitter is the inverse of the parser up to whitespace and comments:
//! re-parsing emitted text yields an equal tree. Complex references and
//! `MSG:` headers always use the short `pkg/Short` form, which both dialects
//! accept.

use crate::core::Value;
use crate::schema::ast::{FieldType, ParsedSchema, Schema, SchemaEntry, StringKind};

/// Separator between schema blocks (80 `=` characters).
pub fn separator() -> String {
    "=".repeat(80)
}

/// Emit the full schema text: root block, then one block per sub-schema.
pub fn emit_schema(parsed: &ParsedSchema) -> String {
    let mut out = emit_block(&parsed.root);
    for (name, sub) in &parsed.subs {
        out.push_str(&separator());
        out.push('\n');
        out.push_str(&format!("MSG: {}\n", crate::schema::ast::short_name(name)));
        out.push_str(&emit_block(sub));
    }
    out
}

fn emit_block(schema: &Schema) -> String {
    let mut out = String::new();
    for (name, entry) in &schema.entries {
        match entry {
            SchemaEntry::Constant { ty, value } => {
                out.push_str(&format!(
                    "{} {}={}\n",
                    type_token(ty),
                    name,
                    literal_token(value)
                ));
            }
            SchemaEntry::Field(field) => match &field.default {
                Some(default) => out.push_str(&format!(
                    "{} {} {}\n",
                    type_token(&field.ty),
                    name,
                    literal_token(default)
                )),
                None => out.push_str(&format!("{} {}\n", type_token(&field.ty), name)),
            },
        }
    }
    out
}

/// The .msg type token for a field type.
pub fn type_token(ty: &FieldType) -> String {
    match ty {
        FieldType::Primitive(p) => p.as_str().to_string(),
        FieldType::Str { kind, max_length } => {
            let base = match kind {
                StringKind::Utf8 => "string",
                StringKind::Wide => "wstring",
            };
            match max_length {
                Some(n) => format!("{base}<={n}"),
                None => base.to_string(),
            }
        }
        FieldType::Array {
            element,
            length,
            bounded,
        } => {
            if *bounded {
                format!("{}[<={length}]", type_token(element))
            } else {
                format!("{}[{length}]", type_token(element))
            }
        }
        FieldType::Sequence { element } => format!("{}[]", type_token(element)),
        FieldType::Complex(name) => crate::schema::ast::short_name(name),
        FieldType::Time => "time".to_string(),
        FieldType::Duration => "duration".to_string(),
    }
}

fn literal_token(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(literal_token).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Bool(b) => b.to_string(),
        Value::Int8(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::UInt8(v) => v.to_string(),
        Value::UInt16(v) => v.to_string(),
        Value::UInt32(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::Float32(v) => format_float(*v as f64),
        Value::Float64(v) => format_float(*v),
        other => other.to_string(),
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}
