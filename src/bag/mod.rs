//! ROS1 bag v2.0 container format.

pub mod reader;
pub mod record_read;
pub mod record_write;
pub mod records;
pub mod writer;

pub use reader::{BagMessageQuery, BagReader};
pub use writer::{BagWriteOptions, BagWriter};

use crate::core::Result;
use crate::schema::{emit, FieldType, ParsedSchema, Schema};

/// Compute the genmsg-compatible md5sum for a message definition.
///
/// Constants come first (`type NAME=value`), then fields in declaration
/// order; complex fields contribute their sub-type's md5sum in place of the
/// type token.
pub fn compute_md5sum(parsed: &ParsedSchema) -> Result<String> {
    md5_of(parsed, &parsed.root)
}

fn md5_of(parsed: &ParsedSchema, schema: &Schema) -> Result<String> {
    let mut content = String::new();
    for (name, ty, value) in schema.constants() {
        content.push_str(&format!(
            "{} {}={}\n",
            emit::type_token(ty),
            name,
            value
        ));
    }
    for (name, field) in schema.fields() {
        let complex_name = match &field.ty {
            FieldType::Complex(type_name) => Some(type_name.clone()),
            FieldType::Array { element, .. } | FieldType::Sequence { element } => {
                match element.as_ref() {
                    FieldType::Complex(type_name) => Some(type_name.clone()),
                    _ => None,
                }
            }
            _ => None,
        };
        match complex_name {
            Some(type_name) => {
                let sub = parsed
                    .resolve(&type_name)
                    .ok_or_else(|| crate::core::CodecError::type_not_found(&type_name))?
                    .clone();
                let sub_md5 = md5_of(parsed, &sub)?;
                content.push_str(&format!("{sub_md5} {name}\n"));
            }
            None => {
                content.push_str(&format!("{} {}\n", emit::type_token(&field.ty), name));
            }
        }
    }
    Ok(format!("{:x}", md5::compute(content.trim_end().as_bytes())))
}
