//! Schema model, parser, emitter, compiler, and type store.

pub mod ast;
pub mod compiler;
pub mod emit;
pub mod parser;
pub mod typestore;

pub use ast::{
    normalize_name, short_name, FieldType, ParsedSchema, PrimitiveType, Schema, SchemaEntry,
    SchemaField, StringKind,
};
pub use compiler::{compile, CompiledSchema, PlanOp, TypePlan};
pub use emit::emit_schema;
pub use parser::{parse_schema, parse_schema_auto, Dialect};
pub use typestore::{SchemaText, TypeStore};
