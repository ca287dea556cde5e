//! Schema compiler.
//!
//! Compiles a parsed schema tree into per-type op lists (`TypePlan`) that the
//! message codecs interpret. The compiler specializes aggressively:
//!
//! - consecutive primitive fields of one kind collapse into a single run op,
//!   decoded/encoded as one aligned bulk transfer;
//! - fixed-length primitive arrays and primitive sequences become single
//!   bulk ops;
//! - complex fields reference the sub-type's plan by index, and plans are
//!   cached by type name so total plan size stays linear in field count.
//!
//! Endianness is not baked into plans; the executing codec supplies it at
//! run time.

use std::collections::HashMap;

use crate::core::{CodecError, Result};
use crate::schema::ast::{FieldType, ParsedSchema, PrimitiveType, Schema, StringKind};

/// One interpreted operation. `field` indexes into the owning plan's
/// `field_names`; `plan` indexes into [`CompiledSchema::plans`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOp {
    /// A run of consecutive same-kind primitive fields: one aligned bulk
    /// transfer of `fields.len() * kind.width()` bytes.
    PrimRun {
        kind: PrimitiveType,
        fields: Vec<u32>,
    },
    StrField {
        field: u32,
        wide: bool,
    },
    TimeField {
        field: u32,
    },
    DurationField {
        field: u32,
    },
    /// Fixed-length primitive array: align once, bulk-transfer
    /// `length * kind.width()` bytes.
    FixedPrimArray {
        field: u32,
        kind: PrimitiveType,
        length: usize,
    },
    /// Primitive sequence: u32 length, align to element width, bulk transfer.
    SeqPrimArray {
        field: u32,
        kind: PrimitiveType,
        /// Upper bound for bounded arrays, checked on encode
        bound: Option<usize>,
    },
    FixedStrArray {
        field: u32,
        wide: bool,
        length: usize,
    },
    SeqStrArray {
        field: u32,
        wide: bool,
        bound: Option<usize>,
    },
    FixedTimeArray {
        field: u32,
        duration: bool,
        length: usize,
    },
    SeqTimeArray {
        field: u32,
        duration: bool,
        bound: Option<usize>,
    },
    ComplexField {
        field: u32,
        plan: usize,
    },
    FixedComplexArray {
        field: u32,
        plan: usize,
        length: usize,
    },
    SeqComplexArray {
        field: u32,
        plan: usize,
        bound: Option<usize>,
    },
}

/// Compiled encode/decode program for one message type.
#[derive(Debug, Clone)]
pub struct TypePlan {
    pub type_name: String,
    /// Wire field names in declaration order
    pub field_names: Vec<String>,
    pub ops: Vec<PlanOp>,
}

/// All plans reachable from one root schema.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub plans: Vec<TypePlan>,
    /// Index of the root type's plan
    pub root: usize,
    /// True if any reachable plan uses ROS1 time/duration
    pub uses_ros1_time: bool,
}

impl CompiledSchema {
    /// The root plan.
    pub fn root_plan(&self) -> &TypePlan {
        &self.plans[self.root]
    }
}

/// Compile a parsed schema into plans for the root type and every type it
/// transitively references.
pub fn compile(parsed: &ParsedSchema) -> Result<CompiledSchema> {
    let mut compiler = Compiler {
        parsed,
        plans: Vec::new(),
        by_name: HashMap::new(),
        uses_ros1_time: false,
    };
    let root = compiler.build(&parsed.root)?;
    Ok(CompiledSchema {
        plans: compiler.plans,
        root,
        uses_ros1_time: compiler.uses_ros1_time,
    })
}

struct Compiler<'a> {
    parsed: &'a ParsedSchema,
    plans: Vec<TypePlan>,
    /// `None` marks a type currently being compiled (cycle guard).
    by_name: HashMap<String, Option<usize>>,
    uses_ros1_time: bool,
}

impl<'a> Compiler<'a> {
    fn build(&mut self, schema: &Schema) -> Result<usize> {
        match self.by_name.get(&schema.name) {
            Some(Some(idx)) => return Ok(*idx),
            Some(None) => {
                return Err(CodecError::malformed_schema(
                    &schema.name,
                    "circular complex reference",
                ))
            }
            None => {}
        }
        self.by_name.insert(schema.name.clone(), None);

        // Reserve the slot so nested plans land after this one but the
        // index is stable while recursing.
        let idx = self.plans.len();
        self.plans.push(TypePlan {
            type_name: schema.name.clone(),
            field_names: Vec::new(),
            ops: Vec::new(),
        });

        let mut field_names = Vec::new();
        let mut ops = Vec::new();
        let mut run: Option<(PrimitiveType, Vec<u32>)> = None;

        macro_rules! flush_run {
            () => {
                if let Some((kind, fields)) = run.take() {
                    ops.push(PlanOp::PrimRun { kind, fields });
                }
            };
        }

        for (name, field) in schema.fields() {
            let field_idx = field_names.len() as u32;
            field_names.push(name.to_string());

            match &field.ty {
                FieldType::Primitive(kind) => match &mut run {
                    Some((run_kind, fields)) if *run_kind == *kind => {
                        fields.push(field_idx);
                    }
                    _ => {
                        flush_run!();
                        run = Some((*kind, vec![field_idx]));
                    }
                },
                other => {
                    flush_run!();
                    self.build_field_op(other, field_idx, &mut ops, &schema.name)?;
                }
            }
        }
        flush_run!();

        self.plans[idx].field_names = field_names;
        self.plans[idx].ops = ops;
        self.by_name.insert(schema.name.clone(), Some(idx));
        Ok(idx)
    }

    fn build_field_op(
        &mut self,
        ty: &FieldType,
        field: u32,
        ops: &mut Vec<PlanOp>,
        owner: &str,
    ) -> Result<()> {
        match ty {
            FieldType::Primitive(_) => unreachable!("primitives are batched into runs"),
            FieldType::Str { kind, .. } => ops.push(PlanOp::StrField {
                field,
                wide: *kind == StringKind::Wide,
            }),
            FieldType::Time => {
                self.uses_ros1_time = true;
                ops.push(PlanOp::TimeField { field });
            }
            FieldType::Duration => {
                self.uses_ros1_time = true;
                ops.push(PlanOp::DurationField { field });
            }
            FieldType::Sequence { element } => {
                self.build_array_op(element, field, None, None, ops, owner)?
            }
            FieldType::Array {
                element,
                length,
                bounded,
            } => {
                if *bounded {
                    self.build_array_op(
                        element,
                        field,
                        None,
                        Some(*length as usize),
                        ops,
                        owner,
                    )?
                } else {
                    self.build_array_op(element, field, Some(*length as usize), None, ops, owner)?
                }
            }
            FieldType::Complex(name) => {
                let plan = self.build_complex(name, owner)?;
                ops.push(PlanOp::ComplexField { field, plan });
            }
        }
        Ok(())
    }

    /// `length` is set for fixed arrays; `bound` for bounded arrays, which
    /// share the sequence wire format.
    fn build_array_op(
        &mut self,
        element: &FieldType,
        field: u32,
        length: Option<usize>,
        bound: Option<usize>,
        ops: &mut Vec<PlanOp>,
        owner: &str,
    ) -> Result<()> {
        let op = match element {
            FieldType::Primitive(kind) => match length {
                Some(length) => PlanOp::FixedPrimArray {
                    field,
                    kind: *kind,
                    length,
                },
                None => PlanOp::SeqPrimArray {
                    field,
                    kind: *kind,
                    bound,
                },
            },
            FieldType::Str { kind, .. } => {
                let wide = *kind == StringKind::Wide;
                match length {
                    Some(length) => PlanOp::FixedStrArray {
                        field,
                        wide,
                        length,
                    },
                    None => PlanOp::SeqStrArray { field, wide, bound },
                }
            }
            FieldType::Time | FieldType::Duration => {
                self.uses_ros1_time = true;
                let duration = matches!(element, FieldType::Duration);
                match length {
                    Some(length) => PlanOp::FixedTimeArray {
                        field,
                        duration,
                        length,
                    },
                    None => PlanOp::SeqTimeArray {
                        field,
                        duration,
                        bound,
                    },
                }
            }
            FieldType::Complex(name) => {
                let plan = self.build_complex(name, owner)?;
                match length {
                    Some(length) => PlanOp::FixedComplexArray {
                        field,
                        plan,
                        length,
                    },
                    None => PlanOp::SeqComplexArray { field, plan, bound },
                }
            }
            FieldType::Array { .. } | FieldType::Sequence { .. } => {
                return Err(CodecError::malformed_schema(
                    owner,
                    "nested array types are not supported by the .msg grammar",
                ))
            }
        };
        ops.push(op);
        Ok(())
    }

    fn build_complex(&mut self, name: &str, owner: &str) -> Result<usize> {
        let sub = self
            .parsed
            .resolve(name)
            .ok_or_else(|| {
                CodecError::malformed_schema(
                    owner,
                    format!("unresolved complex reference '{name}'"),
                )
            })?
            .clone();
        self.build(&sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::{parse_schema, Dialect};

    fn compile_text(name: &str, text: &str) -> CompiledSchema {
        let parsed = parse_schema(name, text, Dialect::Ros2).unwrap();
        compile(&parsed).unwrap()
    }

    #[test]
    fn test_same_kind_fields_batch_into_one_run() {
        let compiled = compile_text("geometry_msgs/msg/Point", "float64 x\nfloat64 y\nfloat64 z");
        let plan = compiled.root_plan();
        assert_eq!(plan.ops.len(), 1);
        assert_eq!(
            plan.ops[0],
            PlanOp::PrimRun {
                kind: PrimitiveType::Float64,
                fields: vec![0, 1, 2],
            }
        );
    }

    #[test]
    fn test_mixed_kinds_break_runs() {
        let compiled = compile_text("pkg/msg/T", "int32 a\nint32 b\nfloat64 c\nint32 d");
        let plan = compiled.root_plan();
        assert_eq!(plan.ops.len(), 3);
        assert_eq!(
            plan.ops[0],
            PlanOp::PrimRun {
                kind: PrimitiveType::Int32,
                fields: vec![0, 1],
            }
        );
        assert_eq!(
            plan.ops[1],
            PlanOp::PrimRun {
                kind: PrimitiveType::Float64,
                fields: vec![2],
            }
        );
    }

    #[test]
    fn test_string_breaks_run() {
        let compiled = compile_text("pkg/msg/T", "int32 a\nstring s\nint32 b");
        let plan = compiled.root_plan();
        assert_eq!(plan.ops.len(), 3);
        assert!(matches!(plan.ops[1], PlanOp::StrField { wide: false, .. }));
    }

    #[test]
    fn test_constants_omitted_from_plan() {
        let compiled = compile_text("pkg/msg/T", "uint8 OK=0\nuint8 level");
        let plan = compiled.root_plan();
        assert_eq!(plan.field_names, vec!["level"]);
        assert_eq!(plan.ops.len(), 1);
    }

    #[test]
    fn test_fixed_array_is_single_bulk_op() {
        let compiled = compile_text("pkg/msg/T", "float64[36] covariance");
        assert_eq!(
            compiled.root_plan().ops[0],
            PlanOp::FixedPrimArray {
                field: 0,
                kind: PrimitiveType::Float64,
                length: 36,
            }
        );
    }

    #[test]
    fn test_bounded_array_compiles_as_sequence() {
        let compiled = compile_text("pkg/msg/T", "uint8[<=16] data");
        assert_eq!(
            compiled.root_plan().ops[0],
            PlanOp::SeqPrimArray {
                field: 0,
                kind: PrimitiveType::UInt8,
                bound: Some(16),
            }
        );
    }

    #[test]
    fn test_complex_plans_are_cached() {
        let sep = "=".repeat(80);
        let text = format!(
            "geometry_msgs/Point a\ngeometry_msgs/Point b\n{sep}\nMSG: geometry_msgs/Point\nfloat64 x\nfloat64 y\nfloat64 z\n"
        );
        let parsed = parse_schema("pkg/msg/T", &text, Dialect::Ros2).unwrap();
        let compiled = compile(&parsed).unwrap();
        // Root plan + one shared Point plan, not one per reference.
        assert_eq!(compiled.plans.len(), 2);
        let root = compiled.root_plan();
        let (p1, p2) = match (&root.ops[0], &root.ops[1]) {
            (PlanOp::ComplexField { plan: p1, .. }, PlanOp::ComplexField { plan: p2, .. }) => {
                (*p1, *p2)
            }
            other => panic!("unexpected ops: {other:?}"),
        };
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_ros1_time_flag() {
        let parsed = parse_schema(
            "std_msgs/Header",
            "uint32 seq\ntime stamp\nstring frame_id",
            Dialect::Ros1,
        )
        .unwrap();
        let compiled = compile(&parsed).unwrap();
        assert!(compiled.uses_ros1_time);
    }

    #[test]
    fn test_field_names_in_declaration_order() {
        let compiled = compile_text("pkg/msg/T", "int32 first\nstring second\nfloat64 third");
        assert_eq!(
            compiled.root_plan().field_names,
            vec!["first", "second", "third"]
        );
    }
}
