//! Plan executor.
//!
//! Interprets the schema compiler's op lists against a payload cursor. One
//! executor serves every binary encoding; the cursor decides alignment,
//! endianness, and string framing. Bulk ops (runs, primitive arrays,
//! sequences) become a single aligned byte transfer.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::core::{CodecError, MessageValue, Result, Value};
use crate::encoding::{PayloadReader, PayloadWriter};
use crate::schema::{CompiledSchema, PlanOp, PrimitiveType, TypePlan};

/// Upper bound on decoded sequence lengths, to reject corrupt length
/// prefixes before allocating.
const MAX_ARRAY_LENGTH: usize = 10_000_000;

/// Decode a full message with a compiled plan set.
pub fn decode_message<R: PayloadReader>(
    compiled: &CompiledSchema,
    reader: &mut R,
) -> Result<MessageValue> {
    decode_plan(compiled, compiled.root, reader)
}

/// Encode a full message with a compiled plan set.
pub fn encode_message<W: PayloadWriter>(
    compiled: &CompiledSchema,
    writer: &mut W,
    msg: &MessageValue,
) -> Result<()> {
    encode_plan(compiled, compiled.root, writer, msg)
}

fn decode_plan<R: PayloadReader>(
    compiled: &CompiledSchema,
    idx: usize,
    reader: &mut R,
) -> Result<MessageValue> {
    let plan = &compiled.plans[idx];
    let mut msg = MessageValue::with_capacity(plan.field_names.len());

    for op in &plan.ops {
        match op {
            PlanOp::PrimRun { kind, fields } => {
                let width = kind.width();
                reader.align(width)?;
                let le = reader.is_little_endian();
                let total = width * fields.len();
                let values: Vec<Value> = {
                    let bytes = reader.read_bytes(total)?;
                    bytes
                        .chunks_exact(width)
                        .map(|chunk| decode_scalar(*kind, chunk, le))
                        .collect()
                };
                for (value, field) in values.into_iter().zip(fields) {
                    msg.insert(plan.field_names[*field as usize].clone(), value);
                }
            }
            PlanOp::StrField { field, wide } => {
                let s = if *wide {
                    reader.read_wstring()?
                } else {
                    reader.read_string()?
                };
                insert(plan, &mut msg, *field, Value::String(s));
            }
            PlanOp::TimeField { field } => {
                let value = decode_time(reader)?;
                insert(plan, &mut msg, *field, value);
            }
            PlanOp::DurationField { field } => {
                let value = decode_duration(reader)?;
                insert(plan, &mut msg, *field, value);
            }
            PlanOp::FixedPrimArray {
                field,
                kind,
                length,
            } => {
                let values = decode_prim_slab(reader, *kind, *length)?;
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::SeqPrimArray { field, kind, .. } => {
                let len = read_len(reader)?;
                let values = if len == 0 {
                    Vec::new()
                } else {
                    decode_prim_slab(reader, *kind, len)?
                };
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::FixedStrArray {
                field,
                wide,
                length,
            } => {
                let values = decode_str_elems(reader, *wide, *length)?;
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::SeqStrArray { field, wide, .. } => {
                let len = read_len(reader)?;
                let values = decode_str_elems(reader, *wide, len)?;
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::FixedTimeArray {
                field,
                duration,
                length,
            } => {
                let values = decode_time_elems(reader, *duration, *length)?;
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::SeqTimeArray {
                field, duration, ..
            } => {
                let len = read_len(reader)?;
                let values = decode_time_elems(reader, *duration, len)?;
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::ComplexField { field, plan: sub } => {
                let nested = decode_plan(compiled, *sub, reader)?;
                insert(plan, &mut msg, *field, Value::Struct(nested));
            }
            PlanOp::FixedComplexArray {
                field,
                plan: sub,
                length,
            } => {
                let mut values = Vec::with_capacity((*length).min(1024));
                for _ in 0..*length {
                    values.push(Value::Struct(decode_plan(compiled, *sub, reader)?));
                }
                insert(plan, &mut msg, *field, Value::Array(values));
            }
            PlanOp::SeqComplexArray {
                field, plan: sub, ..
            } => {
                let len = read_len(reader)?;
                let mut values = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    values.push(Value::Struct(decode_plan(compiled, *sub, reader)?));
                }
                insert(plan, &mut msg, *field, Value::Array(values));
            }
        }
    }

    Ok(msg)
}

fn encode_plan<W: PayloadWriter>(
    compiled: &CompiledSchema,
    idx: usize,
    writer: &mut W,
    msg: &MessageValue,
) -> Result<()> {
    let plan = &compiled.plans[idx];

    for op in &plan.ops {
        match op {
            PlanOp::PrimRun { kind, fields } => {
                writer.align(kind.width())?;
                let le = writer.is_little_endian();
                for field in fields {
                    let value = get(plan, msg, *field)?;
                    let (buf, n) = encode_scalar(*kind, value, le, plan, *field)?;
                    writer.write_bytes(&buf[..n])?;
                }
            }
            PlanOp::StrField { field, wide } => {
                let value = get(plan, msg, *field)?;
                let s = value.as_str().ok_or_else(|| mismatch(plan, *field, "string"))?;
                if *wide {
                    writer.write_wstring(s)?;
                } else {
                    writer.write_string(s)?;
                }
            }
            PlanOp::TimeField { field } => {
                encode_time(writer, get(plan, msg, *field)?, plan, *field)?;
            }
            PlanOp::DurationField { field } => {
                encode_duration(writer, get(plan, msg, *field)?, plan, *field)?;
            }
            PlanOp::FixedPrimArray {
                field,
                kind,
                length,
            } => {
                let arr = get_array(plan, msg, *field)?;
                check_fixed_len(arr.len(), *length, plan, *field)?;
                encode_prim_slab(writer, *kind, arr, plan, *field)?;
            }
            PlanOp::SeqPrimArray { field, kind, bound } => {
                let arr = get_array(plan, msg, *field)?;
                check_bound(arr.len(), *bound, plan, *field)?;
                write_len(writer, arr.len())?;
                if !arr.is_empty() {
                    encode_prim_slab(writer, *kind, arr, plan, *field)?;
                }
            }
            PlanOp::FixedStrArray {
                field,
                wide,
                length,
            } => {
                let arr = get_array(plan, msg, *field)?;
                check_fixed_len(arr.len(), *length, plan, *field)?;
                encode_str_elems(writer, *wide, arr, plan, *field)?;
            }
            PlanOp::SeqStrArray { field, wide, bound } => {
                let arr = get_array(plan, msg, *field)?;
                check_bound(arr.len(), *bound, plan, *field)?;
                write_len(writer, arr.len())?;
                encode_str_elems(writer, *wide, arr, plan, *field)?;
            }
            PlanOp::FixedTimeArray {
                field,
                duration,
                length,
            } => {
                let arr = get_array(plan, msg, *field)?;
                check_fixed_len(arr.len(), *length, plan, *field)?;
                encode_time_elems(writer, *duration, arr, plan, *field)?;
            }
            PlanOp::SeqTimeArray {
                field,
                duration,
                bound,
            } => {
                let arr = get_array(plan, msg, *field)?;
                check_bound(arr.len(), *bound, plan, *field)?;
                write_len(writer, arr.len())?;
                encode_time_elems(writer, *duration, arr, plan, *field)?;
            }
            PlanOp::ComplexField { field, plan: sub } => {
                let value = get(plan, msg, *field)?;
                let nested = value
                    .as_struct()
                    .ok_or_else(|| mismatch(plan, *field, "struct"))?;
                encode_plan(compiled, *sub, writer, nested)?;
            }
            PlanOp::FixedComplexArray {
                field,
                plan: sub,
                length,
            } => {
                let arr = get_array(plan, msg, *field)?;
                check_fixed_len(arr.len(), *length, plan, *field)?;
                for item in arr {
                    let nested = item
                        .as_struct()
                        .ok_or_else(|| mismatch(plan, *field, "struct"))?;
                    encode_plan(compiled, *sub, writer, nested)?;
                }
            }
            PlanOp::SeqComplexArray {
                field,
                plan: sub,
                bound,
            } => {
                let arr = get_array(plan, msg, *field)?;
                check_bound(arr.len(), *bound, plan, *field)?;
                write_len(writer, arr.len())?;
                for item in arr {
                    let nested = item
                        .as_struct()
                        .ok_or_else(|| mismatch(plan, *field, "struct"))?;
                    encode_plan(compiled, *sub, writer, nested)?;
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Scalars

fn decode_scalar(kind: PrimitiveType, bytes: &[u8], le: bool) -> Value {
    macro_rules! rd {
        ($fn:ident) => {
            if le {
                LittleEndian::$fn(bytes)
            } else {
                BigEndian::$fn(bytes)
            }
        };
    }
    match kind {
        PrimitiveType::Bool => Value::Bool(bytes[0] != 0),
        PrimitiveType::Int8 => Value::Int8(bytes[0] as i8),
        PrimitiveType::UInt8 | PrimitiveType::Byte | PrimitiveType::Char => Value::UInt8(bytes[0]),
        PrimitiveType::Int16 => Value::Int16(rd!(read_i16)),
        PrimitiveType::UInt16 => Value::UInt16(rd!(read_u16)),
        PrimitiveType::Int32 => Value::Int32(rd!(read_i32)),
        PrimitiveType::UInt32 => Value::UInt32(rd!(read_u32)),
        PrimitiveType::Int64 => Value::Int64(rd!(read_i64)),
        PrimitiveType::UInt64 => Value::UInt64(rd!(read_u64)),
        PrimitiveType::Float32 => Value::Float32(rd!(read_f32)),
        PrimitiveType::Float64 => Value::Float64(rd!(read_f64)),
    }
}

fn encode_scalar(
    kind: PrimitiveType,
    value: &Value,
    le: bool,
    plan: &TypePlan,
    field: u32,
) -> Result<([u8; 8], usize)> {
    let mut buf = [0u8; 8];
    macro_rules! wr {
        ($fn:ident, $v:expr, $n:expr) => {{
            if le {
                LittleEndian::$fn(&mut buf, $v);
            } else {
                BigEndian::$fn(&mut buf, $v);
            }
            $n
        }};
    }
    let int = |v: &Value| v.as_i64().ok_or_else(|| mismatch(plan, field, kind.as_str()));
    let n = match kind {
        PrimitiveType::Bool => {
            buf[0] = match value {
                Value::Bool(b) => *b as u8,
                _ => return Err(mismatch(plan, field, "bool")),
            };
            1
        }
        PrimitiveType::Int8 => {
            buf[0] = cast_int(int(value)?, i8::MIN as i64, i8::MAX as i64, plan, field)? as u8;
            1
        }
        PrimitiveType::UInt8 | PrimitiveType::Byte | PrimitiveType::Char => {
            buf[0] = cast_int(int(value)?, 0, u8::MAX as i64, plan, field)? as u8;
            1
        }
        PrimitiveType::Int16 => wr!(
            write_i16,
            cast_int(int(value)?, i16::MIN as i64, i16::MAX as i64, plan, field)? as i16,
            2
        ),
        PrimitiveType::UInt16 => wr!(
            write_u16,
            cast_int(int(value)?, 0, u16::MAX as i64, plan, field)? as u16,
            2
        ),
        PrimitiveType::Int32 => wr!(
            write_i32,
            cast_int(int(value)?, i32::MIN as i64, i32::MAX as i64, plan, field)? as i32,
            4
        ),
        PrimitiveType::UInt32 => wr!(
            write_u32,
            cast_int(int(value)?, 0, u32::MAX as i64, plan, field)? as u32,
            4
        ),
        PrimitiveType::Int64 => wr!(write_i64, int(value)?, 8),
        PrimitiveType::UInt64 => {
            let v = match value {
                Value::UInt64(v) => *v,
                other => cast_int(int(other)?, 0, i64::MAX, plan, field)? as u64,
            };
            wr!(write_u64, v, 8)
        }
        PrimitiveType::Float32 => wr!(
            write_f32,
            match value {
                Value::Float32(v) => *v,
                other => other
                    .as_f64()
                    .ok_or_else(|| mismatch(plan, field, "float32"))? as f32,
            },
            4
        ),
        PrimitiveType::Float64 => wr!(
            write_f64,
            value
                .as_f64()
                .ok_or_else(|| mismatch(plan, field, "float64"))?,
            8
        ),
    };
    Ok((buf, n))
}

fn cast_int(v: i64, min: i64, max: i64, plan: &TypePlan, field: u32) -> Result<i64> {
    if v < min || v > max {
        Err(CodecError::encode(
            "message",
            format!(
                "value {v} out of range for field '{}' of {}",
                plan.field_names[field as usize], plan.type_name
            ),
        ))
    } else {
        Ok(v)
    }
}

// ---------------------------------------------------------------------------
// Bulk primitive transfers

fn decode_prim_slab<R: PayloadReader>(
    reader: &mut R,
    kind: PrimitiveType,
    len: usize,
) -> Result<Vec<Value>> {
    let width = kind.width();
    if len > MAX_ARRAY_LENGTH || len.saturating_mul(width) > reader.remaining() {
        return Err(CodecError::buffer_too_short(
            len * width,
            reader.remaining(),
            reader.position(),
        ));
    }
    if width > 1 {
        reader.align(width)?;
    }
    let le = reader.is_little_endian();
    let bytes = reader.read_bytes(len * width)?;
    Ok(bytes
        .chunks_exact(width)
        .map(|chunk| decode_scalar(kind, chunk, le))
        .collect())
}

fn encode_prim_slab<W: PayloadWriter>(
    writer: &mut W,
    kind: PrimitiveType,
    arr: &[Value],
    plan: &TypePlan,
    field: u32,
) -> Result<()> {
    if kind.width() > 1 {
        writer.align(kind.width())?;
    }
    let le = writer.is_little_endian();
    for item in arr {
        let (buf, n) = encode_scalar(kind, item, le, plan, field)?;
        writer.write_bytes(&buf[..n])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Strings, time, duration

fn decode_str_elems<R: PayloadReader>(
    reader: &mut R,
    wide: bool,
    len: usize,
) -> Result<Vec<Value>> {
    if len > MAX_ARRAY_LENGTH {
        return Err(CodecError::buffer_too_short(len, reader.remaining(), reader.position()));
    }
    let mut values = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        let s = if wide {
            reader.read_wstring()?
        } else {
            reader.read_string()?
        };
        values.push(Value::String(s));
    }
    Ok(values)
}

fn encode_str_elems<W: PayloadWriter>(
    writer: &mut W,
    wide: bool,
    arr: &[Value],
    plan: &TypePlan,
    field: u32,
) -> Result<()> {
    for item in arr {
        let s = item.as_str().ok_or_else(|| mismatch(plan, field, "string"))?;
        if wide {
            writer.write_wstring(s)?;
        } else {
            writer.write_string(s)?;
        }
    }
    Ok(())
}

fn decode_time<R: PayloadReader>(reader: &mut R) -> Result<Value> {
    reader.align(4)?;
    let le = reader.is_little_endian();
    let bytes = reader.read_bytes(8)?;
    let (secs, nsecs) = if le {
        (LittleEndian::read_u32(&bytes[..4]), LittleEndian::read_u32(&bytes[4..]))
    } else {
        (BigEndian::read_u32(&bytes[..4]), BigEndian::read_u32(&bytes[4..]))
    };
    Ok(Value::Time { secs, nsecs })
}

fn decode_duration<R: PayloadReader>(reader: &mut R) -> Result<Value> {
    reader.align(4)?;
    let le = reader.is_little_endian();
    let bytes = reader.read_bytes(8)?;
    let (secs, nsecs) = if le {
        (LittleEndian::read_i32(&bytes[..4]), LittleEndian::read_i32(&bytes[4..]))
    } else {
        (BigEndian::read_i32(&bytes[..4]), BigEndian::read_i32(&bytes[4..]))
    };
    Ok(Value::Duration { secs, nsecs })
}

fn decode_time_elems<R: PayloadReader>(
    reader: &mut R,
    duration: bool,
    len: usize,
) -> Result<Vec<Value>> {
    if len > MAX_ARRAY_LENGTH {
        return Err(CodecError::buffer_too_short(len, reader.remaining(), reader.position()));
    }
    let mut values = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        values.push(if duration {
            decode_duration(reader)?
        } else {
            decode_time(reader)?
        });
    }
    Ok(values)
}

fn encode_time<W: PayloadWriter>(
    writer: &mut W,
    value: &Value,
    plan: &TypePlan,
    field: u32,
) -> Result<()> {
    let (secs, nsecs) = match value {
        Value::Time { secs, nsecs } => (*secs, *nsecs),
        _ => return Err(mismatch(plan, field, "time")),
    };
    writer.align(4)?;
    let mut buf = [0u8; 8];
    if writer.is_little_endian() {
        LittleEndian::write_u32(&mut buf[..4], secs);
        LittleEndian::write_u32(&mut buf[4..], nsecs);
    } else {
        BigEndian::write_u32(&mut buf[..4], secs);
        BigEndian::write_u32(&mut buf[4..], nsecs);
    }
    writer.write_bytes(&buf)
}

fn encode_duration<W: PayloadWriter>(
    writer: &mut W,
    value: &Value,
    plan: &TypePlan,
    field: u32,
) -> Result<()> {
    let (secs, nsecs) = match value {
        Value::Duration { secs, nsecs } => (*secs, *nsecs),
        _ => return Err(mismatch(plan, field, "duration")),
    };
    writer.align(4)?;
    let mut buf = [0u8; 8];
    if writer.is_little_endian() {
        LittleEndian::write_i32(&mut buf[..4], secs);
        LittleEndian::write_i32(&mut buf[4..], nsecs);
    } else {
        BigEndian::write_i32(&mut buf[..4], secs);
        BigEndian::write_i32(&mut buf[4..], nsecs);
    }
    writer.write_bytes(&buf)
}

fn encode_time_elems<W: PayloadWriter>(
    writer: &mut W,
    duration: bool,
    arr: &[Value],
    plan: &TypePlan,
    field: u32,
) -> Result<()> {
    for item in arr {
        if duration {
            encode_duration(writer, item, plan, field)?;
        } else {
            encode_time(writer, item, plan, field)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sequence lengths and field access

fn read_len<R: PayloadReader>(reader: &mut R) -> Result<usize> {
    reader.align(4)?;
    let le = reader.is_little_endian();
    let bytes = reader.read_bytes(4)?;
    let len = if le {
        LittleEndian::read_u32(bytes)
    } else {
        BigEndian::read_u32(bytes)
    } as usize;
    if len > MAX_ARRAY_LENGTH {
        return Err(CodecError::encode(
            "message",
            format!("sequence length {len} exceeds maximum {MAX_ARRAY_LENGTH}"),
        ));
    }
    Ok(len)
}

fn write_len<W: PayloadWriter>(writer: &mut W, len: usize) -> Result<()> {
    writer.align(4)?;
    let mut buf = [0u8; 4];
    if writer.is_little_endian() {
        LittleEndian::write_u32(&mut buf, len as u32);
    } else {
        BigEndian::write_u32(&mut buf, len as u32);
    }
    writer.write_bytes(&buf)
}

fn insert(plan: &TypePlan, msg: &mut MessageValue, field: u32, value: Value) {
    msg.insert(plan.field_names[field as usize].clone(), value);
}

fn get<'m>(plan: &TypePlan, msg: &'m MessageValue, field: u32) -> Result<&'m Value> {
    let name = &plan.field_names[field as usize];
    msg.get(name).ok_or_else(|| {
        CodecError::encode(
            "message",
            format!("missing field '{name}' for {}", plan.type_name),
        )
    })
}

fn get_array<'m>(plan: &TypePlan, msg: &'m MessageValue, field: u32) -> Result<&'m [Value]> {
    get(plan, msg, field)?
        .as_array()
        .ok_or_else(|| mismatch(plan, field, "array"))
}

fn check_fixed_len(actual: usize, expected: usize, plan: &TypePlan, field: u32) -> Result<()> {
    if actual != expected {
        return Err(CodecError::encode(
            "message",
            format!(
                "fixed array field '{}' of {} expects {expected} elements, got {actual}",
                plan.field_names[field as usize], plan.type_name
            ),
        ));
    }
    Ok(())
}

fn check_bound(actual: usize, bound: Option<usize>, plan: &TypePlan, field: u32) -> Result<()> {
    if let Some(bound) = bound {
        if actual > bound {
            return Err(CodecError::encode(
                "message",
                format!(
                    "bounded array field '{}' of {} exceeds bound {bound} with {actual} elements",
                    plan.field_names[field as usize], plan.type_name
                ),
            ));
        }
    }
    Ok(())
}

fn mismatch(plan: &TypePlan, field: u32, expected: &str) -> CodecError {
    CodecError::encode(
        "message",
        format!(
            "field '{}' of {} expects a {expected} value",
            plan.field_names[field as usize], plan.type_name
        ),
    )
}
