//! WGSL fragments shared by both builder families.

use gllm_value_model::{ScalarKind, ValueType};

use crate::error::EngineResult;
use crate::layout::stride_of;
use crate::types::InputSource;

/// `enable f16;` when any involved type has an `f16` element.
pub(crate) fn header(parameter_types: &[ValueType], result_type: &ValueType) -> String {
    let uses_f16 = parameter_types
        .iter()
        .chain(std::iter::once(result_type))
        .any(|ty| ty.element() == ScalarKind::F16);
    if uses_f16 {
        "enable f16;\n\n".to_string()
    } else {
        String::new()
    }
}

/// WGSL spelling of the type a value of `ty` is carried as in a buffer.
pub(crate) fn storage_type_name(ty: &ValueType) -> String {
    ty.storage_type().to_string()
}

/// Convert an expression of type `ty` to its storage type.
pub(crate) fn to_storage(ty: &ValueType, expr: &str) -> String {
    match ty {
        ValueType::Scalar(ScalarKind::Bool) => format!("select(0u, 1u, {expr})"),
        ValueType::Vector {
            width,
            element: ScalarKind::Bool,
        } => format!("select(vec{width}<u32>(0u), vec{width}<u32>(1u), {expr})"),
        _ => expr.to_string(),
    }
}

/// Convert an expression loaded from a buffer back to type `ty`.
///
/// The comparison is parenthesized: WGSL does not chain relational operators.
pub(crate) fn from_storage(ty: &ValueType, expr: &str) -> String {
    match ty {
        ValueType::Scalar(ScalarKind::Bool) => format!("({expr} != 0u)"),
        ValueType::Vector {
            width,
            element: ScalarKind::Bool,
        } => format!("({expr} != vec{width}<u32>(0u))"),
        _ => expr.to_string(),
    }
}

/// `name : T` followed by pad members filling the record slot out to
/// `stride_of(ty)`.
///
/// Padding is spelled out as members; the GL backend ignores `@size`.
pub(crate) fn padded_member(name: &str, ty: &ValueType) -> EngineResult<String> {
    let stride = stride_of(ty)?;
    let mut member = format!("  {name} : {},\n", storage_type_name(ty));
    let mut remaining = stride.saturating_sub(ty.storage_type().byte_size());
    let mut pads = 0usize;
    // f16 payloads leave a 2-byte hole before the next 4-byte boundary.
    if remaining % 4 == 2 {
        member.push_str(&format!("  {name}_pad{pads} : f16,\n"));
        remaining -= 2;
        pads += 1;
    }
    for _ in 0..remaining / 4 {
        member.push_str(&format!("  {name}_pad{pads} : u32,\n"));
        pads += 1;
    }
    Ok(member)
}

/// `Output` record and the binding-0 output array of `count` records.
pub(crate) fn output_declaration(result_type: &ValueType, count: usize) -> EngineResult<String> {
    let value = padded_member("value", result_type)?;
    Ok(format!(
        r#"struct Output {{
{value}}}
@group(0) @binding(0) var<storage, read_write> outputs : array<Output, {count}>;
"#
    ))
}

/// `Input` record with one member per `(name, type)` and the binding-1
/// input array declared in the address space selected by `source`.
pub(crate) fn input_declaration(
    members: &[(String, &ValueType)],
    source: InputSource,
    count: usize,
) -> EngineResult<String> {
    let mut decl = String::from("struct Input {\n");
    for (name, ty) in members {
        decl.push_str(&padded_member(name, ty)?);
    }
    decl.push_str("}\n");
    let space = match source {
        InputSource::Uniform => "uniform",
        InputSource::StorageReadWrite => "storage, read_write",
        InputSource::StorageRead | InputSource::Const => "storage, read",
    };
    decl.push_str(&format!(
        "@group(0) @binding(1) var<{space}> inputs : array<Input, {count}>;\n"
    ));
    Ok(decl)
}

/// Wrap `body` in the single-invocation entry point.
pub(crate) fn entry_point(body: &str) -> String {
    format!("@compute @workgroup_size(1)\nfn main() {{\n{body}}}\n")
}

/// `for` loop over every case index of the batch.
pub(crate) fn case_loop(count: usize, body: &str) -> String {
    format!("  for (var i = 0u; i < {count}u; i++) {{\n{body}  }}\n")
}
