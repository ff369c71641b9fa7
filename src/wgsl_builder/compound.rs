//! Programs that apply a compound assignment (`+=`, `<<=`, ...) per case.

use gllm_value_model::ValueType;

use super::common::{
    case_loop, entry_point, from_storage, header, input_declaration, output_declaration,
    to_storage,
};
use crate::error::EngineResult;
use crate::types::{Case, InputSource};

/// Operand types must already be validated: two parameters, the result
/// equal to the left one, no abstract kinds.
pub(super) fn build(
    op: &str,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    source: InputSource,
) -> EngineResult<String> {
    let lhs_ty = &parameter_types[0];
    let rhs_ty = &parameter_types[1];

    let mut program = header(parameter_types, result_type);
    program.push_str(&output_declaration(result_type, cases.len())?);
    program.push('\n');

    if source == InputSource::Const {
        let body: String = cases
            .iter()
            .enumerate()
            .map(|(i, case)| {
                format!(
                    "  var ret_{i} = {lhs_ty}({lhs});\n  ret_{i} {op} {rhs};\n  outputs[{i}].value = {store};\n",
                    lhs = case.inputs[0].wgsl(),
                    rhs = case.inputs[1].wgsl(),
                    store = to_storage(result_type, &format!("ret_{i}")),
                )
            })
            .collect();
        program.push_str(&entry_point(&body));
        return Ok(program);
    }

    let members = [("lhs".to_string(), lhs_ty), ("rhs".to_string(), rhs_ty)];
    program.push_str(&input_declaration(&members, source, cases.len())?);
    program.push('\n');

    let body = format!(
        "    var ret = {lhs_ty}({lhs});\n    ret {op} {rhs_ty}({rhs});\n    outputs[i].value = {store};\n",
        lhs = from_storage(lhs_ty, "inputs[i].lhs"),
        rhs = from_storage(rhs_ty, "inputs[i].rhs"),
        store = to_storage(result_type, "ret"),
    );
    program.push_str(&entry_point(&case_loop(cases.len(), &body)));
    Ok(program)
}
