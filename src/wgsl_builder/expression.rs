//! Programs that evaluate one expression per case.

use std::fmt;
use std::sync::Arc;

use gllm_value_model::ValueType;

use super::common::{
    case_loop, entry_point, from_storage, header, input_declaration, output_declaration,
    to_storage,
};
use super::SynthesisOptions;
use crate::error::EngineResult;
use crate::types::{Case, InputSource};

type ExpressionFn = dyn Fn(&[String]) -> String + Send + Sync;

/// Turns argument expressions into the expression under test.
#[derive(Clone)]
pub enum ExpressionBuilder {
    /// `name(a, b, ...)`
    Builtin(String),
    /// `(a op b)`
    BinaryOp(String),
    /// `op(a)`
    UnaryOp(String),
    Custom(Arc<ExpressionFn>),
}

impl ExpressionBuilder {
    pub fn custom(f: impl Fn(&[String]) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    #[must_use]
    pub fn apply(&self, args: &[String]) -> String {
        match self {
            Self::Builtin(name) => format!("{name}({})", args.join(", ")),
            Self::BinaryOp(op) => format!("({})", args.join(&format!(" {op} "))),
            Self::UnaryOp(op) => format!("{op}({})", args.join(", ")),
            Self::Custom(f) => f(args),
        }
    }
}

impl fmt::Debug for ExpressionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(name) => f.debug_tuple("Builtin").field(name).finish(),
            Self::BinaryOp(op) => f.debug_tuple("BinaryOp").field(op).finish(),
            Self::UnaryOp(op) => f.debug_tuple("UnaryOp").field(op).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub(super) fn build(
    expr: &ExpressionBuilder,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    source: InputSource,
    options: SynthesisOptions,
) -> EngineResult<String> {
    let mut program = header(parameter_types, result_type);
    program.push_str(&output_declaration(result_type, cases.len())?);
    program.push('\n');

    if source == InputSource::Const {
        program.push_str(&const_body(expr, parameter_types, result_type, cases, options));
        return Ok(program);
    }

    let members: Vec<(String, &ValueType)> = parameter_types
        .iter()
        .enumerate()
        .map(|(i, ty)| (format!("param{i}"), ty))
        .collect();
    program.push_str(&input_declaration(&members, source, cases.len())?);
    program.push('\n');

    let args: Vec<String> = members
        .iter()
        .map(|(name, ty)| from_storage(ty, &format!("inputs[i].{name}")))
        .collect();
    let store = format!(
        "    outputs[i].value = {};\n",
        to_storage(result_type, &expr.apply(&args))
    );
    program.push_str(&entry_point(&case_loop(cases.len(), &store)));
    Ok(program)
}

fn const_body(
    expr: &ExpressionBuilder,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    options: SynthesisOptions,
) -> String {
    let case_expr = |case: &Case| {
        let args: Vec<String> = case.inputs.iter().map(|v| v.wgsl()).collect();
        expr.apply(&args)
    };

    // Abstract values cannot be stored in a `const` array of concrete type,
    // so each case is evaluated straight into its output slot.
    let is_abstract = parameter_types
        .iter()
        .chain(std::iter::once(result_type))
        .any(|ty| ty.element().is_abstract());
    if is_abstract {
        let body: String = cases
            .iter()
            .enumerate()
            .map(|(i, case)| {
                format!(
                    "  outputs[{i}].value = {};\n",
                    to_storage(result_type, &case_expr(case))
                )
            })
            .collect();
        return entry_point(&body);
    }

    let values: Vec<String> = cases.iter().map(|case| format!("  {}", case_expr(case))).collect();
    let mut program = format!("const values = array(\n{}\n);\n\n", values.join(",\n"));
    let body = if options.unroll_const_loops {
        (0..cases.len())
            .map(|i| {
                format!(
                    "  outputs[{i}].value = {};\n",
                    to_storage(result_type, &format!("values[{i}]"))
                )
            })
            .collect()
    } else {
        let store = format!(
            "    outputs[i].value = {};\n",
            to_storage(result_type, "values[i]")
        );
        case_loop(cases.len(), &store)
    };
    program.push_str(&entry_point(&body));
    program
}
