//! WGSL program synthesis.
//!
//! A builder turns (parameter types, result type, cases, input source) into
//! the full source of a single-workgroup compute program that writes one
//! output record per case. Synthesis is a pure function of its inputs, so
//! identical batches produce byte-identical source and share a program.

mod common;
mod compound;
mod expression;

pub use expression::ExpressionBuilder;

use gllm_value_model::ValueType;

use crate::error::{EngineError, EngineResult};
use crate::layout::stride_of;
use crate::types::{Case, InputSource};

/// Knobs that change the emitted source without changing its meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Const mode: one store statement per case instead of a loop.
    pub unroll_const_loops: bool,
}

/// Program family used to evaluate an operation.
#[derive(Debug, Clone)]
pub enum ShaderBuilder {
    /// Evaluate an expression of the inputs.
    Expression(ExpressionBuilder),
    /// Apply `lhs op rhs` to a copy of the left operand, e.g. `+=`.
    CompoundAssignment(String),
}

impl ShaderBuilder {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Expression(ExpressionBuilder::Builtin(name.into()))
    }

    pub fn binary_op(op: impl Into<String>) -> Self {
        Self::Expression(ExpressionBuilder::BinaryOp(op.into()))
    }

    pub fn unary_op(op: impl Into<String>) -> Self {
        Self::Expression(ExpressionBuilder::UnaryOp(op.into()))
    }

    pub fn compound(op: impl Into<String>) -> Self {
        Self::CompoundAssignment(op.into())
    }

    /// Check that this builder can synthesize a program for the signature
    /// in the given input mode.
    pub fn validate(
        &self,
        parameter_types: &[ValueType],
        result_type: &ValueType,
        source: InputSource,
    ) -> EngineResult<()> {
        for ty in parameter_types.iter().chain(std::iter::once(result_type)) {
            stride_of(ty)?;
        }

        if let Self::CompoundAssignment(op) = self {
            if parameter_types.len() != 2 {
                return Err(EngineError::InvalidInput(format!(
                    "compound assignment `{op}` takes exactly two parameters, got {}",
                    parameter_types.len()
                )));
            }
            if result_type != &parameter_types[0] {
                return Err(EngineError::InvalidInput(format!(
                    "compound assignment `{op}` must return its left operand type {}, got {result_type}",
                    parameter_types[0]
                )));
            }
            if parameter_types.iter().any(|ty| ty.element().is_abstract()) {
                return Err(EngineError::InvalidInput(format!(
                    "compound assignment `{op}` cannot take abstract operands"
                )));
            }
        }

        if source.is_buffer() {
            if parameter_types.is_empty() {
                return Err(EngineError::InvalidInput(format!(
                    "{source} input source needs at least one parameter"
                )));
            }
            if let Some(ty) = parameter_types
                .iter()
                .chain(std::iter::once(result_type))
                .find(|ty| ty.element().is_abstract())
            {
                return Err(EngineError::InvalidInput(format!(
                    "{ty} values cannot be carried through a {source} buffer"
                )));
            }
        }
        Ok(())
    }

    /// Full WGSL source evaluating `cases`.
    pub fn build(
        &self,
        parameter_types: &[ValueType],
        result_type: &ValueType,
        cases: &[Case],
        source: InputSource,
        options: SynthesisOptions,
    ) -> EngineResult<String> {
        self.validate(parameter_types, result_type, source)?;
        if cases.is_empty() {
            return Err(EngineError::InvalidInput("cannot build a program for zero cases".into()));
        }
        if source == InputSource::Const {
            if let Some(i) = cases
                .iter()
                .position(|case| case.inputs.len() != parameter_types.len())
            {
                return Err(EngineError::InvalidInput(format!(
                    "case {i} has {} inputs, expected {}",
                    cases[i].inputs.len(),
                    parameter_types.len()
                )));
            }
        }
        match self {
            Self::Expression(expr) => {
                expression::build(expr, parameter_types, result_type, cases, source, options)
            }
            Self::CompoundAssignment(op) => {
                compound::build(op, parameter_types, result_type, cases, source)
            }
        }
    }
}
