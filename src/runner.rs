//! Run orchestration: validation, optional packing, batching, flight
//! control and verdict aggregation.

use std::sync::Arc;

use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use gllm_value_model::ValueType;

use crate::error::{EngineError, EngineResult};
use crate::executor::{BatchExecutor, BatchRequest};
use crate::flight::{Admission, FlightController};
use crate::gpu::ExecutionDevice;
use crate::layout::{batch_capacity, partition};
use crate::packing::{pack_scalars_to_vector, PackedCases};
use crate::program_cache::ProgramCache;
use crate::types::{Case, RunConfig};
use crate::validation::validate_definition;
use crate::verify::{BatchReport, FailureRecord};
use crate::wgsl_builder::{ShaderBuilder, SynthesisOptions};

/// Mismatches of one batch.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub batch_index: usize,
    /// Index of the batch's first case in the executed case list.
    pub first_case: usize,
    pub records: Vec<FailureRecord>,
}

impl BatchFailure {
    pub fn diagnostic(&self) -> String {
        self.records
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of a [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Cases executed, after packing.
    pub total_cases: usize,
    pub batches: usize,
    /// Failing batches in batch order.
    pub failures: Vec<BatchFailure>,
    pub programs_compiled: usize,
    pub program_cache_hits: usize,
    pub peak_in_flight: usize,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.iter().map(|f| f.records.len()).sum()
    }

    /// Every failure record of the run, grouped by batch.
    pub fn diagnostic(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("batch {}:\n{}", f.batch_index, f.diagnostic()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `Err(EngineError::Verification)` if any batch failed.
    pub fn into_result(self) -> EngineResult<RunReport> {
        if self.passed() {
            return Ok(self);
        }
        Err(EngineError::Verification {
            failed_batches: self.failures.len(),
            diagnostic: self.diagnostic(),
        })
    }

    fn record(&mut self, batch_index: usize, first_case: usize, report: BatchReport) {
        if report.passed() {
            log::trace!("batch {batch_index}: {} cases passed", report.case_count);
            return;
        }
        log::warn!(
            "batch {batch_index}: {} of {} cases failed\n{}",
            report.failures.len(),
            report.case_count,
            report.diagnostic()
        );
        self.failures.push(BatchFailure {
            batch_index,
            first_case,
            records: report.failures,
        });
    }
}

type BatchOutcome = EngineResult<(usize, usize, BatchReport)>;

/// Evaluate every case of an operation on `device`.
///
/// Configuration errors are returned before anything is dispatched. Device
/// errors abort the run. Verification mismatches never stop the run; they
/// are collected into the report (see [`RunReport::into_result`]).
pub async fn run<D: ExecutionDevice>(
    device: &D,
    builder: &ShaderBuilder,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    config: &RunConfig,
) -> EngineResult<RunReport> {
    let source = config.input_source;
    validate_definition(builder, parameter_types, result_type, cases, source)?;

    let packed: Option<PackedCases> = match config.vectorize {
        Some(width) => {
            let packed = pack_scalars_to_vector(parameter_types, result_type, cases, width)?;
            builder.validate(&packed.parameter_types, &packed.result_type, source)?;
            log::debug!(
                "packed {} cases into {} vec{} cases",
                cases.len(),
                packed.cases.len(),
                width.lanes()
            );
            Some(packed)
        }
        None => None,
    };
    let (parameter_types, result_type, cases) = match &packed {
        Some(p) => (p.parameter_types.as_slice(), &p.result_type, p.cases.as_slice()),
        None => (parameter_types, result_type, cases),
    };

    let derived = batch_capacity(source, parameter_types, result_type, &device.limits())?;
    let capacity = match config.batch_size {
        Some(0) => {
            return Err(EngineError::InvalidInput("batch size must be positive".into()));
        }
        Some(requested) if requested > derived => {
            log::debug!("batch size {requested} clamped to device capacity {derived}");
            derived
        }
        Some(requested) => requested,
        None => derived,
    };

    let mut report = RunReport {
        total_cases: cases.len(),
        ..RunReport::default()
    };
    if cases.is_empty() {
        return Ok(report);
    }
    log::debug!(
        "{} cases on {} via {source}: batches of up to {capacity}",
        cases.len(),
        device.name()
    );

    let flight = FlightController::new(config.max_batches_in_flight);
    let executor = BatchExecutor::new(device, Arc::clone(&config.heartbeat));
    let options = SynthesisOptions {
        unroll_const_loops: config.unroll_const_loops,
    };
    let mut cache = ProgramCache::new();
    let mut pending: FuturesUnordered<LocalBoxFuture<'_, BatchOutcome>> = FuturesUnordered::new();

    for (batch_index, batch) in partition(cases, capacity)?.enumerate() {
        let permit = loop {
            match flight.admit()? {
                Admission::Granted(permit) => break permit,
                Admission::Blocked(mut signal) => loop {
                    futures::select! {
                        _ = signal => break,
                        outcome = pending.select_next_some() => {
                            let (index, first, batch_report) = outcome?;
                            report.record(index, first, batch_report);
                        }
                        complete => {
                            return Err(EngineError::FlightControl(
                                "blocked with no batch outstanding".into(),
                            ));
                        }
                    }
                },
            }
        };

        let request = BatchRequest {
            builder,
            parameter_types,
            result_type,
            cases: batch,
            input_source: source,
            options,
        };
        let dispatched = executor.submit_batch(&request, &mut cache)?;
        report.batches += 1;
        let first_case = batch_index * capacity;
        pending.push(
            async move {
                let verdict = dispatched.verify().await;
                drop(permit);
                verdict.map(|r| (batch_index, first_case, r))
            }
            .boxed_local(),
        );
    }

    while let Some(outcome) = pending.next().await {
        let (index, first, batch_report) = outcome?;
        report.record(index, first, batch_report);
    }

    report.failures.sort_by_key(|f| f.batch_index);
    report.programs_compiled = cache.misses();
    report.program_cache_hits = cache.hits();
    report.peak_in_flight = flight.peak_in_flight();
    log::info!(
        "{} cases in {} batches: {} failing batches, {} programs compiled, {} cache hits, peak {} in flight",
        report.total_cases,
        report.batches,
        report.failures.len(),
        report.programs_compiled,
        report.program_cache_hits,
        report.peak_in_flight
    );
    Ok(report)
}

/// [`run`] driven to completion on the current thread.
pub fn run_blocking<D: ExecutionDevice>(
    device: &D,
    builder: &ShaderBuilder,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    config: &RunConfig,
) -> EngineResult<RunReport> {
    pollster::block_on(run(device, builder, parameter_types, result_type, cases, config))
}
