//! Polyphase run reduction.
//!
//! Run generation may put several runs on the same tape, while the final merge expects every tape to hold a single
//! sorted sequence. Polyphase reduction merges runs across tapes until that holds. Run counts are first brought to a
//! perfect polyphase distribution (see [`polyphase_distribution`]): surplus runs are moved to the tapes holding
//! fewer runs than their share and the remaining shortfall is made up with dummy runs. On every phase one run is
//! taken from each input tape, the runs are merged onto the empty tape and this repeats until one of the input tapes
//! runs dry. The exhausted tape becomes the output of the next phase.

use std::cmp::Reverse;
use std::io;

use crate::codec::{CodecError, RecordCodec};
use crate::distribution::polyphase_distribution;
use crate::merger::Merger;
use crate::tape::Tape;

/// Polyphase reduction statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReductionSummary {
    /// Number of merge phases performed.
    pub phases: u64,
    /// Number of runs produced by merge phases, dummy runs included.
    pub merged_runs: u64,
    /// Number of records written by merge phases.
    pub merged_records: u64,
    /// Number of times run counts had to be brought back to a polyphase distribution.
    pub rebalances: u64,
    /// Number of runs copied between tapes while rebalancing.
    pub moved_runs: u64,
}

fn invalid_input(msg: String) -> CodecError {
    CodecError::IO(io::Error::new(io::ErrorKind::InvalidInput, msg))
}

/// Merges runs between tapes until every tape holds at most one run.
/// At least one tape must be empty on entry, it becomes the output of the first phase.
pub fn reduce<C: RecordCodec>(tapes: &mut [Tape<C>]) -> Result<ReductionSummary, CodecError> {
    let mut summary = ReductionSummary::default();

    while tapes.iter().any(|tape| tape.run_count() > 1) {
        if tapes.len() < 3 {
            return Err(invalid_input("polyphase merge requires at least 3 tapes".into()));
        }

        let output = tapes
            .iter()
            .rposition(Tape::is_empty)
            .ok_or_else(|| invalid_input("no empty tape left for merge output".into()))?;
        let inputs = Vec::from_iter((0..tapes.len()).filter(|&idx| idx != output));

        let runs: u64 = inputs.iter().map(|&idx| tapes[idx].run_count() as u64).sum();
        let shares = polyphase_distribution(inputs.len(), runs).map_err(|err| invalid_input(err.to_string()))?;

        let mut counts = Vec::from_iter(inputs.iter().map(|&idx| tapes[idx].run_count() as u64));
        counts.sort_by_key(|&count| Reverse(count));
        if counts != shares {
            summary.moved_runs += rebalance(tapes, &inputs, &shares)?;
            summary.rebalances += 1;
        }

        let inputs = Vec::from_iter(inputs.into_iter().filter(|&idx| !tapes[idx].is_empty()));
        let (merged_runs, merged_records) = merge_phase(tapes, &inputs, output)?;
        summary.phases += 1;
        summary.merged_runs += merged_runs;
        summary.merged_records += merged_records;

        log::debug!(
            "phase {}: {} runs merged from tapes {:?} onto tape {}, runs left {:?}",
            summary.phases,
            merged_runs,
            Vec::from_iter(inputs.iter().map(|&idx| tapes[idx].index())),
            tapes[output].index(),
            Vec::from_iter(tapes.iter().map(Tape::run_count))
        );
    }

    return Ok(summary);
}

/// Moves runs between the input tapes so that their run counts match the distribution shares,
/// the tape holding most runs taking the largest share. Shortfalls are filled with dummy runs.
/// Returns the number of runs moved.
fn rebalance<C: RecordCodec>(tapes: &mut [Tape<C>], inputs: &[usize], shares: &[u64]) -> Result<u64, CodecError> {
    let mut order = inputs.to_vec();
    order.sort_by_key(|&idx| Reverse(tapes[idx].run_count()));
    let quotas = Vec::from_iter(order.into_iter().zip(shares.iter().copied()));

    for &(idx, _) in &quotas {
        if tapes[idx].is_empty() {
            tapes[idx].truncate()?;
        }
    }

    let mut moved = 0;
    for &(donor, quota) in &quotas {
        while tapes[donor].run_count() as u64 > quota {
            let receiver = quotas
                .iter()
                .find(|&&(idx, quota)| (tapes[idx].run_count() as u64) < quota)
                .map(|&(idx, _)| idx)
                .ok_or_else(|| invalid_input("distribution shares do not cover the tape runs".into()))?;

            let mut cursor = match tapes[donor].next_run()? {
                Some(cursor) => cursor,
                None => break,
            };
            tapes[receiver].append_run(&mut cursor)?;
            tapes[donor].restore(cursor);
            moved += 1;
        }
    }

    for &(idx, quota) in &quotas {
        let shortfall = quota.saturating_sub(tapes[idx].run_count() as u64);
        tapes[idx].prepend_dummy_runs(shortfall);
    }

    log::debug!(
        "{} runs moved, tape runs rebalanced to {:?}",
        moved,
        Vec::from_iter(quotas.iter().map(|&(idx, quota)| (tapes[idx].index(), quota)))
    );

    return Ok(moved);
}

/// Merges one run from every input onto the output tape until an input tape is exhausted.
/// Returns the number of runs and records written to the output.
fn merge_phase<C: RecordCodec>(
    tapes: &mut [Tape<C>],
    inputs: &[usize],
    output: usize,
) -> Result<(u64, u64), CodecError> {
    tapes[output].truncate()?;

    let mut merged_runs = 0;
    let mut merged_records = 0;
    loop {
        let mut cursors = Vec::with_capacity(inputs.len());
        for &idx in inputs {
            if let Some(cursor) = tapes[idx].next_run()? {
                cursors.push((idx, cursor));
            }
        }

        let (sources, cursors): (Vec<usize>, Vec<_>) = cursors.into_iter().unzip();
        let mut merger = Merger::new(cursors);
        merged_records += tapes[output].append_run(&mut merger)?;
        merged_runs += 1;

        for (idx, cursor) in sources.into_iter().zip(merger.into_sources()) {
            tapes[idx].restore(cursor);
        }

        if inputs.iter().any(|&idx| tapes[idx].is_empty()) {
            break;
        }
    }

    return Ok((merged_runs, merged_records));
}
