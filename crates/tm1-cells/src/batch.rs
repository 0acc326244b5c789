//! Chunked writes over a bounded worker pool.

use itertools::Itertools;
use parking_lot::Mutex;
use rayon::{prelude::*, ThreadPoolBuilder};
use tm1_core::{CellValue, InsensitiveTupleMap};
use tracing::{debug, info};

use crate::{service::CellService, write::WriteOptions, CellError, CellResult};

/// Splits `cells` into consecutive chunks of at most `slice_size` entries.
pub fn partition<V>(
    cells: InsensitiveTupleMap<V>,
    slice_size: usize,
) -> CellResult<Vec<InsensitiveTupleMap<V>>> {
    if slice_size == 0 {
        return Err(CellError::InvalidArgument(
            "slice size must be positive".to_string(),
        ));
    }
    let chunks = cells.into_iter().chunks(slice_size);
    let partitioned = chunks
        .into_iter()
        .map(|chunk| chunk.collect::<InsensitiveTupleMap<V>>())
        .collect();
    Ok(partitioned)
}

/// Folds per-chunk failures, already sorted by chunk index, into one error.
fn merge_failures(mut failures: Vec<(usize, CellError)>, attempts: usize) -> CellResult<()> {
    if failures.is_empty() {
        return Ok(());
    }
    if let Some(position) = failures.iter().position(|(_, e)| !e.is_write_failure()) {
        let (index, error) = failures.swap_remove(position);
        debug!(chunk = index, "chunk failed outside the write itself");
        return Err(error);
    }
    let mut statuses = Vec::new();
    let mut error_log_files = Vec::new();
    for (_, error) in failures {
        match error {
            CellError::TotalWriteFailure {
                statuses: s,
                error_log_files: l,
            }
            | CellError::PartialWriteFailure {
                statuses: s,
                error_log_files: l,
                ..
            } => {
                statuses.extend(s);
                error_log_files.extend(l);
            }
            _ => {}
        }
    }
    Err(CellError::PartialWriteFailure {
        statuses,
        error_log_files,
        attempts,
    })
}

/// Runs `write_chunk` on every chunk of `cells` with at most `max_workers`
/// chunks in flight.
///
/// Every chunk runs to completion whatever its siblings do. Failures are
/// reported in chunk order: write failures merged into one
/// [`CellError::PartialWriteFailure`], any other error returned as is.
pub fn write_batched<V, F>(
    cells: InsensitiveTupleMap<V>,
    slice_size: usize,
    max_workers: usize,
    write_chunk: F,
) -> CellResult<()>
where
    V: Send,
    F: Fn(usize, InsensitiveTupleMap<V>) -> CellResult<()> + Sync,
{
    if max_workers == 0 {
        return Err(CellError::InvalidArgument(
            "worker count must be positive".to_string(),
        ));
    }
    let chunks = partition(cells, slice_size)?;
    let attempts = chunks.len();
    let pool = ThreadPoolBuilder::new().num_threads(max_workers).build()?;
    let failures: Mutex<Vec<(usize, CellError)>> = Mutex::new(Vec::new());
    pool.install(|| {
        chunks
            .into_par_iter()
            .enumerate()
            .for_each(|(index, chunk)| {
                if let Err(e) = write_chunk(index, chunk) {
                    failures.lock().push((index, e));
                }
            });
    });
    let mut failures = failures.into_inner();
    failures.sort_by_key(|(index, _)| *index);
    info!(
        chunks = attempts,
        failed = failures.len(),
        workers = max_workers,
        "batched write finished"
    );
    merge_failures(failures, attempts)
}

impl CellService {
    /// Writes `cells` in chunks of `slice_size` through unbound processes,
    /// `max_workers` chunks at a time.
    ///
    /// Dimensions and measure types are resolved once up front, and the
    /// transaction-log bracket wraps the whole batch.
    pub fn write_async(
        &self,
        cube: &str,
        cells: InsensitiveTupleMap<CellValue>,
        slice_size: usize,
        max_workers: usize,
        options: &WriteOptions,
    ) -> CellResult<()> {
        let mut resolved = options.clone();
        let dimensions = self.dimensions_or_lookup(cube, options.dimensions.as_deref())?;
        if resolved.measure_element_types.is_none() {
            resolved.measure_element_types =
                Some(self.last_dimension_element_types(cube, &dimensions)?);
        }
        resolved.dimensions = Some(dimensions);
        resolved.deactivate_transaction_log = false;
        resolved.reactivate_transaction_log = false;
        self.with_transaction_log(
            cube,
            options.deactivate_transaction_log,
            options.reactivate_transaction_log,
            || {
                write_batched(cells, slice_size, max_workers, |index, chunk| {
                    debug!(cube, chunk = index, cells = chunk.len(), "writing chunk");
                    self.write_through_unbound_process(cube, &chunk, &resolved)
                })
            },
        )
    }
}
