use domain::{DomainError, ErrorKind, Result};
use store::UnitOfWork;

/// Commits `tx` if `result` is a success, otherwise rolls it back.
///
/// A failed rollback is logged and the original error returned; the store
/// discards the transaction's writes either way.
pub(crate) async fn settle<S, T>(store: &S, tx: S::Tx, result: Result<T>) -> Result<T>
where
    S: UnitOfWork,
{
    match result {
        Ok(value) => {
            store.commit(tx).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback(tx).await {
                tracing::warn!(error = %rollback_err, cause = %e, "rollback failed");
            }
            if e.kind() == ErrorKind::VersionMismatch {
                metrics::counter!("inventory_version_conflicts_total").increment(1);
            }
            Err(e)
        }
    }
}

/// Records the outcome of one business operation.
pub(crate) fn observe<T>(operation: &'static str, started: std::time::Instant, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().code(),
    };
    metrics::histogram!("fulfillment_duration_seconds", "operation" => operation, "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        log_failure(operation, e);
    }
}

fn log_failure(operation: &'static str, e: &DomainError) {
    if e.kind() == ErrorKind::DbDown {
        tracing::error!(operation, error = %e, "operation failed");
    } else {
        tracing::info!(operation, code = e.kind().code(), error = %e, "operation rejected");
    }
}
