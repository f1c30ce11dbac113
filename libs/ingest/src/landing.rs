use converge_api::Record;
use record_buffer::BufferSet;

use crate::catalog::KindCatalog;
use crate::error::LandingError;
use crate::stats::IngestStats;

/// Decode + append one raw message, counting and logging the outcome.
/// Failures are reported to the caller but never abort the loop.
pub(crate) fn land_logged<R: Record>(
    catalog: &KindCatalog<R>,
    buffers: &BufferSet<R>,
    stats: &IngestStats,
    ingestor: &str,
    topic: &str,
    payload: &[u8],
) -> Result<usize, LandingError> {
    let result = catalog.land(buffers, topic, payload);
    match &result {
        Ok(position) => {
            stats.appended();
            tracing::trace!(%ingestor, %topic, position, "record appended");
        }
        Err(LandingError::Unroutable(_)) => {
            stats.unroutable();
            tracing::warn!(%ingestor, %topic, "no kind registered for topic, skipping");
        }
        Err(LandingError::Decode(e)) => {
            stats.decode_failure();
            tracing::warn!(%ingestor, %topic, error = %e, bytes = payload.len(), "bad record, skipping");
        }
        Err(LandingError::Rejected(e)) => {
            tracing::error!(%ingestor, %topic, error = %e, "buffer rejected record");
        }
    }
    result
}
