//! Decides which remote failures degrade to a cached empty result.

use crate::error::{ApiError, ErrorKind};

/// What the fetch executor does with a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Cache and return an empty result.
  Absorb,
  /// Return the error to the caller without caching.
  Propagate,
}

/// Timeouts, 401 and 400 cannot be fixed by retrying right away, so they are
/// absorbed. Everything else propagates.
pub fn classify(err: &ApiError) -> Disposition {
  match err.kind() {
    ErrorKind::NetworkTimeout | ErrorKind::Unauthorized | ErrorKind::BadRequest => {
      Disposition::Absorb
    }
    ErrorKind::ServerOrUnknownError => Disposition::Propagate,
  }
}
