use thiserror::Error;

/// Failure of a call to the backend API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
  #[error("Request timed out: {0}")]
  Timeout(String),

  #[error("Unauthorized - token may be expired")]
  Unauthorized,

  #[error("Bad request: {0}")]
  BadRequest(String),

  #[error("Access denied: {0}")]
  Forbidden(String),

  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("Rate limited - please wait before retrying")]
  RateLimited,

  #[error("Server error: {0}")]
  ServerError(String),

  #[error("Network error: {0}")]
  Network(String),

  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  #[error("Invalid resource name: {0:?}")]
  InvalidResource(String),
}

/// Coarse classification of API failures used by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NetworkTimeout,
  Unauthorized,
  BadRequest,
  ServerOrUnknownError,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
  /// Truncate a response body to avoid logging excessive data
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!(
      "{}... (truncated, {} total bytes)",
      &body[..end],
      body.len()
    )
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    match status.as_u16() {
      400 => ApiError::BadRequest(truncated),
      401 => ApiError::Unauthorized,
      403 => ApiError::Forbidden(truncated),
      404 => ApiError::NotFound(truncated),
      429 => ApiError::RateLimited,
      500..=599 => ApiError::ServerError(truncated),
      _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Timeout(_) => ErrorKind::NetworkTimeout,
      ApiError::Unauthorized => ErrorKind::Unauthorized,
      ApiError::BadRequest(_) => ErrorKind::BadRequest,
      _ => ErrorKind::ServerOrUnknownError,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ApiError::Timeout(err.to_string())
    } else if let Some(status) = err.status() {
      ApiError::from_status(status, &err.to_string())
    } else if err.is_decode() {
      ApiError::InvalidResponse(err.to_string())
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::InvalidResponse(err.to_string())
  }
}
