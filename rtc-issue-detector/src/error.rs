use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("stats: cannot calculate volatility for empty series")]
    ErrEmptySeries,

    #[error("detector {name}: {reason}")]
    ErrDetectorFailed { name: &'static str, reason: String },

    #[error("{0}")]
    Json(#[source] JsonError),

    #[error("{0}")]
    Io(#[source] IoError),
}

impl Error {
    pub fn detector_failed(name: &'static str, err: Error) -> Self {
        Error::ErrDetectorFailed {
            name,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("json error: {0}")]
pub struct JsonError(#[from] pub serde_json::Error);

// serde_json::Error has no PartialEq; compare by category.
impl PartialEq for JsonError {
    fn eq(&self, other: &Self) -> bool {
        self.0.classify() == other.0.classify()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(JsonError(e))
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_detector_failed_wraps_source() {
        let err = Error::detector_failed("video_decoder", Error::ErrEmptySeries);
        assert_eq!(
            err.to_string(),
            "detector video_decoder: stats: cannot calculate volatility for empty series"
        );
    }

    #[test]
    fn test_from_json_error_keeps_source() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));

        let source = err.source().expect("json error is chained");
        let json = source.downcast_ref::<JsonError>().unwrap();
        assert!(json.0.is_syntax());
        assert!(json.source().unwrap().is::<serde_json::Error>());
    }

    #[test]
    fn test_from_io_error_keeps_source() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "stats.ndjson").into();
        assert_eq!(
            err,
            Error::Io(IoError(io::Error::new(io::ErrorKind::NotFound, "other")))
        );

        let source = err.source().expect("io error is chained");
        let io_err = source.source().unwrap().downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }
}
