use thiserror::Error;

/// Defines the errors raised by the offline/online decomposition engine
#[derive(Error, Debug)]
pub enum SgdeError {
    /// Invalid or inconsistent configuration (e.g., empty grid, bad worker-grid shape)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The decomposition or solve failed for the chosen method
    #[error("numerical error: {0}")]
    Numerical(String),

    /// A file could not be opened, read, or written
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file or index record is malformed
    #[error("format error: {0}")]
    Format(String),

    /// The operation requires an optional backend that is not available
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The object is not in a state that allows the operation (e.g., not decomposed yet)
    #[error("state error: {0}")]
    State(&'static str),
}

impl SgdeError {
    /// Wraps an i/o error together with the path that caused it
    pub(crate) fn io<P: AsRef<std::path::Path>>(path: P, source: std::io::Error) -> Self {
        SgdeError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Wraps an error message returned by a russell_lab kernel
    pub(crate) fn lab(message: &'static str) -> Self {
        SgdeError::Numerical(message.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::SgdeError;

    #[test]
    fn display_works() {
        let err = SgdeError::Configuration("grid is empty".to_string());
        assert_eq!(format!("{}", err), "configuration error: grid is empty");
        let err = SgdeError::State("matrix was not decomposed yet");
        assert_eq!(format!("{}", err), "state error: matrix was not decomposed yet");
        let err = SgdeError::io(
            "/tmp/none.dec",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(format!("{}", err), "i/o error on /tmp/none.dec: missing");
        let err = SgdeError::Numerical("singular".to_string());
        assert_eq!(format!("{}", err), "numerical error: singular");
        let err = SgdeError::lab("matrices are incompatible");
        assert_eq!(format!("{}", err), "numerical error: matrices are incompatible");
    }
}
