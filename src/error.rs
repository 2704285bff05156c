pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("backend initialization failed: {0}")]
    BackendInitializationFailed(String),

    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("no available fence (capacity {capacity})")]
    FenceExhausted { capacity: usize },

    #[error("buffer allocation failed: {0}")]
    BufferAllocationFailed(String),

    #[error("kernel needs {requested} buffers but the device allows {limit}")]
    ParameterLimitExceeded { requested: usize, limit: usize },

    #[error("{what} index {index} is out of range 0..{len}")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{child} outlived its {parent}")]
    ParentExpired {
        child: &'static str,
        parent: &'static str,
    },

    #[error("worker panic: {0}")]
    WorkerPanic(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Error::InitializationFailed(msg.into())
    }

    pub fn backend_initialization<S: Into<String>>(msg: S) -> Self {
        Error::BackendInitializationFailed(msg.into())
    }

    pub fn invalid_instruction<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInstruction(msg.into())
    }

    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Error::BufferAllocationFailed(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Error::OutOfRange { what, index, len }
    }

    pub fn expired(child: &'static str, parent: &'static str) -> Self {
        Error::ParentExpired { child, parent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let e = Error::out_of_range("device", 3, 1);
        assert_eq!(e.to_string(), "device index 3 is out of range 0..1");

        let e = Error::ParameterLimitExceeded {
            requested: 300,
            limit: 256,
        };
        assert!(e.to_string().contains("300"));

        let e = Error::FenceExhausted { capacity: 4 };
        assert!(e.to_string().contains("no available fence"));
    }
}
