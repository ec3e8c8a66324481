use std::panic::Location;

/// Error kinds that can occur in nostr-engagement
#[derive(Debug)]
pub enum ErrorKind {
    General(String),
    InvalidInitialStatus(String),
    Io(std::io::Error),
    NoRuntime,
    PaymentDispatch(String),
    SerdeJson(serde_json::Error),
    Usage(String, String), // error, usage line
}

/// Errors that can occur in nostr-engagement, including the file and line number
/// where they were generated
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    location: &'static Location<'static>,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.kind, self.location)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            General(s) => write!(f, "{s}"),
            InvalidInitialStatus(s) => write!(f, "Payments cannot start out {s}"),
            Io(e) => write!(f, "I/O Error: {e}"),
            NoRuntime => write!(f, "No tokio runtime to run on"),
            PaymentDispatch(s) => write!(f, "Payment failed: {s}"),
            SerdeJson(e) => write!(f, "SerdeJson Error: {e}"),
            Usage(e, u) => write!(f, "{}\n\nUsage: {}", e, u),
        }
    }
}

// Note: we impl Into because our typical pattern is InnerError::Variant.into()
//       when we tried implementing From, the location was deep in rust code's
//       blanket into implementation, which wasn't the line number we wanted.
//
//       As for converting other error types, the try! macro uses From so it
//       is correct.
#[allow(clippy::from_over_into)]
impl Into<Error> for ErrorKind {
    #[track_caller]
    fn into(self) -> Error {
        Error {
            kind: self,
            location: Location::caller(),
        }
    }
}

impl From<String> for Error {
    #[track_caller]
    fn from(s: String) -> Error {
        Error {
            kind: ErrorKind::General(s),
            location: Location::caller(),
        }
    }
}

impl From<&str> for Error {
    #[track_caller]
    fn from(s: &str) -> Error {
        Error {
            kind: ErrorKind::General(s.to_string()),
            location: Location::caller(),
        }
    }
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(e: std::io::Error) -> Error {
        Error {
            kind: ErrorKind::Io(e),
            location: Location::caller(),
        }
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(e: serde_json::Error) -> Error {
        Error {
            kind: ErrorKind::SerdeJson(e),
            location: Location::caller(),
        }
    }
}
