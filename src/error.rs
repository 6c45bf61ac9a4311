/// Indicates that the close signal fired and the task should exit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("shutdown")
    }
}

/// Top-level error for everything that can go wrong while receiving and
/// decoding a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// I/O error on the underlying stream
    Io(std::io::ErrorKind),
    /// Errors that occur while parsing a frame off a stream (TCP or serial)
    BadFrame(FrameParseError),
    /// Errors that occur while parsing requests
    BadRequest(AduParseError),
    /// Errors that should never occur and indicate a bug in the library
    Internal(InternalError),
    /// The close signal fired
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => write!(f, "i/o error: {kind}"),
            RequestError::BadFrame(err) => write!(f, "bad frame: {err}"),
            RequestError::BadRequest(err) => write!(f, "bad request: {err}"),
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
            RequestError::Shutdown => f.write_str("shutdown"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<Shutdown> for RequestError {
    fn from(_: Shutdown) -> Self {
        RequestError::Shutdown
    }
}

/// Errors that occur while parsing a frame off a stream (TCP or serial)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received an MBAP header with a length field too small to contain a function code
    MbapLengthZero,
    /// Received a frame with a length that exceeds the allowed maximum (actual, maximum)
    FrameLengthTooBig(usize, usize),
    /// Received an MBAP header with a non-Modbus protocol id
    UnknownProtocolId(u16),
    /// Received a serial frame too short to contain an address, function code, and CRC
    FrameTooShort(usize),
    /// Received a serial frame whose CRC does not match the frame contents (received, expected)
    CrcValidationFailure(u16, u16),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MbapLengthZero => {
                f.write_str("MBAP length field is too small to contain a function code")
            }
            FrameParseError::FrameLengthTooBig(size, max) => write!(
                f,
                "frame length ({size}) exceeds the maximum allowed length ({max})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received non-Modbus protocol id: {id}")
            }
            FrameParseError::FrameTooShort(size) => {
                write!(f, "serial frame of {size} bytes is too short to be valid")
            }
            FrameParseError::CrcValidationFailure(received, expected) => write!(
                f,
                "CRC validation failure: received {received:#06X}, expected {expected:#06X}"
            ),
        }
    }
}

/// Errors that occur while parsing the data payload of a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AduParseError {
    /// Request is too short to contain the expected fields
    InsufficientBytes,
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => {
                f.write_str("request is too short to contain the expected fields")
            }
        }
    }
}

/// Errors that should never occur and indicate a bug in the library
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// Attempted to write more bytes than allowed (write size, remaining)
    InsufficientWriteSpace(usize, usize),
    /// Attempted to read more bytes than present (requested, remaining)
    InsufficientBytesForRead(usize, usize),
    /// Cursor seek operation exceeded the bounds of the underlying buffer
    BadSeekOperation,
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace(size, remaining) => write!(
                f,
                "attempted to write {size} bytes with {remaining} bytes remaining"
            ),
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("cursor seek operation exceeded the bounds of the underlying buffer")
            }
        }
    }
}

/// Error returned when an address range would overflow the 16-bit address space
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidRange {
    /// starting address of the range
    pub start: u16,
    /// count of elements in the range
    pub count: u16,
}

impl std::error::Error for InvalidRange {}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "start == {} and count == {} exceeds the address space",
            self.start, self.count
        )
    }
}
