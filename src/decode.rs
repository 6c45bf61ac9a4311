/// Controls the decoding of transmitted and received data at the frame and physical layer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodeLevel {
    /// Controls decoding of frames (MBAP / serial line PDU)
    pub frame: FrameDecodeLevel,
    /// Controls the logging of physical layer read/write
    pub physical: PhysDecodeLevel,
}

/// Controls how the transmitted and received frames are decoded at the INFO log level
///
/// Transport-specific framing wraps the application-layer traffic. You'll see these frames
/// called "ADUs" in the Modbus specification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameDecodeLevel {
    /// Decode nothing
    Nothing,
    /// Decode the header
    Header,
    /// Decode the header and the raw payload as hexadecimal
    Payload,
}

/// Controls how data transmitted at the physical layer (TCP, serial, etc) is logged
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PhysDecodeLevel {
    /// Log nothing
    Nothing,
    /// Log only the length of data that is sent and received
    Length,
    /// Log the length and the actual data that is sent and received
    Data,
}

impl DecodeLevel {
    /// construct a `DecodeLevel` with nothing enabled
    pub fn nothing() -> Self {
        Self::default()
    }

    /// construct a `DecodeLevel` from its fields
    pub fn new(frame: FrameDecodeLevel, physical: PhysDecodeLevel) -> Self {
        DecodeLevel { frame, physical }
    }
}

impl Default for DecodeLevel {
    fn default() -> Self {
        Self {
            frame: FrameDecodeLevel::Nothing,
            physical: PhysDecodeLevel::Nothing,
        }
    }
}

impl From<FrameDecodeLevel> for DecodeLevel {
    fn from(frame: FrameDecodeLevel) -> Self {
        Self {
            frame,
            physical: PhysDecodeLevel::Nothing,
        }
    }
}

impl FrameDecodeLevel {
    pub(crate) fn enabled(self) -> bool {
        !matches!(self, FrameDecodeLevel::Nothing)
    }

    pub(crate) fn payload_enabled(self) -> bool {
        matches!(self, FrameDecodeLevel::Payload)
    }
}

impl PhysDecodeLevel {
    pub(crate) fn enabled(self) -> bool {
        !matches!(self, PhysDecodeLevel::Nothing)
    }

    pub(crate) fn data_enabled(self) -> bool {
        matches!(self, PhysDecodeLevel::Data)
    }
}
