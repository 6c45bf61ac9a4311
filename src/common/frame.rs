use crate::error::InternalError;
use crate::exception::ExceptionCode;
use crate::types::{TxId, UnitId};

pub(crate) mod constants {
    /// Maximum length of the ADU (function code + data)
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
}

/// Transport-specific header fields that a response must echo back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameHeader {
    /// MBAP header fields (Modbus TCP / TLS)
    Mbap { tx_id: TxId, unit_id: UnitId },
    /// Serial line address (Modbus RTU)
    Rtu { address: UnitId },
}

/// A decoded frame: transport header fields, function code, and data payload.
///
/// A frame lives for a single request/response cycle. Responses are
/// constructed from the request so that the transport-specific header
/// fields are preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    function: u8,
    data: Vec<u8>,
}

impl Frame {
    pub(crate) fn new(header: FrameHeader, function: u8, data: Vec<u8>) -> Self {
        Frame {
            header,
            function,
            data,
        }
    }

    /// function code of this frame
    pub fn function(&self) -> u8 {
        self.function
    }

    /// data payload of this frame (everything after the function code)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn header(&self) -> FrameHeader {
        self.header
    }

    /// a response frame is a copy of the request with the data swapped out
    pub(crate) fn reply(&self, data: Vec<u8>) -> Frame {
        Frame {
            header: self.header,
            function: self.function,
            data,
        }
    }

    /// exception injection: set the high bit of the function code and
    /// replace the data with the single exception-code byte
    pub(crate) fn exception_reply(&self, ex: ExceptionCode) -> Frame {
        Frame {
            header: self.header,
            function: self.function | 0x80,
            data: vec![ex.into()],
        }
    }

    pub(crate) fn serialize(&self) -> Result<Vec<u8>, InternalError> {
        match self.header {
            FrameHeader::Mbap { tx_id, unit_id } => {
                crate::tcp::frame::serialize(tx_id, unit_id, self.function, &self.data)
            }
            FrameHeader::Rtu { address } => {
                crate::serial::frame::serialize(address, self.function, &self.data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        Frame::new(
            FrameHeader::Mbap {
                tx_id: TxId::new(7),
                unit_id: UnitId::new(42),
            },
            0x03,
            vec![0x00, 0x01, 0x00, 0x02],
        )
    }

    #[test]
    fn reply_preserves_header_and_function() {
        let frame = test_frame();
        let reply = frame.reply(vec![0xCA, 0xFE]);
        assert_eq!(reply.header(), frame.header());
        assert_eq!(reply.function(), 0x03);
        assert_eq!(reply.data(), &[0xCA, 0xFE]);
    }

    #[test]
    fn exception_reply_sets_high_bit_and_single_code_byte() {
        let reply = test_frame().exception_reply(ExceptionCode::IllegalDataAddress);
        assert_eq!(reply.function(), 0x83);
        assert_eq!(reply.data(), &[0x02]);
    }
}
