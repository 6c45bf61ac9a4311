use crate::common::buffer::ReadBuffer;
use crate::common::frame::{Frame, FrameHeader};
use crate::common::phys::PhysLayer;
use crate::decode::FrameDecodeLevel;
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::{TxId, UnitId};

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH;
    // cannot be < 1 b/c of the unit identifier
    pub(crate) const MAX_LENGTH_FIELD: usize = crate::common::frame::constants::MAX_ADU_LENGTH + 1;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MbapHeader {
    tx_id: TxId,
    len_field: u16,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    // header and the ADU length
    Header(MbapHeader, usize),
}

pub(crate) struct MbapParser {
    state: ParseState,
}

impl MbapParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Begin,
        }
    }

    // returns some header fields and the length of the ADU
    fn parse_header(cursor: &mut ReadBuffer) -> Result<(MbapHeader, usize), RequestError> {
        let tx_id = TxId::new(cursor.read_u16_be()?);
        let protocol_id = cursor.read_u16_be()?;
        let len_field = cursor.read_u16_be()?;
        let length = len_field as usize;
        let unit_id = UnitId::new(cursor.read_u8()?);

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::FrameLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        // The length field counts the unit identifier, the function code, and
        // the data, so it must be at least 2 for a frame to carry a function code
        if length < 2 {
            return Err(FrameParseError::MbapLengthZero.into());
        }
        let adu_length = length - 1;

        Ok((
            MbapHeader {
                tx_id,
                len_field,
                unit_id,
            },
            adu_length,
        ))
    }

    fn parse_body(
        header: &MbapHeader,
        adu_length: usize,
        cursor: &mut ReadBuffer,
    ) -> Result<Frame, RequestError> {
        let body = cursor.read(adu_length)?;
        let function = body[0];
        let data = body[1..].to_vec();

        Ok(Frame::new(
            FrameHeader::Mbap {
                tx_id: header.tx_id,
                unit_id: header.unit_id,
            },
            function,
            data,
        ))
    }

    pub(crate) fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        decode_level: FrameDecodeLevel,
    ) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Header(header, adu_length) => {
                if cursor.len() < adu_length {
                    return Ok(None);
                }

                let frame = Self::parse_body(&header, adu_length, cursor)?;
                self.state = ParseState::Begin;

                if decode_level.enabled() {
                    tracing::info!(
                        "MBAP RX - {}",
                        MbapDisplay::new(decode_level, header, frame.data())
                    );
                }

                Ok(Some(frame))
            }
            ParseState::Begin => {
                if cursor.len() < constants::HEADER_LENGTH {
                    return Ok(None);
                }

                let (header, adu_len) = Self::parse_header(cursor)?;
                self.state = ParseState::Header(header, adu_len);
                self.parse(cursor, decode_level)
            }
        }
    }
}

/// Couples the incremental parser to a buffered reader so that the caller
/// gets one complete frame per call, however the bytes were segmented.
pub(crate) struct FramedReader {
    parser: MbapParser,
    buffer: ReadBuffer,
    decode: FrameDecodeLevel,
}

impl FramedReader {
    pub(crate) fn new(decode: FrameDecodeLevel) -> Self {
        Self {
            parser: MbapParser::new(),
            buffer: ReadBuffer::new(constants::MAX_FRAME_LENGTH),
            decode,
        }
    }

    pub(crate) async fn next_frame(&mut self, io: &mut PhysLayer) -> Result<Frame, RequestError> {
        loop {
            match self.parser.parse(&mut self.buffer, self.decode)? {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer.read_some(io).await?;
                }
            }
        }
    }
}

/// Byte layout on the wire:
/// `[txn hi, txn lo, proto hi, proto lo, len hi, len lo, unit, function, data...]`
/// where the length field counts the unit identifier, function code, and data.
pub(crate) fn serialize(
    tx_id: TxId,
    unit_id: UnitId,
    function: u8,
    data: &[u8],
) -> Result<Vec<u8>, InternalError> {
    use crate::common::cursor::WriteCursor;

    let mut bytes = vec![0u8; constants::HEADER_LENGTH + 1 + data.len()];
    let mut cursor = WriteCursor::new(&mut bytes);

    cursor.write_u16_be(tx_id.to_u16())?;
    cursor.write_u16_be(0)?; // protocol id
    cursor.write_u16_be((data.len() + 2) as u16)?;
    cursor.write_u8(unit_id.value)?;
    cursor.write_u8(function)?;
    cursor.write(data)?;

    Ok(bytes)
}

pub(crate) struct MbapDisplay<'a> {
    level: FrameDecodeLevel,
    header: MbapHeader,
    bytes: &'a [u8],
}

impl<'a> MbapDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, header: MbapHeader, bytes: &'a [u8]) -> Self {
        MbapDisplay {
            level,
            header,
            bytes,
        }
    }
}

impl std::fmt::Display for MbapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {} unit: {} len: {}",
            self.header.tx_id, self.header.unit_id, self.header.len_field
        )?;
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    //                            |   tx id  |  proto id |  length  | unit | fc | body      |
    const SIMPLE_FRAME: &[u8] = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x04, 0x2A, 0x01, 0xCA, 0xFE];

    fn simple_frame() -> Frame {
        Frame::new(
            FrameHeader::Mbap {
                tx_id: TxId::new(0x0007),
                unit_id: UnitId::new(0x2A),
            },
            0x01,
            vec![0xCA, 0xFE],
        )
    }

    fn reader_for(chunks: &[&[u8]]) -> (FramedReader, PhysLayer) {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        (
            FramedReader::new(FrameDecodeLevel::Nothing),
            PhysLayer::new_mock(builder.build()),
        )
    }

    fn test_segmented_parse(split_at: usize) {
        let (f1, f2) = SIMPLE_FRAME.split_at(split_at);
        let (mut reader, mut phys) = reader_for(&[f1, f2]);
        let frame = block_on(reader.next_frame(&mut phys)).unwrap();
        assert_eq!(frame, simple_frame());
    }

    fn test_error(input: &[u8]) -> RequestError {
        let (mut reader, mut phys) = reader_for(&[input]);
        block_on(reader.next_frame(&mut phys)).err().unwrap()
    }

    #[test]
    fn correctly_serializes_frame() {
        let bytes = serialize(TxId::new(7), UnitId::new(42), 0x01, &[0xCA, 0xFE]).unwrap();
        assert_eq!(bytes, SIMPLE_FRAME);
    }

    #[test]
    fn parse_of_serialize_is_identity() {
        let frame = simple_frame();
        let bytes = frame.serialize().unwrap();
        assert_eq!(bytes, SIMPLE_FRAME);

        let (mut reader, mut phys) = reader_for(&[bytes.as_slice()]);
        assert_eq!(block_on(reader.next_frame(&mut phys)).unwrap(), frame);
    }

    #[test]
    fn can_parse_frame_from_stream() {
        let (mut reader, mut phys) = reader_for(&[SIMPLE_FRAME]);
        let frame = block_on(reader.next_frame(&mut phys)).unwrap();
        assert_eq!(frame, simple_frame());
    }

    #[test]
    fn can_parse_maximum_size_frame() {
        // maximum ADU length is 253, so the max length field value is 254 which is 0xFE
        let header: &[u8] = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFE, 0x2A];
        let payload: &[u8] = &[0xCC; 253];

        let (mut reader, mut phys) = reader_for(&[header, payload]);
        let frame = block_on(reader.next_frame(&mut phys)).unwrap();
        assert_eq!(frame.function(), 0xCC);
        assert_eq!(frame.data(), &payload[1..]);
    }

    #[test]
    fn can_parse_frame_if_segmented_in_header() {
        test_segmented_parse(4);
    }

    #[test]
    fn can_parse_frame_if_segmented_in_payload() {
        test_segmented_parse(8);
    }

    #[test]
    fn can_parse_two_frames_from_the_same_stream() {
        let (mut reader, mut phys) = reader_for(&[SIMPLE_FRAME, SIMPLE_FRAME]);
        assert_eq!(
            block_on(reader.next_frame(&mut phys)).unwrap(),
            simple_frame()
        );
        assert_eq!(
            block_on(reader.next_frame(&mut phys)).unwrap(),
            simple_frame()
        );
    }

    #[test]
    fn errors_on_bad_protocol_id() {
        let frame = &[0x00, 0x07, 0xCA, 0xFE, 0x00, 0x01, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::UnknownProtocolId(0xCAFE)),
        );
    }

    #[test]
    fn errors_on_length_of_zero() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::MbapLengthZero)
        );
    }

    #[test]
    fn errors_when_length_field_too_big() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFF, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
                0xFF,
                constants::MAX_LENGTH_FIELD,
            ))
        );
    }
}
