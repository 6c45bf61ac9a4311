use crate::common::cursor::WriteCursor;
use crate::common::frame::{Frame, FrameHeader};
use crate::decode::FrameDecodeLevel;
use crate::error::{FrameParseError, InternalError};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    pub(crate) const CRC_LENGTH: usize = 2;
    /// address + function + CRC, even with empty data
    pub(crate) const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + FUNCTION_CODE_LENGTH + CRC_LENGTH;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH + CRC_LENGTH;
}

/// CRC-16/IBM as used by Modbus: polynomial 0xA001 (reflected), initial
/// value 0xFFFF, no final XOR
pub(crate) fn crc16(bytes: &[u8]) -> u16 {
    crc::Crc::<u16>::new(&crc::CRC_16_MODBUS).checksum(bytes)
}

/// Parse a complete RTU frame from a buffer.
///
/// The serial stream is not framed by length, so the caller hands over
/// whatever one read produced; a frame that does not validate is discarded
/// in its entirety.
pub(crate) fn parse(bytes: &[u8], decode: FrameDecodeLevel) -> Result<Frame, FrameParseError> {
    if bytes.len() < constants::MIN_FRAME_LENGTH {
        return Err(FrameParseError::FrameTooShort(bytes.len()));
    }

    if bytes.len() > constants::MAX_FRAME_LENGTH {
        return Err(FrameParseError::FrameLengthTooBig(
            bytes.len(),
            constants::MAX_FRAME_LENGTH,
        ));
    }

    let (body, crc_bytes) = bytes.split_at(bytes.len() - constants::CRC_LENGTH);
    let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let expected_crc = crc16(body);

    if received_crc != expected_crc {
        return Err(FrameParseError::CrcValidationFailure(
            received_crc,
            expected_crc,
        ));
    }

    let address = UnitId::new(body[0]);
    let function = body[1];
    let data = body[2..].to_vec();

    if decode.enabled() {
        tracing::info!(
            "RTU RX - {}",
            RtuDisplay::new(decode, address, &body[1..], received_crc)
        );
    }

    Ok(Frame::new(FrameHeader::Rtu { address }, function, data))
}

/// Serialize an RTU frame: address, function, data, then the CRC over all
/// of the preceding bytes, low byte first.
pub(crate) fn serialize(
    address: UnitId,
    function: u8,
    data: &[u8],
) -> Result<Vec<u8>, InternalError> {
    let body_length = constants::HEADER_LENGTH + constants::FUNCTION_CODE_LENGTH + data.len();
    let mut bytes = vec![0u8; body_length + constants::CRC_LENGTH];

    {
        let mut cursor = WriteCursor::new(&mut bytes);
        cursor.write_u8(address.value)?;
        cursor.write_u8(function)?;
        cursor.write(data)?;
    }

    let crc = crc16(&bytes[..body_length]);

    {
        let mut cursor = WriteCursor::new(&mut bytes);
        cursor.seek_from_start(body_length)?;
        cursor.write_u16_le(crc)?;
    }

    Ok(bytes)
}

struct RtuDisplay<'a> {
    level: FrameDecodeLevel,
    address: UnitId,
    data: &'a [u8],
    crc: u16,
}

impl<'a> RtuDisplay<'a> {
    fn new(level: FrameDecodeLevel, address: UnitId, data: &'a [u8], crc: u16) -> Self {
        RtuDisplay {
            level,
            address,
            data,
            crc,
        }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "address: {} crc: {:#06X} (len = {})",
            self.address,
            self.crc,
            self.data.len(),
        )?;
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_FRAME: &[u8] = &[0x01, 0x04, 0x02, 0xFF, 0xFF, 0xB8, 0x80];

    #[test]
    fn computes_the_known_crc_vector() {
        assert_eq!(crc16(&[0x01, 0x04, 0x02, 0xFF, 0xFF]), 0x80B8);
    }

    #[test]
    fn crc_of_a_frame_including_its_own_crc_is_constant() {
        // appending the little-endian CRC makes the CRC of the whole frame a fixed residue
        let residue = crc16(SIMPLE_FRAME);
        let other = serialize(UnitId::new(9), 0x03, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(crc16(&other), residue);
    }

    #[test]
    fn parses_a_valid_frame() {
        let frame = parse(SIMPLE_FRAME, FrameDecodeLevel::Nothing).unwrap();
        assert_eq!(
            frame.header(),
            FrameHeader::Rtu {
                address: UnitId::new(1)
            }
        );
        assert_eq!(frame.function(), 4);
        assert_eq!(frame.data(), &[0x02, 0xFF, 0xFF]);
    }

    #[test]
    fn rejects_a_frame_with_a_bad_crc() {
        // last byte should be 0x80
        let bytes = [0x01, 0x04, 0x02, 0xFF, 0xFF, 0xB8, 0x81];
        assert_eq!(
            parse(&bytes, FrameDecodeLevel::Nothing),
            Err(FrameParseError::CrcValidationFailure(0x81B8, 0x80B8))
        );
    }

    #[test]
    fn rejects_a_frame_shorter_than_address_function_and_crc() {
        assert_eq!(
            parse(&[0x01, 0x04, 0xFF], FrameDecodeLevel::Nothing),
            Err(FrameParseError::FrameTooShort(3))
        );
    }

    #[test]
    fn serializes_with_a_little_endian_crc_trailer() {
        let bytes = serialize(UnitId::new(1), 0x04, &[0x02, 0xFF, 0xFF]).unwrap();
        assert_eq!(bytes, SIMPLE_FRAME);
    }

    #[test]
    fn parse_of_serialize_is_identity() {
        let frame = Frame::new(
            FrameHeader::Rtu {
                address: UnitId::new(0x11),
            },
            0x10,
            vec![0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02],
        );
        let bytes = frame.serialize().unwrap();
        assert_eq!(parse(&bytes, FrameDecodeLevel::Nothing).unwrap(), frame);
    }

    #[test]
    fn frame_with_empty_data_roundtrips() {
        let bytes = serialize(UnitId::new(0x01), 0x2B, &[]).unwrap();
        assert_eq!(bytes.len(), constants::MIN_FRAME_LENGTH);
        let frame = parse(&bytes, FrameDecodeLevel::Nothing).unwrap();
        assert_eq!(frame.function(), 0x2B);
        assert!(frame.data().is_empty());
    }
}
