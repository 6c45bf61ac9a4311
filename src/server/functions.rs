use crate::bank::RegisterBank;
use crate::common::bits;
use crate::common::cursor::ReadCursor;
use crate::common::frame::Frame;
use crate::constants::limits;
use crate::exception::ExceptionCode;
use crate::types::AddressRange;

pub(crate) mod codes {
    pub(crate) const READ_COILS: u8 = 1;
    pub(crate) const READ_DISCRETE_INPUTS: u8 = 2;
    pub(crate) const READ_HOLDING_REGISTERS: u8 = 3;
    pub(crate) const READ_INPUT_REGISTERS: u8 = 4;
    pub(crate) const WRITE_SINGLE_COIL: u8 = 5;
    pub(crate) const WRITE_SINGLE_REGISTER: u8 = 6;
    pub(crate) const WRITE_MULTIPLE_COILS: u8 = 15;
    pub(crate) const WRITE_MULTIPLE_REGISTERS: u8 = 16;
}

/// bytes echoed by the write functions: the first four data bytes of the request
const ECHO_LENGTH: usize = 4;

/// `(register, count)` from the first four data bytes, as two big-endian u16s
fn parse_range(cursor: &mut ReadCursor) -> Result<AddressRange, ExceptionCode> {
    let start = cursor
        .read_u16_be()
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    let count = cursor
        .read_u16_be()
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    Ok(AddressRange::new(start, count))
}

/// `(register, value)` from the first four data bytes of the single-entry functions
fn parse_indexed(data: &[u8]) -> Result<(u16, u16), ExceptionCode> {
    let mut cursor = ReadCursor::new(data);
    let index = cursor
        .read_u16_be()
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    let value = cursor
        .read_u16_be()
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    Ok((index, value))
}

/// Reject the request when `register + count` would exceed the 65,536-entry
/// address space, before the bank is touched.
fn check_addresses(range: AddressRange) -> Result<AddressRange, ExceptionCode> {
    range
        .to_range()
        .map_err(|_| ExceptionCode::IllegalDataAddress)?;
    Ok(range)
}

fn parse_read_bits_request(data: &[u8]) -> Result<AddressRange, ExceptionCode> {
    let mut cursor = ReadCursor::new(data);
    let range = parse_range(&mut cursor)?;
    if range.count > limits::MAX_READ_COILS_COUNT {
        return Err(ExceptionCode::IllegalDataValue);
    }
    check_addresses(range)
}

fn parse_read_registers_request(data: &[u8]) -> Result<AddressRange, ExceptionCode> {
    let mut cursor = ReadCursor::new(data);
    let range = parse_range(&mut cursor)?;
    if range.count > limits::MAX_READ_REGISTERS_COUNT {
        return Err(ExceptionCode::IllegalDataValue);
    }
    check_addresses(range)
}

/// byte count, then the bits packed LSB-first
fn bit_payload(values: &[bool]) -> Vec<u8> {
    let packed = bits::pack_bits(values);
    let mut payload = Vec::with_capacity(1 + packed.len());
    payload.push(packed.len() as u8);
    payload.extend_from_slice(&packed);
    payload
}

/// byte count, then the registers as big-endian u16s
fn register_payload(values: &[u16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + values.len() * 2);
    payload.push((values.len() * 2) as u8);
    for value in values {
        payload.extend_from_slice(&value.to_be_bytes());
    }
    payload
}

fn echo(data: &[u8]) -> Vec<u8> {
    data[..ECHO_LENGTH].to_vec()
}

/// function 1, read coils
pub(crate) fn read_coils(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_read_bits_request(frame.data())?;
    let values = bank.read_coils(range)?;
    Ok(bit_payload(values))
}

/// function 2, read discrete inputs
pub(crate) fn read_discrete_inputs(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_read_bits_request(frame.data())?;
    let values = bank.read_discrete_inputs(range)?;
    Ok(bit_payload(values))
}

/// function 3, read holding registers
pub(crate) fn read_holding_registers(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_read_registers_request(frame.data())?;
    let values = bank.read_holding_registers(range)?;
    Ok(register_payload(values))
}

/// function 4, read input registers
pub(crate) fn read_input_registers(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let range = parse_read_registers_request(frame.data())?;
    let values = bank.read_input_registers(range)?;
    Ok(register_payload(values))
}

/// function 5, write single coil
///
/// 0x0000 means off, any other value means on
pub(crate) fn write_single_coil(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let (index, value) = parse_indexed(frame.data())?;
    bank.write_single_coil(index, value != 0)?;
    Ok(echo(frame.data()))
}

/// function 6, write single holding register
pub(crate) fn write_single_register(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let (index, value) = parse_indexed(frame.data())?;
    bank.write_single_register(index, value)?;
    Ok(echo(frame.data()))
}

/// function 15, write multiple coils
pub(crate) fn write_multiple_coils(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let mut cursor = ReadCursor::new(frame.data());
    let range = check_addresses(parse_range(&mut cursor)?)?;

    // the byte-count field is advisory, the payload length is what gets validated
    cursor
        .read_u8()
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    let payload = cursor.read_remainder();

    if payload.len() < bits::num_bytes_for_bits(range.count) {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values = bits::unpack_bits(payload, range.count);
    bank.write_multiple_coils(range.start, &values)?;
    Ok(echo(frame.data()))
}

/// function 16, write multiple holding registers
pub(crate) fn write_multiple_registers(
    bank: &mut dyn RegisterBank,
    frame: &Frame,
) -> Result<Vec<u8>, ExceptionCode> {
    let mut cursor = ReadCursor::new(frame.data());
    let range = check_addresses(parse_range(&mut cursor)?)?;

    cursor
        .read_u8()
        .map_err(|_| ExceptionCode::IllegalDataValue)?;
    let payload = cursor.read_remainder();

    if payload.len() != range.count as usize * 2 {
        return Err(ExceptionCode::IllegalDataValue);
    }

    let values: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    bank.write_multiple_registers(range.start, &values)?;
    Ok(echo(frame.data()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryBank;
    use crate::common::frame::FrameHeader;
    use crate::types::{TxId, UnitId};

    fn request(function: u8, data: Vec<u8>) -> Frame {
        Frame::new(
            FrameHeader::Mbap {
                tx_id: TxId::new(1),
                unit_id: UnitId::new(0xFF),
            },
            function,
            data,
        )
    }

    fn range_data(start: u16, count: u16) -> Vec<u8> {
        let mut data = start.to_be_bytes().to_vec();
        data.extend_from_slice(&count.to_be_bytes());
        data
    }

    #[test]
    fn reads_coils_packed_lsb_first() {
        let mut bank = InMemoryBank::new();
        bank.coils_mut()[10] = true;
        bank.coils_mut()[11] = true;
        bank.coils_mut()[17] = true;
        bank.coils_mut()[18] = true;

        let frame = request(codes::READ_COILS, range_data(10, 9));
        let payload = read_coils(&mut bank, &frame).unwrap();
        assert_eq!(payload, &[2, 0b1000_0011, 0b0000_0001]);
    }

    #[test]
    fn reads_discrete_inputs_packed_lsb_first() {
        let mut bank = InMemoryBank::new();
        bank.discrete_inputs_mut()[0] = true;
        bank.discrete_inputs_mut()[7] = true;
        bank.discrete_inputs_mut()[8] = true;
        bank.discrete_inputs_mut()[9] = true;

        let frame = request(codes::READ_DISCRETE_INPUTS, range_data(0, 10));
        let payload = read_discrete_inputs(&mut bank, &frame).unwrap();
        assert_eq!(payload, &[2, 0b1000_0001, 0b0000_0011]);
    }

    #[test]
    fn reads_holding_registers_as_big_endian_words() {
        let mut bank = InMemoryBank::new();
        bank.holding_registers_mut()[100] = 1;
        bank.holding_registers_mut()[101] = 2;
        bank.holding_registers_mut()[102] = 65535;

        let frame = request(codes::READ_HOLDING_REGISTERS, range_data(100, 3));
        let payload = read_holding_registers(&mut bank, &frame).unwrap();
        assert_eq!(payload, &[6, 0, 1, 0, 2, 255, 255]);
    }

    #[test]
    fn reads_input_registers_as_big_endian_words() {
        let mut bank = InMemoryBank::new();
        bank.input_registers_mut()[200] = 1;
        bank.input_registers_mut()[201] = 2;
        bank.input_registers_mut()[202] = 65535;

        let frame = request(codes::READ_INPUT_REGISTERS, range_data(200, 3));
        let payload = read_input_registers(&mut bank, &frame).unwrap();
        assert_eq!(payload, &[6, 0, 1, 0, 2, 255, 255]);
    }

    #[test]
    fn empty_read_succeeds_with_an_empty_payload() {
        let mut bank = InMemoryBank::new();
        let frame = request(codes::READ_COILS, range_data(1234, 0));
        assert_eq!(read_coils(&mut bank, &frame).unwrap(), &[0]);
    }

    #[test]
    fn read_of_the_last_address_succeeds() {
        let mut bank = InMemoryBank::new();
        let frame = request(codes::READ_HOLDING_REGISTERS, range_data(65535, 1));
        assert_eq!(
            read_holding_registers(&mut bank, &frame).unwrap(),
            &[2, 0, 0]
        );
    }

    #[test]
    fn read_that_overflows_the_address_space_is_rejected() {
        let mut bank = InMemoryBank::new();
        let frame = request(codes::READ_HOLDING_REGISTERS, range_data(65535, 2));
        assert_eq!(
            read_holding_registers(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn read_count_beyond_the_protocol_limit_is_rejected() {
        let mut bank = InMemoryBank::new();
        let frame = request(codes::READ_COILS, range_data(0, 2001));
        assert_eq!(
            read_coils(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataValue)
        );

        let frame = request(codes::READ_HOLDING_REGISTERS, range_data(0, 126));
        assert_eq!(
            read_holding_registers(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn truncated_request_is_rejected_as_an_illegal_value() {
        let mut bank = InMemoryBank::new();
        let frame = request(codes::READ_COILS, vec![0x00, 0x0A, 0x00]);
        assert_eq!(
            read_coils(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn writes_a_single_coil_with_any_nonzero_value() {
        let mut bank = InMemoryBank::new();
        let mut data = 65535u16.to_be_bytes().to_vec();
        data.extend_from_slice(&1024u16.to_be_bytes());

        let frame = request(codes::WRITE_SINGLE_COIL, data.clone());
        let payload = write_single_coil(&mut bank, &frame).unwrap();
        assert!(bank.coils()[65535]);
        assert_eq!(payload, data);

        // zero turns the coil back off
        let mut data = 65535u16.to_be_bytes().to_vec();
        data.extend_from_slice(&0u16.to_be_bytes());
        let frame = request(codes::WRITE_SINGLE_COIL, data);
        write_single_coil(&mut bank, &frame).unwrap();
        assert!(!bank.coils()[65535]);
    }

    #[test]
    fn writes_a_single_register_and_echoes_the_request() {
        let mut bank = InMemoryBank::new();
        let data = vec![0x00, 0x05, 0x00, 0x06];
        let frame = request(codes::WRITE_SINGLE_REGISTER, data.clone());
        let payload = write_single_register(&mut bank, &frame).unwrap();
        assert_eq!(bank.holding_registers()[5], 6);
        assert_eq!(payload, data);
    }

    #[test]
    fn writes_multiple_coils_from_packed_bits() {
        let mut bank = InMemoryBank::new();
        // start = 1, count = 2, byte count = 1, bits = 0b11
        let data = vec![0x00, 0x01, 0x00, 0x02, 0x01, 0x03];
        let frame = request(codes::WRITE_MULTIPLE_COILS, data);
        let payload = write_multiple_coils(&mut bank, &frame).unwrap();
        assert_eq!(&bank.coils()[1..4], &[true, true, false]);
        assert_eq!(payload, &[0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn writes_nine_coils_across_a_byte_boundary() {
        let mut bank = InMemoryBank::new();
        let data = vec![0x00, 0x00, 0x00, 0x09, 0x02, 0xFF, 0x01];
        let frame = request(codes::WRITE_MULTIPLE_COILS, data);
        write_multiple_coils(&mut bank, &frame).unwrap();
        assert_eq!(&bank.coils()[0..9], &[true; 9]);
        assert_eq!(&bank.coils()[9..16], &[false; 7]);
    }

    #[test]
    fn rejects_coil_write_with_too_few_payload_bytes() {
        let mut bank = InMemoryBank::new();
        // count = 9 requires two payload bytes, only one present
        let data = vec![0x00, 0x00, 0x00, 0x09, 0x02, 0xFF];
        let frame = request(codes::WRITE_MULTIPLE_COILS, data);
        assert_eq!(
            write_multiple_coils(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn writes_multiple_registers_from_big_endian_words() {
        let mut bank = InMemoryBank::new();
        let data = vec![0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x03, 0x00, 0x04];
        let frame = request(codes::WRITE_MULTIPLE_REGISTERS, data);
        let payload = write_multiple_registers(&mut bank, &frame).unwrap();
        assert_eq!(&bank.holding_registers()[1..3], &[3, 4]);
        assert_eq!(payload, &[0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn rejects_register_write_whose_payload_does_not_match_the_count() {
        let mut bank = InMemoryBank::new();
        // count = 2 but only one register's worth of bytes
        let data = vec![0x00, 0x01, 0x00, 0x02, 0x02, 0x00, 0x03];
        let frame = request(codes::WRITE_MULTIPLE_REGISTERS, data);
        assert_eq!(
            write_multiple_registers(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn rejects_multi_write_that_overflows_the_address_space() {
        let mut bank = InMemoryBank::new();
        let data = vec![0xFF, 0xFF, 0x00, 0x02, 0x01, 0x03];
        let frame = request(codes::WRITE_MULTIPLE_COILS, data);
        assert_eq!(
            write_multiple_coils(&mut bank, &frame),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }
}
