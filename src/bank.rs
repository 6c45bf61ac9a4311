use crate::exception::ExceptionCode;
use crate::types::AddressRange;

/// Storage for the four Modbus address spaces.
///
/// The dispatcher owns the bank exclusively and serializes all access, so
/// implementations never see concurrent calls. Writes are therefore atomic
/// with respect to reads from the same bank.
///
/// Every operation addresses a 65,536-entry space; implementations backed
/// by less memory return `IllegalDataAddress` for whatever they do not
/// cover. A read with a count of zero is valid and returns an empty slice.
pub trait RegisterBank: Send {
    /// Read a range of coils, returning the matching slice of bool or an exception
    fn read_coils(&self, range: AddressRange) -> Result<&[bool], ExceptionCode>;

    /// Read a range of discrete inputs, returning the matching slice of bool or an exception
    fn read_discrete_inputs(&self, range: AddressRange) -> Result<&[bool], ExceptionCode>;

    /// Read a range of holding registers, returning the matching slice of u16 or an exception
    fn read_holding_registers(&self, range: AddressRange) -> Result<&[u16], ExceptionCode>;

    /// Read a range of input registers, returning the matching slice of u16 or an exception
    fn read_input_registers(&self, range: AddressRange) -> Result<&[u16], ExceptionCode>;

    /// Write a single coil value
    fn write_single_coil(&mut self, index: u16, value: bool) -> Result<(), ExceptionCode>;

    /// Write a single holding register value
    fn write_single_register(&mut self, index: u16, value: u16) -> Result<(), ExceptionCode>;

    /// Write a contiguous block of coils
    fn write_multiple_coils(&mut self, start: u16, values: &[bool]) -> Result<(), ExceptionCode>;

    /// Write a contiguous block of holding registers
    fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<(), ExceptionCode>;

    /// retrieve a sub-range of a slice or `ExceptionCode::IllegalDataAddress`
    fn get_range_of<T>(slice: &[T], range: AddressRange) -> Result<&[T], ExceptionCode>
    where
        Self: Sized,
    {
        let rng = match range.to_range() {
            Ok(rng) => rng,
            Err(_) => return Err(ExceptionCode::IllegalDataAddress),
        };
        if rng.end > slice.len() {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(&slice[rng])
    }
}

/// Default bank: four preallocated 65,536-entry spaces
pub struct InMemoryBank {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

const ADDRESS_SPACE_SIZE: usize = 65536;

impl InMemoryBank {
    /// Allocate a bank with every coil off and every register zero
    pub fn new() -> Self {
        Self {
            coils: vec![false; ADDRESS_SPACE_SIZE],
            discrete_inputs: vec![false; ADDRESS_SPACE_SIZE],
            holding_registers: vec![0; ADDRESS_SPACE_SIZE],
            input_registers: vec![0; ADDRESS_SPACE_SIZE],
        }
    }

    /// full coil space
    pub fn coils(&self) -> &[bool] {
        &self.coils
    }

    /// mutable coil space, for seeding state before the server starts
    pub fn coils_mut(&mut self) -> &mut [bool] {
        &mut self.coils
    }

    /// full discrete input space
    pub fn discrete_inputs(&self) -> &[bool] {
        &self.discrete_inputs
    }

    /// mutable discrete input space; discrete inputs are read-only from the
    /// protocol, so this is the only way they change
    pub fn discrete_inputs_mut(&mut self) -> &mut [bool] {
        &mut self.discrete_inputs
    }

    /// full holding register space
    pub fn holding_registers(&self) -> &[u16] {
        &self.holding_registers
    }

    /// mutable holding register space
    pub fn holding_registers_mut(&mut self) -> &mut [u16] {
        &mut self.holding_registers
    }

    /// full input register space
    pub fn input_registers(&self) -> &[u16] {
        &self.input_registers
    }

    /// mutable input register space; input registers are read-only from the
    /// protocol, so this is the only way they change
    pub fn input_registers_mut(&mut self) -> &mut [u16] {
        &mut self.input_registers
    }
}

impl Default for InMemoryBank {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBank for InMemoryBank {
    fn read_coils(&self, range: AddressRange) -> Result<&[bool], ExceptionCode> {
        Self::get_range_of(&self.coils, range)
    }

    fn read_discrete_inputs(&self, range: AddressRange) -> Result<&[bool], ExceptionCode> {
        Self::get_range_of(&self.discrete_inputs, range)
    }

    fn read_holding_registers(&self, range: AddressRange) -> Result<&[u16], ExceptionCode> {
        Self::get_range_of(&self.holding_registers, range)
    }

    fn read_input_registers(&self, range: AddressRange) -> Result<&[u16], ExceptionCode> {
        Self::get_range_of(&self.input_registers, range)
    }

    fn write_single_coil(&mut self, index: u16, value: bool) -> Result<(), ExceptionCode> {
        match self.coils.get_mut(index as usize) {
            Some(x) => {
                *x = value;
                Ok(())
            }
            None => Err(ExceptionCode::IllegalDataAddress),
        }
    }

    fn write_single_register(&mut self, index: u16, value: u16) -> Result<(), ExceptionCode> {
        match self.holding_registers.get_mut(index as usize) {
            Some(x) => {
                *x = value;
                Ok(())
            }
            None => Err(ExceptionCode::IllegalDataAddress),
        }
    }

    fn write_multiple_coils(&mut self, start: u16, values: &[bool]) -> Result<(), ExceptionCode> {
        let start = start as usize;
        let end = start + values.len();
        match self.coils.get_mut(start..end) {
            Some(slice) => {
                slice.copy_from_slice(values);
                Ok(())
            }
            None => Err(ExceptionCode::IllegalDataAddress),
        }
    }

    fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<(), ExceptionCode> {
        let start = start as usize;
        let end = start + values.len();
        match self.holding_registers.get_mut(start..end) {
            Some(slice) => {
                slice.copy_from_slice(values);
                Ok(())
            }
            None => Err(ExceptionCode::IllegalDataAddress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_what_was_written() {
        let mut bank = InMemoryBank::new();
        bank.write_multiple_registers(100, &[1, 2, 65535]).unwrap();
        assert_eq!(
            bank.read_holding_registers(AddressRange::new(100, 3))
                .unwrap(),
            &[1, 2, 65535]
        );

        bank.write_multiple_coils(10, &[true, false, true]).unwrap();
        assert_eq!(
            bank.read_coils(AddressRange::new(10, 3)).unwrap(),
            &[true, false, true]
        );
    }

    #[test]
    fn single_writes_hit_the_expected_address() {
        let mut bank = InMemoryBank::new();
        bank.write_single_coil(65535, true).unwrap();
        assert!(bank.coils()[65535]);

        bank.write_single_register(5, 6).unwrap();
        assert_eq!(bank.holding_registers()[5], 6);
    }

    #[test]
    fn empty_read_returns_an_empty_slice() {
        let bank = InMemoryBank::new();
        let expected: &[u16] = &[];
        assert_eq!(
            bank.read_input_registers(AddressRange::new(1000, 0))
                .unwrap(),
            expected
        );
    }

    #[test]
    fn read_of_the_last_address_succeeds() {
        let bank = InMemoryBank::new();
        assert_eq!(
            bank.read_holding_registers(AddressRange::new(65535, 1))
                .unwrap(),
            &[0]
        );
    }

    #[test]
    fn read_past_the_end_of_the_space_is_rejected() {
        let bank = InMemoryBank::new();
        assert_eq!(
            bank.read_holding_registers(AddressRange::new(65535, 2)),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn multi_write_past_the_end_mutates_nothing() {
        let mut bank = InMemoryBank::new();
        assert_eq!(
            bank.write_multiple_coils(65535, &[true, true]),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert!(!bank.coils()[65535]);
    }

    #[test]
    fn discrete_inputs_seeded_through_the_accessor() {
        let mut bank = InMemoryBank::new();
        bank.discrete_inputs_mut()[0] = true;
        bank.discrete_inputs_mut()[9] = true;
        let values = bank
            .read_discrete_inputs(AddressRange::new(0, 10))
            .unwrap();
        assert!(values[0] && values[9]);
        assert!(!values[1]);
    }
}
