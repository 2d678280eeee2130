//! Architectural register state

use bitflags::bitflags;

bitflags! {
    /// Machine status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Msr: u32 {
        /// Little-endian mode
        const LE = 0x0000_0001;
        /// Recoverable interrupt
        const RI = 0x0000_0002;
        /// Data address translation
        const DR = 0x0000_0010;
        /// Instruction address translation
        const IR = 0x0000_0020;
        /// Interrupt prefix
        const IP = 0x0000_0040;
        /// Branch trace enable
        const BE = 0x0000_0200;
        /// Single-step trace enable
        const SE = 0x0000_0400;
        /// Machine check enable
        const ME = 0x0000_1000;
        /// Floating point available
        const FP = 0x0000_2000;
        /// Problem (user) state
        const PR = 0x0000_4000;
        /// External interrupt enable
        const EE = 0x0000_8000;
        /// Power management enable
        const POW = 0x0004_0000;
    }
}

/// HID4 bits the boot path touches
pub mod hid4 {
    /// Secondary BAT enable: unlocks BAT pairs 4-7
    pub const SBE: u32 = 1 << 25;
}

/// One block-address-translation register pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatRegister {
    pub upper: u32,
    pub lower: u32,
}

impl BatRegister {
    /// A zeroed pair maps nothing
    pub fn is_mapped(&self) -> bool {
        self.upper != 0 || self.lower != 0
    }
}

/// Architectural register file
///
/// Only the registers the boot sequence seeds are modeled; everything
/// else belongs to the interpreter behind [`crate::GuestExecutor`].
#[derive(Debug, Clone)]
pub struct CpuState {
    /// Program counter
    pub pc: u32,
    /// General purpose registers
    pub gpr: [u32; 32],
    /// Machine status register
    pub msr: Msr,
    /// Exception save/restore registers
    pub srr0: u32,
    pub srr1: u32,
    /// Instruction BATs (pairs 4-7 exist on the newer CPU revision only)
    pub ibat: [BatRegister; 8],
    /// Data BATs
    pub dbat: [BatRegister; 8],
    /// Hardware-implementation register 4
    pub hid4: u32,
}

impl CpuState {
    pub fn new() -> Self {
        Self {
            pc: 0,
            gpr: [0; 32],
            msr: Msr::empty(),
            srr0: 0,
            srr1: 0,
            ibat: [BatRegister::default(); 8],
            dbat: [BatRegister::default(); 8],
            hid4: 0,
        }
    }

    /// Return every register to its power-on value
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Count of BAT pairs currently mapping something
    pub fn mapped_bat_count(&self) -> usize {
        self.ibat
            .iter()
            .chain(self.dbat.iter())
            .filter(|bat| bat.is_mapped())
            .count()
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state_is_clear() {
        let cpu = CpuState::new();
        assert_eq!(cpu.pc, 0);
        assert_eq!(cpu.msr, Msr::empty());
        assert_eq!(cpu.mapped_bat_count(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut cpu = CpuState::new();
        cpu.pc = 0x8000_3100;
        cpu.gpr[1] = 0x816F_FFF0;
        cpu.msr = Msr::FP | Msr::IR | Msr::DR;
        cpu.dbat[0] = BatRegister { upper: 0x8000_1FFF, lower: 0x0000_0002 };

        cpu.reset();
        assert_eq!(cpu.pc, 0);
        assert_eq!(cpu.gpr[1], 0);
        assert_eq!(cpu.msr, Msr::empty());
        assert_eq!(cpu.mapped_bat_count(), 0);
    }

    #[test]
    fn test_msr_bit_values() {
        assert_eq!(Msr::EE.bits(), 0x8000);
        assert_eq!(Msr::FP.bits(), 0x2000);
        assert_eq!(Msr::IR.bits(), 0x20);
        assert_eq!(Msr::DR.bits(), 0x10);
    }
}
