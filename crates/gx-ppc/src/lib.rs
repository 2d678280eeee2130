//! PowerPC state for the oxidized-cube emulator
//!
//! This crate holds the architectural register file the boot path
//! initializes and the [`GuestExecutor`] trait behind which the actual
//! interpreter/JIT lives. Instruction semantics are not implemented here.

pub mod executor;
pub mod state;

pub use executor::{GuestExecutor, NullExecutor};
pub use state::{BatRegister, CpuState, Msr};
