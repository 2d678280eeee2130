//! Guest-execution boundary

use crate::state::CpuState;
use gx_core::error::PpcError;
use gx_memory::MemoryManager;
use std::sync::Arc;
use tracing::debug;

/// Boundary to the CPU interpreter/JIT.
///
/// The boot path needs to run small pieces of guest code (the apploader)
/// to completion. An implementation executes starting at `address` until
/// the called function returns, with `cpu` carrying the calling-convention
/// registers in and out.
pub trait GuestExecutor {
    fn run_function(
        &mut self,
        cpu: &mut CpuState,
        memory: &Arc<MemoryManager>,
        address: u32,
    ) -> Result<(), PpcError>;
}

/// Executor used when no CPU backend is wired up.
///
/// Boot paths that never execute guest code (raw executables, installed
/// titles) work fine with this; anything that reaches the apploader fails
/// with a clear error instead of running garbage.
#[derive(Debug, Default)]
pub struct NullExecutor;

impl NullExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl GuestExecutor for NullExecutor {
    fn run_function(
        &mut self,
        _cpu: &mut CpuState,
        _memory: &Arc<MemoryManager>,
        address: u32,
    ) -> Result<(), PpcError> {
        debug!("Null executor asked to run guest code at 0x{:08x}", address);
        Err(PpcError::NoBackend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_executor_refuses_guest_code() {
        let mut executor = NullExecutor::new();
        let mut cpu = CpuState::new();
        let memory = MemoryManager::new();

        let result = executor.run_function(&mut cpu, &memory, 0x8130_0000);
        assert!(matches!(result, Err(PpcError::NoBackend)));
    }
}
