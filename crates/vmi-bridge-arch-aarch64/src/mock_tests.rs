use std::{
    cell::{Cell, RefCell, UnsafeCell},
    ptr::NonNull,
    time::Duration,
};

use vmi_bridge_core::{
    MemoryAccess, Pa, RawEvent, RawFeatureRequest, Va, VcpuId, VmiConfig, VmiDriver, VmiError,
    VmiInfo, VmiSession, WaitError, WaitStatus,
};

use crate::{Aarch64, RawRegisters};

pub struct MockDriver {
    registers: Vec<UnsafeCell<RawRegisters>>,
    pub features: RefCell<Vec<(Option<VcpuId>, RawFeatureRequest)>>,
    pub waits: Cell<usize>,
}

impl MockDriver {
    pub fn new(registers: RawRegisters) -> Self {
        Self {
            registers: vec![UnsafeCell::new(registers)],
            features: RefCell::new(Vec::new()),
            waits: Cell::new(0),
        }
    }

    pub fn raw_registers(&self) -> RawRegisters {
        // SAFETY: No proxy is accessing the block while the test inspects it.
        unsafe { *self.registers[0].get() }
    }
}

unsafe impl VmiDriver for MockDriver {
    type Architecture = Aarch64;

    fn info(&self) -> VmiInfo {
        VmiInfo {
            page_size: 0x1000,
            page_shift: 12,
            ram_size: 0x10000,
            vcpus: 1,
        }
    }

    fn start(&self) {}

    fn stop(&self) {}

    fn wait_event(&self, _timeout: Option<Duration>) -> Result<WaitStatus, WaitError> {
        self.waits.set(self.waits.get() + 1);
        Ok(WaitStatus::Timeout)
    }

    fn event(&self) -> Option<NonNull<RawEvent>> {
        None
    }

    fn registers(&self, vcpu_id: VcpuId) -> Option<NonNull<RawRegisters>> {
        let cell = self.registers.get(vcpu_id.0 as usize)?;
        NonNull::new(cell.get())
    }

    fn read_physical(&self, _pa: Pa, _buffer: &mut [u8]) -> i32 {
        -14
    }

    fn write_physical(&self, _pa: Pa, _buffer: &[u8]) -> i32 {
        -14
    }

    fn translate(&self, _va: Va, _root: Pa) -> u64 {
        u64::MAX
    }

    fn update_feature(&self, request: &RawFeatureRequest) -> i32 {
        self.features.borrow_mut().push((None, *request));
        0
    }

    fn update_feature_vcpu(&self, vcpu_id: VcpuId, request: &RawFeatureRequest) -> i32 {
        self.features.borrow_mut().push((Some(vcpu_id), *request));
        0
    }

    fn update_slp(&self, _pa: Pa, _access: MemoryAccess) -> i32 {
        0
    }

    fn update_slp_vcpu(&self, _vcpu_id: VcpuId, _pa: Pa, _access: MemoryAccess) -> i32 {
        0
    }

    fn request_stop(&self) {}

    fn request_shutdown(&self) {}
}

pub fn session(registers: RawRegisters) -> Result<VmiSession<MockDriver>, VmiError> {
    VmiSession::new(MockDriver::new(registers), VmiConfig::default())
}
