use vmi_bridge_core::{Pa, RegisterBlock, Va, VmiError};

use crate::{
    Aarch64, RawRegisters, Tcr,
    raw::SP,
};

/// Bits of a `TTBRx` value below the translation table base address.
const TTBR_BADDR_MASK: u64 = !0xfff;

macro_rules! registers {
    ($($get:ident, $set:ident => $field:ident $([$index:expr])?;)*) => {
        $(
            #[doc = concat!("Returns the value of `", stringify!($get), "`.")]
            pub fn $get(&self) -> Result<u64, VmiError> {
                self.block.get(|r| &r.$field$([$index])?)
            }

            #[doc = concat!("Sets the value of `", stringify!($get), "`.")]
            pub fn $set(&self, value: u64) -> Result<(), VmiError> {
                self.block.set(|r| &mut r.$field$([$index])?, value)
            }
        )*
    };
}

/// Register proxy of an AArch64 vCPU.
///
/// Every accessor goes straight to the hypervisor-owned register block and
/// fails with [`VmiError::StaleRegisters`] after the VM resumed.
#[derive(Debug)]
pub struct Registers {
    block: RegisterBlock<RawRegisters>,
}

impl Registers {
    registers! {
        r0, set_r0 => xregs[0];
        r1, set_r1 => xregs[1];
        r2, set_r2 => xregs[2];
        r3, set_r3 => xregs[3];
        r4, set_r4 => xregs[4];
        r5, set_r5 => xregs[5];
        r6, set_r6 => xregs[6];
        r7, set_r7 => xregs[7];
        r8, set_r8 => xregs[8];
        r9, set_r9 => xregs[9];
        r10, set_r10 => xregs[10];
        r11, set_r11 => xregs[11];
        r12, set_r12 => xregs[12];
        r13, set_r13 => xregs[13];
        r14, set_r14 => xregs[14];
        r15, set_r15 => xregs[15];
        r16, set_r16 => xregs[16];
        r17, set_r17 => xregs[17];
        r18, set_r18 => xregs[18];
        r19, set_r19 => xregs[19];
        r20, set_r20 => xregs[20];
        r21, set_r21 => xregs[21];
        r22, set_r22 => xregs[22];
        r23, set_r23 => xregs[23];
        r24, set_r24 => xregs[24];
        r25, set_r25 => xregs[25];
        r26, set_r26 => xregs[26];
        r27, set_r27 => xregs[27];
        r28, set_r28 => xregs[28];
        r29, set_r29 => xregs[29];
        r30, set_r30 => xregs[30];
        r31, set_r31 => xregs[SP];
        pc, set_pc => pc;
        sp_el0, set_sp_el0 => sp_el[0];
        sp_el1, set_sp_el1 => sp_el[1];
        sp_el2, set_sp_el2 => sp_el[2];
        sp_el3, set_sp_el3 => sp_el[3];
        ttbr0_el0, set_ttbr0_el0 => ttbr0_el[0];
        ttbr0_el1, set_ttbr0_el1 => ttbr0_el[1];
        ttbr0_el2, set_ttbr0_el2 => ttbr0_el[2];
        ttbr0_el3, set_ttbr0_el3 => ttbr0_el[3];
        ttbr1_el0, set_ttbr1_el0 => ttbr1_el[0];
        ttbr1_el1, set_ttbr1_el1 => ttbr1_el[1];
        ttbr1_el2, set_ttbr1_el2 => ttbr1_el[2];
        ttbr1_el3, set_ttbr1_el3 => ttbr1_el[3];
        tcr_el0, set_tcr_el0 => tcr_el[0];
        tcr_el1, set_tcr_el1 => tcr_el[1];
        tcr_el2, set_tcr_el2 => tcr_el[2];
        tcr_el3, set_tcr_el3 => tcr_el[3];
    }

    /// Returns `TCR_EL1`.
    pub fn tcr(&self) -> Result<Tcr, VmiError> {
        self.tcr_el1().map(Tcr)
    }

    /// Returns the T0SZ field of `TCR_EL1`.
    pub fn t0sz(&self) -> Result<u8, VmiError> {
        self.tcr().map(Tcr::t0sz)
    }

    /// Returns a copy of the whole register block.
    pub fn snapshot(&self) -> Result<RawRegisters, VmiError> {
        self.block.get(|r| r)
    }
}

impl vmi_bridge_core::Registers for Registers {
    type Architecture = Aarch64;
    type Raw = RawRegisters;

    fn new(block: RegisterBlock<RawRegisters>) -> Self {
        Self { block }
    }

    fn block(&self) -> &RegisterBlock<RawRegisters> {
        &self.block
    }

    fn instruction_pointer(&self) -> Result<u64, VmiError> {
        self.pc()
    }

    fn set_instruction_pointer(&self, ip: u64) -> Result<(), VmiError> {
        self.set_pc(ip)
    }

    fn stack_pointer(&self) -> Result<u64, VmiError> {
        self.r31()
    }

    fn set_stack_pointer(&self, sp: u64) -> Result<(), VmiError> {
        self.set_r31(sp)
    }

    fn result(&self) -> Result<u64, VmiError> {
        self.r0()
    }

    fn set_result(&self, result: u64) -> Result<(), VmiError> {
        self.set_r0(result)
    }

    fn address_width(&self) -> Result<usize, VmiError> {
        Ok(8)
    }

    fn page_table_base(&self, va: Va) -> Result<Pa, VmiError> {
        let ttbr = if va.0 & self.tcr()?.ttbr1_mask() != 0 {
            self.ttbr1_el1()?
        }
        else {
            self.ttbr0_el1()?
        };

        Ok(Pa(ttbr & TTBR_BADDR_MASK))
    }

    fn dump(&self) -> Result<String, VmiError> {
        Ok(RegisterDump(self.snapshot()?).to_string())
    }
}

/// Text rendering of a register block.
pub struct RegisterDump(pub RawRegisters);

impl std::fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let raw = &self.0;

        for (row, values) in raw.xregs.chunks(4).enumerate() {
            let mut separator = "";
            for (column, value) in values.iter().enumerate() {
                let name = format!("r{}", row * 4 + column);
                write!(f, "{separator}{name:<3}={value:016x}")?;
                separator = " ";
            }
            writeln!(f)?;
        }

        writeln!(f, "pc ={:016x}", raw.pc)?;

        let banks = [
            ("sp", &raw.sp_el),
            ("ttbr0", &raw.ttbr0_el),
            ("ttbr1", &raw.ttbr1_el),
            ("tcr", &raw.tcr_el),
        ];

        for (name, bank) in banks {
            let mut separator = "";
            for (el, value) in bank.iter().enumerate() {
                write!(f, "{separator}{name}_el{el}={value:016x}")?;
                separator = " ";
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
