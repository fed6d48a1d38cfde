use vmi_bridge_core::{Pa, RegisterBlock, Va, VmiError};

use crate::{
    Amd64, Cr0, Cr2, Cr3, Cr4, DescriptorTable, RawRegisters, RawSegment, Rflags,
    SegmentDescriptor,
    raw::{CS, DS, ES, FS, GS, RAX, RBP, RBX, RCX, RDI, RDX, RSI, RSP, SS},
};

macro_rules! gp_registers {
    ($($get:ident, $set:ident => $index:expr;)*) => {
        $(
            #[doc = concat!("Returns the value of `", stringify!($get), "`.")]
            pub fn $get(&self) -> Result<u64, VmiError> {
                self.block.get(|r| &r.regs[$index])
            }

            #[doc = concat!("Sets the value of `", stringify!($get), "`.")]
            pub fn $set(&self, value: u64) -> Result<(), VmiError> {
                self.block.set(|r| &mut r.regs[$index], value)
            }
        )*
    };
}

macro_rules! control_registers {
    ($($get:ident, $set:ident, $ty:ident => $index:expr;)*) => {
        $(
            #[doc = concat!("Returns the value of `", stringify!($get), "`.")]
            pub fn $get(&self) -> Result<$ty, VmiError> {
                self.block.get(|r| &r.cr[$index]).map($ty)
            }

            #[doc = concat!("Sets the value of `", stringify!($get), "`.")]
            pub fn $set(&self, value: $ty) -> Result<(), VmiError> {
                self.block.set(|r| &mut r.cr[$index], value.0)
            }
        )*
    };
}

macro_rules! segment_registers {
    ($($get:ident, $set:ident => $index:expr;)*) => {
        $(
            #[doc = concat!("Returns the `", stringify!($get), "` segment register.")]
            pub fn $get(&self) -> Result<SegmentDescriptor, VmiError> {
                self.block.get(|r| &r.segs[$index]).map(SegmentDescriptor::from)
            }

            #[doc = concat!("Sets the `", stringify!($get), "` segment register.")]
            pub fn $set(&self, value: SegmentDescriptor) -> Result<(), VmiError> {
                self.block.set(|r| &mut r.segs[$index], RawSegment::from(value))
            }
        )*
    };
}

/// Register proxy of an AMD64 vCPU.
///
/// Every accessor goes straight to the hypervisor-owned register block and
/// fails with [`VmiError::StaleRegisters`] after the VM resumed.
#[derive(Debug)]
pub struct Registers {
    block: RegisterBlock<RawRegisters>,
}

impl Registers {
    gp_registers! {
        rax, set_rax => RAX;
        rbx, set_rbx => RBX;
        rcx, set_rcx => RCX;
        rdx, set_rdx => RDX;
        rsi, set_rsi => RSI;
        rdi, set_rdi => RDI;
        rbp, set_rbp => RBP;
        rsp, set_rsp => RSP;
        r8, set_r8 => 8;
        r9, set_r9 => 9;
        r10, set_r10 => 10;
        r11, set_r11 => 11;
        r12, set_r12 => 12;
        r13, set_r13 => 13;
        r14, set_r14 => 14;
        r15, set_r15 => 15;
    }

    control_registers! {
        cr0, set_cr0, Cr0 => 0;
        cr2, set_cr2, Cr2 => 2;
        cr3, set_cr3, Cr3 => 3;
        cr4, set_cr4, Cr4 => 4;
    }

    segment_registers! {
        es, set_es => ES;
        cs, set_cs => CS;
        ss, set_ss => SS;
        ds, set_ds => DS;
        fs, set_fs => FS;
        gs, set_gs => GS;
    }

    /// Returns the value of `rip`.
    pub fn rip(&self) -> Result<u64, VmiError> {
        self.block.get(|r| &r.rip)
    }

    /// Sets the value of `rip`.
    pub fn set_rip(&self, value: u64) -> Result<(), VmiError> {
        self.block.set(|r| &mut r.rip, value)
    }

    /// Returns the low 32 bits of `rip`.
    pub fn eip(&self) -> Result<u32, VmiError> {
        self.rip().map(|rip| rip as u32)
    }

    /// Sets `rip` to the zero-extended `value`.
    pub fn set_eip(&self, value: u32) -> Result<(), VmiError> {
        self.set_rip(value as u64)
    }

    /// Returns the value of `rflags`.
    pub fn rflags(&self) -> Result<Rflags, VmiError> {
        self.block.get(|r| &r.rflags).map(Rflags)
    }

    /// Sets the value of `rflags`.
    pub fn set_rflags(&self, value: Rflags) -> Result<(), VmiError> {
        self.block.set(|r| &mut r.rflags, value.0)
    }

    /// Returns the local descriptor table register.
    pub fn ldtr(&self) -> Result<SegmentDescriptor, VmiError> {
        self.block.get(|r| &r.ldt).map(SegmentDescriptor::from)
    }

    /// Sets the local descriptor table register.
    pub fn set_ldtr(&self, value: SegmentDescriptor) -> Result<(), VmiError> {
        self.block.set(|r| &mut r.ldt, RawSegment::from(value))
    }

    /// Returns the task register.
    pub fn tr(&self) -> Result<SegmentDescriptor, VmiError> {
        self.block.get(|r| &r.tr).map(SegmentDescriptor::from)
    }

    /// Sets the task register.
    pub fn set_tr(&self, value: SegmentDescriptor) -> Result<(), VmiError> {
        self.block.set(|r| &mut r.tr, RawSegment::from(value))
    }

    /// Returns the global descriptor table register.
    pub fn gdtr(&self) -> Result<DescriptorTable, VmiError> {
        self.block.get(|r| &r.gdt).map(DescriptorTable::from)
    }

    /// Sets the base and limit of the global descriptor table register.
    pub fn set_gdtr(&self, value: DescriptorTable) -> Result<(), VmiError> {
        self.block.set(|r| &mut r.gdt.base, value.base)?;
        self.block.set(|r| &mut r.gdt.limit, value.limit)
    }

    /// Returns the interrupt descriptor table register.
    pub fn idtr(&self) -> Result<DescriptorTable, VmiError> {
        self.block.get(|r| &r.idt).map(DescriptorTable::from)
    }

    /// Sets the base and limit of the interrupt descriptor table register.
    pub fn set_idtr(&self, value: DescriptorTable) -> Result<(), VmiError> {
        self.block.set(|r| &mut r.idt.base, value.base)?;
        self.block.set(|r| &mut r.idt.limit, value.limit)
    }

    /// Returns a copy of the whole register block.
    pub fn snapshot(&self) -> Result<RawRegisters, VmiError> {
        self.block.get(|r| r)
    }
}

impl vmi_bridge_core::Registers for Registers {
    type Architecture = Amd64;
    type Raw = RawRegisters;

    fn new(block: RegisterBlock<RawRegisters>) -> Self {
        Self { block }
    }

    fn block(&self) -> &RegisterBlock<RawRegisters> {
        &self.block
    }

    fn instruction_pointer(&self) -> Result<u64, VmiError> {
        self.rip()
    }

    fn set_instruction_pointer(&self, ip: u64) -> Result<(), VmiError> {
        self.set_rip(ip)
    }

    fn stack_pointer(&self) -> Result<u64, VmiError> {
        self.rsp()
    }

    fn set_stack_pointer(&self, sp: u64) -> Result<(), VmiError> {
        self.set_rsp(sp)
    }

    fn result(&self) -> Result<u64, VmiError> {
        self.rax()
    }

    fn set_result(&self, result: u64) -> Result<(), VmiError> {
        self.set_rax(result)
    }

    fn address_width(&self) -> Result<usize, VmiError> {
        if self.cs()?.flags.long_mode() {
            return Ok(8);
        }

        Ok(4)
    }

    fn page_table_base(&self, _va: Va) -> Result<Pa, VmiError> {
        self.cr3().map(|cr3| Pa(cr3.0))
    }

    fn dump(&self) -> Result<String, VmiError> {
        Ok(RegisterDump(self.snapshot()?).to_string())
    }
}

/// Text rendering of a register block.
pub struct RegisterDump(pub RawRegisters);

impl std::fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        const GP: [(&str, usize); 16] = [
            ("rax", RAX),
            ("rbx", RBX),
            ("rcx", RCX),
            ("rdx", RDX),
            ("rsi", RSI),
            ("rdi", RDI),
            ("rbp", RBP),
            ("rsp", RSP),
            ("r8", 8),
            ("r9", 9),
            ("r10", 10),
            ("r11", 11),
            ("r12", 12),
            ("r13", 13),
            ("r14", 14),
            ("r15", 15),
        ];

        const SEGMENTS: [(&str, usize); 6] = [
            ("es", ES),
            ("cs", CS),
            ("ss", SS),
            ("ds", DS),
            ("fs", FS),
            ("gs", GS),
        ];

        let raw = &self.0;

        for row in GP.chunks(4) {
            let mut separator = "";
            for (name, index) in row {
                write!(f, "{separator}{name:<3}={:016x}", raw.regs[*index])?;
                separator = " ";
            }
            writeln!(f)?;
        }

        writeln!(f, "rip={:016x} rfl={:016x}", raw.rip, raw.rflags)?;
        writeln!(
            f,
            "cr0={:016x} cr2={:016x} cr3={:016x} cr4={:016x}",
            raw.cr[0], raw.cr[2], raw.cr[3], raw.cr[4]
        )?;

        let segments = SEGMENTS
            .iter()
            .map(|(name, index)| (*name, &raw.segs[*index]))
            .chain([("ldt", &raw.ldt), ("tr", &raw.tr)]);

        for (name, segment) in segments {
            writeln!(
                f,
                "{name:<3}={:04x} {:016x} {:08x} {:08x}",
                segment.selector, segment.base, segment.limit, segment.flags
            )?;
        }

        writeln!(f, "gdt=     {:016x} {:08x}", raw.gdt.base, raw.gdt.limit)?;
        writeln!(f, "idt=     {:016x} {:08x}", raw.idt.base, raw.idt.limit)
    }
}
