use vmi_bridge_core::{Pa, RawEvent, Registers as _, Va, VcpuId, VmiError, WaitStatus};

use crate::{
    Cr0, Cr2, Cr3, Cr4, DescriptorTable, RawRegisters, RawSegment, RegisterDump, Rflags,
    SegmentDescriptor, SegmentFlags, Selector,
    mock_tests::{MockDriver, session},
    raw::CS,
};

fn sample_registers() -> RawRegisters {
    let mut raw = RawRegisters::default();

    for (index, value) in raw.regs.iter_mut().enumerate() {
        *value = index as u64 + 1;
    }

    raw.rip = 0xfffff80000401000;
    raw.rflags = 0x246;
    raw.segs[CS] = RawSegment {
        selector: 0x10,
        _reserved: 0,
        base: 0,
        limit: 0xffffffff,
        flags: 0x209b00,
    };
    raw.gdt = RawSegment {
        base: 0xfffff80000001000,
        limit: 0x57,
        ..Default::default()
    };
    raw.cr = [0x80050033, 0, 0x7ff000, 0x1aa000, 0x370678];
    raw
}

///////////////////////////////////////////////////////////////////////////////
// Accessors
///////////////////////////////////////////////////////////////////////////////

macro_rules! assert_round_trip {
    ($registers:expr; $($get:ident, $set:ident => $value:expr;)*) => {
        $(
            $registers.$set($value)?;
            assert_eq!($registers.$get()?, $value, stringify!($get));
        )*
    };
}

#[test]
fn every_register_round_trips() -> Result<(), VmiError> {
    let session = session(MockDriver::new(1))?;
    let registers = session.registers(VcpuId(0))?;

    let segment = SegmentDescriptor {
        selector: Selector(0x2b),
        base: 0x7ff600000000,
        limit: 0xfffff,
        flags: SegmentFlags(0xcff300),
    };

    let table = DescriptorTable {
        base: 0xfffff80000002000,
        limit: 0xfff,
    };

    assert_round_trip! {
        registers;
        rax, set_rax => 0x1111;
        rbx, set_rbx => 0x2222;
        rcx, set_rcx => 0x3333;
        rdx, set_rdx => 0x4444;
        rsi, set_rsi => 0x5555;
        rdi, set_rdi => 0x6666;
        rbp, set_rbp => 0x7777;
        rsp, set_rsp => 0x8888;
        r8, set_r8 => 0x8;
        r9, set_r9 => 0x9;
        r10, set_r10 => 0x10;
        r11, set_r11 => 0x11;
        r12, set_r12 => 0x12;
        r13, set_r13 => 0x13;
        r14, set_r14 => 0x14;
        r15, set_r15 => u64::MAX;
        rip, set_rip => 0xfffff80000401000;
        rflags, set_rflags => Rflags(0x202);
        cr0, set_cr0 => Cr0(0x80050033);
        cr2, set_cr2 => Cr2(0xdead000);
        cr3, set_cr3 => Cr3(0x1aa000);
        cr4, set_cr4 => Cr4(0x370678);
        es, set_es => segment;
        cs, set_cs => segment;
        ss, set_ss => segment;
        ds, set_ds => segment;
        fs, set_fs => segment;
        gs, set_gs => segment;
        ldtr, set_ldtr => segment;
        tr, set_tr => segment;
        gdtr, set_gdtr => table;
        idtr, set_idtr => table;
    }

    assert!(registers.is_dirty());

    let raw = session.driver().raw_registers(0);
    assert_eq!(raw.regs[0], 0x1111);
    assert_eq!(raw.regs[3], 0x2222);
    assert_eq!(raw.regs[15], u64::MAX);
    assert_eq!(raw.cr[3], 0x1aa000);
    assert_eq!(raw.segs[CS].selector, 0x2b);
    assert_eq!(raw.idt.base, 0xfffff80000002000);

    Ok(())
}

#[test]
fn eip_is_the_low_half_of_rip() -> Result<(), VmiError> {
    let session = session(MockDriver::new(1))?;
    let registers = session.registers(VcpuId(0))?;

    registers.set_rip(0xfffff80012345678)?;
    assert_eq!(registers.eip()?, 0x12345678);

    registers.set_eip(0x401000)?;
    assert_eq!(registers.rip()?, 0x401000);

    Ok(())
}

#[test]
fn generic_accessors() -> Result<(), VmiError> {
    let driver = MockDriver::new(1);
    driver.set_raw_registers(0, sample_registers());

    let session = session(driver)?;
    let registers = session.registers(VcpuId(0))?;

    assert_eq!(registers.instruction_pointer()?, 0xfffff80000401000);
    assert_eq!(registers.stack_pointer()?, 5);
    assert_eq!(registers.result()?, 1);
    assert_eq!(registers.page_table_base(Va(0x1000))?, Pa(0x1aa000));
    assert_eq!(registers.address_width()?, 8);
    assert!(registers.cs()?.flags.long_mode());
    assert!(registers.rflags()?.interrupt_enable());
    assert!(registers.cr0()?.paging());

    registers.set_instruction_pointer(0x1000)?;
    registers.set_stack_pointer(0x2000)?;
    registers.set_result(0x3000)?;

    let raw = session.driver().raw_registers(0);
    assert_eq!(raw.rip, 0x1000);
    assert_eq!(raw.regs[4], 0x2000);
    assert_eq!(raw.regs[0], 0x3000);

    Ok(())
}

#[test]
fn compatibility_mode_uses_narrow_pointers() -> Result<(), VmiError> {
    let mut raw = sample_registers();
    raw.segs[CS].flags = 0xcf9b00;

    let driver = MockDriver::new(1);
    driver.set_raw_registers(0, raw);

    let session = session(driver)?;
    assert_eq!(session.registers(VcpuId(0))?.address_width()?, 4);

    Ok(())
}

#[test]
fn descriptor_tables_keep_selector_and_flags() -> Result<(), VmiError> {
    let mut raw = sample_registers();
    raw.gdt.selector = 0x28;
    raw.gdt.flags = 0x8b00;
    raw.idt = RawSegment {
        selector: 0x30,
        flags: 0x8e00,
        ..Default::default()
    };

    let driver = MockDriver::new(1);
    driver.set_raw_registers(0, raw);

    let session = session(driver)?;
    let registers = session.registers(VcpuId(0))?;

    let table = DescriptorTable {
        base: 0xfffff80000003000,
        limit: 0xfff,
    };
    registers.set_gdtr(table)?;
    registers.set_idtr(table)?;

    let raw = session.driver().raw_registers(0);
    assert_eq!((raw.gdt.base, raw.gdt.limit), (0xfffff80000003000, 0xfff));
    assert_eq!((raw.gdt.selector, raw.gdt.flags), (0x28, 0x8b00));
    assert_eq!((raw.idt.base, raw.idt.limit), (0xfffff80000003000, 0xfff));
    assert_eq!((raw.idt.selector, raw.idt.flags), (0x30, 0x8e00));

    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Dump
///////////////////////////////////////////////////////////////////////////////

#[test]
fn dump() -> Result<(), VmiError> {
    let driver = MockDriver::new(1);
    driver.set_raw_registers(0, sample_registers());

    let session = session(driver)?;
    let dump = session.registers(VcpuId(0))?.dump()?;

    let expected = concat!(
        "rax=0000000000000001 rbx=0000000000000004 rcx=0000000000000002 rdx=0000000000000003\n",
        "rsi=0000000000000007 rdi=0000000000000008 rbp=0000000000000006 rsp=0000000000000005\n",
        "r8 =0000000000000009 r9 =000000000000000a r10=000000000000000b r11=000000000000000c\n",
        "r12=000000000000000d r13=000000000000000e r14=000000000000000f r15=0000000000000010\n",
        "rip=fffff80000401000 rfl=0000000000000246\n",
        "cr0=0000000080050033 cr2=00000000007ff000 cr3=00000000001aa000 cr4=0000000000370678\n",
        "es =0000 0000000000000000 00000000 00000000\n",
        "cs =0010 0000000000000000 ffffffff 00209b00\n",
        "ss =0000 0000000000000000 00000000 00000000\n",
        "ds =0000 0000000000000000 00000000 00000000\n",
        "fs =0000 0000000000000000 00000000 00000000\n",
        "gs =0000 0000000000000000 00000000 00000000\n",
        "ldt=0000 0000000000000000 00000000 00000000\n",
        "tr =0000 0000000000000000 00000000 00000000\n",
        "gdt=     fffff80000001000 00000057\n",
        "idt=     0000000000000000 00000000\n",
    );

    assert_eq!(dump, expected);
    assert_eq!(RegisterDump(sample_registers()).to_string(), expected);

    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Binding
///////////////////////////////////////////////////////////////////////////////

#[test]
fn writes_land_in_the_hypervisor_block_until_resume() -> Result<(), VmiError> {
    let driver = MockDriver::new(2);
    driver.push(Ok(WaitStatus::Paused), Some(RawEvent::new(RawEvent::VM_READY, 0)));

    let session = session(driver)?;
    let registers = session.registers(VcpuId(1))?;
    registers.set_rip(0x1000)?;

    assert_eq!(session.driver().raw_registers(1).rip, 0x1000);
    assert_eq!(session.driver().raw_registers(0).rip, 0);

    session.wait_event(None)?;

    assert!(!registers.is_bound());
    assert!(matches!(
        registers.rip(),
        Err(VmiError::StaleRegisters(VcpuId(1)))
    ));
    assert!(matches!(
        registers.set_rip(0x2000),
        Err(VmiError::StaleRegisters(VcpuId(1)))
    ));

    // The hypervisor block keeps the last value written while bound.
    assert_eq!(session.driver().raw_registers(1).rip, 0x1000);

    let registers = session.registers(VcpuId(1))?;
    assert!(!registers.is_dirty());
    assert_eq!(registers.rip()?, 0x1000);

    Ok(())
}
