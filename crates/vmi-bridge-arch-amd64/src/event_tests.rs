use vmi_bridge_core::{
    DecodeError, EventBreakpoint, EventReason as _, EventSingleStep, MemoryAccess, Pa, RawEvent,
    SingleStepMethod, SystemEvent, Va, VcpuId, VmiError, VmiEvent,
};

use crate::{
    Amd64, Cr3, EventReason, EventTaskSwitch, TaskSwitchFeature, TaskSwitchFilter,
    raw::{
        EVENT_DEBUG, EVENT_MTF, EVENT_SLP, EVENT_TASK_SWITCH, GVA_UNKNOWN, RawDebugEvent,
        RawSlpEvent, RawTaskSwitchEvent,
    },
};

fn decode(raw: &RawEvent) -> Result<EventReason, VmiError> {
    match VmiEvent::<Amd64>::decode(raw)? {
        VmiEvent::Cpu(reason) => Ok(reason),
        VmiEvent::System(event) => panic!("unexpected system event {event}"),
    }
}

fn debug_event(single_step: u8, watchpoint: u8, breakpoint: u8) -> RawEvent {
    RawEvent::trap(
        EVENT_DEBUG,
        &RawDebugEvent {
            cpu_num: 3,
            single_step,
            watchpoint,
            breakpoint,
            _reserved: 0,
            gva: 0xfffff80000401000,
            gpa: 0x401000,
        },
    )
}

///////////////////////////////////////////////////////////////////////////////
// System Events
///////////////////////////////////////////////////////////////////////////////

#[test]
fn system_events() -> Result<(), VmiError> {
    let cases = [
        (RawEvent::VM_STOP, SystemEvent::VmStop),
        (RawEvent::VM_READY, SystemEvent::VmReady),
        (RawEvent::VM_SHUTDOWN, SystemEvent::VmShutdown),
    ];

    for (typ, expected) in cases {
        // The subtype and payload of system events are ignored.
        let event = VmiEvent::<Amd64>::decode(&RawEvent::new(typ, 0xdead))?;
        assert_eq!(event, VmiEvent::System(expected));
        assert_eq!(event.vcpu_id(), None);
    }

    Ok(())
}

#[test]
fn unknown_event_type() {
    assert!(matches!(
        VmiEvent::<Amd64>::decode(&RawEvent::new(4, 0)),
        Err(VmiError::Decode(DecodeError::UnknownEventType(4)))
    ));
}

#[test]
fn unknown_event_subtype() {
    assert!(matches!(
        decode(&RawEvent::new(RawEvent::VMI, 9)),
        Err(VmiError::Decode(DecodeError::UnknownEventSubtype {
            arch: "amd64",
            subtype: 9
        }))
    ));
}

#[test]
fn cpu_index_out_of_range() {
    let raw = RawEvent::trap(
        EVENT_SLP,
        &RawSlpEvent {
            cpu_num: 0x1_0000,
            ..Default::default()
        },
    );

    assert!(matches!(
        decode(&raw),
        Err(VmiError::Decode(DecodeError::InvalidVcpu(0x1_0000)))
    ));

    let raw = RawEvent::trap(
        EVENT_DEBUG,
        &RawDebugEvent {
            cpu_num: u32::MAX,
            single_step: 1,
            ..Default::default()
        },
    );

    assert!(matches!(
        decode(&raw),
        Err(VmiError::Decode(DecodeError::InvalidVcpu(u32::MAX)))
    ));
}

///////////////////////////////////////////////////////////////////////////////
// Task Switch
///////////////////////////////////////////////////////////////////////////////

#[test]
fn task_switch() -> Result<(), VmiError> {
    let raw = RawEvent::trap(
        EVENT_TASK_SWITCH,
        &RawTaskSwitchEvent {
            cpu_num: 1,
            _reserved: 0,
            old_cr3: 0x1aa000,
            new_cr3: 0x2bb000,
        },
    );

    let reason = decode(&raw)?;
    assert_eq!(reason.vcpu_id(), VcpuId(1));
    assert_eq!(
        reason.as_task_switch(),
        Some(&EventTaskSwitch {
            vcpu_id: VcpuId(1),
            old_cr3: Cr3(0x1aa000),
            new_cr3: Cr3(0x2bb000),
        })
    );
    assert_eq!(
        reason.to_string(),
        "TaskSwitch: cpu=1, outgoing_cr3=0x1aa000, incoming_cr3=0x2bb000"
    );

    Ok(())
}

#[test]
fn task_switch_filter() {
    let event = EventTaskSwitch {
        vcpu_id: VcpuId(0),
        old_cr3: Cr3(0x1000),
        new_cr3: Cr3(0x2000),
    };

    assert!(TaskSwitchFilter::default().matches(&event));

    let incoming = TaskSwitchFilter::from(TaskSwitchFeature {
        enable: true,
        cr3: Some(Cr3(0x2000)),
        incoming: true,
        outgoing: false,
    });
    assert!(incoming.matches(&event));

    let outgoing = TaskSwitchFilter {
        cr3: Some(Cr3(0x2000)),
        incoming: false,
        outgoing: true,
    };
    assert!(!outgoing.matches(&event));

    let outgoing = TaskSwitchFilter {
        cr3: Some(Cr3(0x1000)),
        ..outgoing
    };
    assert!(outgoing.matches(&event));

    let neither = TaskSwitchFilter {
        cr3: Some(Cr3(0x1000)),
        incoming: false,
        outgoing: false,
    };
    assert!(!neither.matches(&event));
}

///////////////////////////////////////////////////////////////////////////////
// Second-Level Paging
///////////////////////////////////////////////////////////////////////////////

#[test]
fn slp_flags_and_unknown_gva() -> Result<(), VmiError> {
    for bits in 0u8..8 {
        let (r, w, x) = (bits & 1, (bits >> 1) & 1, (bits >> 2) & 1);

        for gva in [GVA_UNKNOWN, 0x7ff612340000] {
            let raw = RawEvent::trap(
                EVENT_SLP,
                &RawSlpEvent {
                    cpu_num: 2,
                    r,
                    w,
                    x,
                    attempted_r: r,
                    attempted_w: w,
                    attempted_x: x,
                    _reserved: [0; 6],
                    gva,
                    gpa: 0x5000,
                },
            );

            let reason = decode(&raw)?;
            let slp = reason.as_slp().expect("slp event");

            assert_eq!(slp.vcpu_id, VcpuId(2));
            assert_eq!(slp.pa, Pa(0x5000));
            assert_eq!(slp.access, MemoryAccess::from_bits_truncate(bits));
            assert_eq!(slp.attempted, slp.access);
            assert_eq!(slp.is_rwx(), bits == 0b111);

            match gva {
                GVA_UNKNOWN => assert_eq!(slp.va, None),
                gva => assert_eq!(slp.va, Some(Va(gva))),
            }
        }
    }

    Ok(())
}

#[test]
fn slp_display() -> Result<(), VmiError> {
    let raw = RawEvent::trap(
        EVENT_SLP,
        &RawSlpEvent {
            cpu_num: 0,
            r: 0,
            w: 1,
            x: 0,
            attempted_r: 1,
            attempted_w: 1,
            attempted_x: 1,
            _reserved: [0; 6],
            gva: GVA_UNKNOWN,
            gpa: 0x1234,
        },
    );

    assert_eq!(
        decode(&raw)?.to_string(),
        "SLP: cpu=0, gva=-, gpa=0x1234, r=false, w=true, x=false RWX"
    );

    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Debug
///////////////////////////////////////////////////////////////////////////////

#[test]
fn single_step_takes_priority() -> Result<(), VmiError> {
    for (watchpoint, breakpoint) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let reason = decode(&debug_event(1, watchpoint, breakpoint))?;

        assert_eq!(
            reason,
            EventReason::SingleStep(EventSingleStep {
                vcpu_id: VcpuId(3),
                method: SingleStepMethod::Debug,
            })
        );
    }

    Ok(())
}

#[test]
fn watchpoint_is_not_implemented() {
    for breakpoint in [0, 1] {
        assert!(matches!(
            decode(&debug_event(0, 1, breakpoint)),
            Err(VmiError::NotImplemented {
                vcpu_id: VcpuId(3),
                ..
            })
        ));
    }
}

#[test]
fn breakpoint() -> Result<(), VmiError> {
    let reason = decode(&debug_event(0, 0, 1))?;

    assert_eq!(
        reason.as_breakpoint(),
        Some(&EventBreakpoint {
            vcpu_id: VcpuId(3),
            va: Va(0xfffff80000401000),
            pa: Pa(0x401000),
        })
    );
    assert_eq!(
        reason.to_string(),
        "Breakpoint: cpu=3, gva=0xfffff80000401000, gpa=0x401000"
    );

    Ok(())
}

#[test]
fn monitor_trap_flag() -> Result<(), VmiError> {
    let raw = RawEvent::trap(
        EVENT_MTF,
        &RawDebugEvent {
            cpu_num: 5,
            ..Default::default()
        },
    );

    let reason = decode(&raw)?;
    assert_eq!(
        reason.as_single_step(),
        Some(&EventSingleStep {
            vcpu_id: VcpuId(5),
            method: SingleStepMethod::Mtf,
        })
    );
    assert_eq!(reason.to_string(), "SingleStep: Mtf: cpu=5");

    Ok(())
}
