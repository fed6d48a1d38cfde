use vmi_bridge_core::{
    DecodeError, EventReason as _, EventSingleStep, Pa, RawEvent, SingleStepMethod, Va, VcpuId,
    VmiError, VmiEvent,
};

use crate::{
    Aarch64, EventReason, EventTaskSwitch, TaskSwitchFeature, TaskSwitchFilter,
    TaskSwitchRegister,
    raw::{
        EVENT_DEBUG, EVENT_SLP, EVENT_TASK_SWITCH, RawDebugEvent, RawSlpEvent,
        RawTaskSwitchEvent,
    },
};

fn decode(raw: &RawEvent) -> Result<EventReason, VmiError> {
    match VmiEvent::<Aarch64>::decode(raw)? {
        VmiEvent::Cpu(reason) => Ok(reason),
        VmiEvent::System(event) => panic!("unexpected system event {event}"),
    }
}

fn task_switch(reg: u32) -> RawEvent {
    RawEvent::trap(
        EVENT_TASK_SWITCH,
        &RawTaskSwitchEvent {
            cpu_num: 0,
            reg,
            old_val: 0x40a1c000,
            new_val: 0x40b2d000,
        },
    )
}

///////////////////////////////////////////////////////////////////////////////
// Task Switch
///////////////////////////////////////////////////////////////////////////////

#[test]
fn task_switch_registers() -> Result<(), VmiError> {
    let cases = [
        (0, TaskSwitchRegister::Ttbr0),
        (1, TaskSwitchRegister::Ttbr1),
        (2, TaskSwitchRegister::Tcr),
    ];

    for (selector, register) in cases {
        let reason = decode(&task_switch(selector))?;

        assert_eq!(
            reason.as_task_switch(),
            Some(&EventTaskSwitch {
                vcpu_id: VcpuId(0),
                register,
                old_value: 0x40a1c000,
                new_value: 0x40b2d000,
            })
        );
        assert_eq!(register.selector(), selector);
    }

    Ok(())
}

#[test]
fn task_switch_unknown_register() {
    assert!(matches!(
        decode(&task_switch(3)),
        Err(VmiError::Decode(DecodeError::UnknownRegister(3)))
    ));
}

#[test]
fn task_switch_display() -> Result<(), VmiError> {
    assert_eq!(
        decode(&task_switch(1))?.to_string(),
        "TaskSwitch: cpu=0, reg=TTBR1, old_val=0x40a1c000, new_val=0x40b2d000"
    );

    Ok(())
}

#[test]
fn task_switch_filter() -> Result<(), VmiError> {
    let reason = decode(&task_switch(1))?;
    let event = reason.as_task_switch().expect("task switch");

    assert!(!TaskSwitchFilter::default().matches(event));
    assert!(
        TaskSwitchFilter::from(TaskSwitchFeature {
            enable: true,
            register: TaskSwitchRegister::Ttbr1,
        })
        .matches(event)
    );

    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Second-Level Paging and Debug
///////////////////////////////////////////////////////////////////////////////

#[test]
fn slp() -> Result<(), VmiError> {
    let raw = RawEvent::trap(
        EVENT_SLP,
        &RawSlpEvent {
            cpu_num: 1,
            x: 1,
            attempted_x: 1,
            gva: 0xffff000008081000,
            gpa: 0x40081000,
            ..Default::default()
        },
    );

    let reason = decode(&raw)?;
    assert_eq!(reason.vcpu_id(), VcpuId(1));
    assert_eq!(
        reason.to_string(),
        "SLP: cpu=1, gva=0xffff000008081000, gpa=0x40081000, r=false, w=false, x=true"
    );

    let raw = RawEvent::trap(
        EVENT_SLP,
        &RawSlpEvent {
            gva: u64::MAX,
            ..Default::default()
        },
    );
    assert_eq!(decode(&raw)?.as_slp().map(|slp| slp.va), Some(Some(Va(u64::MAX))));

    Ok(())
}

#[test]
fn debug() -> Result<(), VmiError> {
    let event = |single_step, watchpoint, breakpoint| {
        RawEvent::trap(
            EVENT_DEBUG,
            &RawDebugEvent {
                cpu_num: 0,
                single_step,
                watchpoint,
                breakpoint,
                _reserved: 0,
                gva: 0xffff000008081000,
                gpa: 0x40081000,
            },
        )
    };

    assert_eq!(
        decode(&event(1, 1, 1))?.as_single_step(),
        Some(&EventSingleStep {
            vcpu_id: VcpuId(0),
            method: SingleStepMethod::Debug,
        })
    );

    assert!(matches!(
        decode(&event(0, 1, 0)),
        Err(VmiError::NotImplemented { .. })
    ));

    let reason = decode(&event(0, 0, 1))?;
    let breakpoint = reason.as_breakpoint().expect("breakpoint");
    assert_eq!(breakpoint.va, Va(0xffff000008081000));
    assert_eq!(breakpoint.pa, Pa(0x40081000));

    Ok(())
}

#[test]
fn unknown_subtype() {
    // Monitor trap flag events only exist on AMD64.
    assert!(matches!(
        decode(&RawEvent::new(RawEvent::VMI, 3)),
        Err(VmiError::Decode(DecodeError::UnknownEventSubtype {
            arch: "aarch64",
            subtype: 3
        }))
    ));
}

#[test]
fn cpu_index_out_of_range() {
    let raw = RawEvent::trap(
        EVENT_TASK_SWITCH,
        &RawTaskSwitchEvent {
            cpu_num: 0x1_0000,
            ..Default::default()
        },
    );

    assert!(matches!(
        decode(&raw),
        Err(VmiError::Decode(DecodeError::InvalidVcpu(0x1_0000)))
    ));
}
