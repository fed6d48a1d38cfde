use vmi_bridge_core::{VcpuId, VmiError, WaitStatus};

use crate::{
    LbrMonitor, LbrSelect, LbrState,
    mock_tests::{MockDriver, session},
    raw::{FEATURE_LBR, RawLbrFeature, RawLbrState},
};

fn lbr_requests(driver: &MockDriver) -> Vec<(Option<VcpuId>, bool)> {
    driver
        .features
        .borrow()
        .iter()
        .filter(|(_, request)| request.feature == FEATURE_LBR)
        .map(|(vcpu_id, request)| {
            let payload = request.payload::<RawLbrFeature>().unwrap_or_default();
            (*vcpu_id, payload.enable != 0)
        })
        .collect()
}

///////////////////////////////////////////////////////////////////////////////
// Reference Counting
///////////////////////////////////////////////////////////////////////////////

#[test]
fn enable_is_sent_on_first_user_only() -> Result<(), VmiError> {
    let session = session(MockDriver::new(2))?;
    let monitor = LbrMonitor::new(2);

    monitor.enable(&session, Some(VcpuId(0)))?;
    monitor.enable(&session, Some(VcpuId(0)))?;
    assert_eq!(monitor.refcount(VcpuId(0)), 2);
    assert_eq!(monitor.refcount(VcpuId(1)), 0);

    monitor.disable(&session, Some(VcpuId(0)))?;
    assert!(monitor.is_enabled(VcpuId(0)));

    monitor.disable(&session, Some(VcpuId(0)))?;
    assert!(!monitor.is_enabled(VcpuId(0)));

    assert_eq!(
        lbr_requests(session.driver()),
        [(Some(VcpuId(0)), true), (Some(VcpuId(0)), false)]
    );

    Ok(())
}

#[test]
fn all_vcpus() -> Result<(), VmiError> {
    let session = session(MockDriver::new(2))?;
    let monitor = LbrMonitor::new(2).with_select(LbrSelect::CPL_NEQ_0 | LbrSelect::JCC);

    monitor.enable(&session, Some(VcpuId(1)))?;
    monitor.enable(&session, None)?;
    assert_eq!(monitor.refcount(VcpuId(0)), 1);
    assert_eq!(monitor.refcount(VcpuId(1)), 2);

    // vCPU 1 keeps a user, vCPU 0 drops to zero.
    monitor.disable(&session, None)?;
    assert!(!monitor.is_enabled(VcpuId(0)));
    assert!(monitor.is_enabled(VcpuId(1)));

    assert_eq!(
        lbr_requests(session.driver()),
        [(Some(VcpuId(1)), true), (None, true), (None, false)]
    );

    let features = session.driver().features.borrow();
    let select = features[0].1.payload::<RawLbrFeature>().map(|raw| raw.select);
    assert_eq!(select, Some(0b110));

    Ok(())
}

#[test]
fn disable_without_users_is_a_no_op() -> Result<(), VmiError> {
    let session = session(MockDriver::new(1))?;
    let monitor = LbrMonitor::new(1);

    monitor.disable(&session, Some(VcpuId(0)))?;
    assert_eq!(monitor.refcount(VcpuId(0)), 0);
    assert!(lbr_requests(session.driver()).is_empty());

    Ok(())
}

#[test]
fn unknown_vcpu() -> Result<(), VmiError> {
    let session = session(MockDriver::new(1))?;
    let monitor = LbrMonitor::new(1);

    assert!(matches!(
        monitor.enable(&session, Some(VcpuId(4))),
        Err(VmiError::InvalidVcpu(VcpuId(4)))
    ));
    assert!(session.driver().features.borrow().is_empty());

    Ok(())
}

#[test]
fn failed_enable_keeps_counts() -> Result<(), VmiError> {
    let driver = MockDriver::new(1);
    driver.feature_code.set(-1);

    let session = session(driver)?;
    let monitor = LbrMonitor::new(1);

    assert!(matches!(
        monitor.enable(&session, Some(VcpuId(0))),
        Err(VmiError::Feature {
            feature: "lbr",
            code: -1
        })
    ));
    assert_eq!(monitor.refcount(VcpuId(0)), 0);

    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Snapshots
///////////////////////////////////////////////////////////////////////////////

#[test]
fn snapshot_requires_enabled_lbr() -> Result<(), VmiError> {
    let session = session(MockDriver::new(1))?;
    let monitor = LbrMonitor::new(1);

    assert!(matches!(
        monitor.lbr(&session, VcpuId(0)),
        Err(VmiError::LbrNotEnabled(VcpuId(0)))
    ));
    assert_eq!(session.driver().lbr_calls.get(), 0);

    Ok(())
}

#[test]
fn snapshot_is_cached_until_resume() -> Result<(), VmiError> {
    let driver = MockDriver::new(1).with_lbr(1, &[(0x1000, 0x2000), (0x3000, 0x4000)]);
    driver.push(Ok(WaitStatus::Timeout), None);

    let session = session(driver)?;
    let monitor = LbrMonitor::new(1);
    monitor.enable(&session, Some(VcpuId(0)))?;

    let first = monitor.lbr(&session, VcpuId(0))?;
    let second = monitor.lbr(&session, VcpuId(0))?;
    assert_eq!(session.driver().lbr_calls.get(), 1);
    assert_eq!(first, second);

    session.wait_event(None)?;

    monitor.lbr(&session, VcpuId(0))?;
    assert_eq!(session.driver().lbr_calls.get(), 2);

    monitor.clear();
    monitor.lbr(&session, VcpuId(0))?;
    assert_eq!(session.driver().lbr_calls.get(), 3);

    Ok(())
}

#[test]
fn entries_start_at_top_of_stack() {
    let mut raw = RawLbrState {
        tos: 2,
        size: 3,
        ..Default::default()
    };
    raw.from[..3].copy_from_slice(&[0x10, 0x20, 0x30]);
    raw.to[..3].copy_from_slice(&[0x11, 0x21, 0x31]);

    let state = LbrState::from(&raw);
    assert_eq!(state.len(), 3);

    let entries = state.entries().collect::<Vec<_>>();
    assert_eq!(
        entries,
        [(2, 0x30, 0x31), (0, 0x10, 0x11), (1, 0x20, 0x21)]
    );
}

#[test]
fn oversized_stack_is_clamped() {
    let raw = RawLbrState {
        size: 1000,
        ..Default::default()
    };

    assert_eq!(LbrState::from(&raw).len(), 32);
}

#[test]
fn display() {
    let state = LbrState {
        tos: 1,
        from: [0xfffff80000401000, 0x7ff612340000].into_iter().collect(),
        to: [0xfffff80000402000, 0x7ff612341000].into_iter().collect(),
    };

    let expected = concat!(
        "LBR State - TOS: 1\n",
        "----------------------------------------------\n",
        "[ 1]  0x    7ff612340000 -> 0x    7ff612341000\n",
        "[ 0]  0xfffff80000401000 -> 0xfffff80000402000\n",
    );

    assert_eq!(state.to_string(), expected);
    assert_eq!(LbrState::default().to_string().lines().count(), 2);
}
