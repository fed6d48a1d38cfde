//! Traces address space switches and code execution on an AMD64 guest.
//!
//! Must be loaded into a QEMU process that exports the introspection
//! interface.

use vmi_bridge::{
    MemoryAccess, Pa, SingleStepMethod, SlpFeature, SlpFilter, SystemEvent, VcpuId, VmiConfig,
    VmiError, VmiEvent, VmiHandler, VmiSession,
    arch::amd64::{
        Amd64, Amd64Features as _, EventReason, LbrMonitor, MtfFeature, TaskSwitchFeature,
        TaskSwitchFilter,
    },
    driver::qemu::QemuDriverAmd64,
};

struct Tracer {
    task_switch: TaskSwitchFilter,
    slp: SlpFilter,
    lbr: LbrMonitor,
    /// Pages whose execute trap is lifted while a vCPU steps over them.
    stepping: Vec<Option<Pa>>,
    events: usize,
    limit: usize,
}

impl Tracer {
    fn configure(&self, session: &VmiSession<QemuDriverAmd64>) -> Result<(), VmiError> {
        let task_switch = TaskSwitchFeature {
            enable: true,
            ..Default::default()
        };
        session.update_feature_task_switch(task_switch)?;

        let slp = SlpFeature {
            enable: true,
            global: true,
            access: MemoryAccess::X,
            ..Default::default()
        };
        session.update_feature_slp(slp)?;

        self.lbr.enable(session, None)
    }

    /// Lifts the execute trap of a page and single-steps the vCPU over it.
    fn step_over(
        &mut self,
        session: &VmiSession<QemuDriverAmd64>,
        vcpu_id: VcpuId,
        pa: Pa,
    ) -> Result<(), VmiError> {
        session.update_slp(pa, MemoryAccess::RWX, Some(vcpu_id))?;
        session.update_feature_mtf(MtfFeature {
            enable: true,
            vcpu_id: Some(vcpu_id),
        })?;

        self.stepping[usize::from(vcpu_id.0)] = Some(pa);
        Ok(())
    }

    /// Traps execution of the stepped-over page again.
    fn rearm(
        &mut self,
        session: &VmiSession<QemuDriverAmd64>,
        vcpu_id: VcpuId,
    ) -> Result<(), VmiError> {
        let pa = match self.stepping[usize::from(vcpu_id.0)].take() {
            Some(pa) => pa,
            None => return Ok(()),
        };

        session.update_feature_mtf(MtfFeature {
            enable: false,
            vcpu_id: Some(vcpu_id),
        })?;
        session.update_slp(pa, MemoryAccess::RW, Some(vcpu_id))
    }
}

impl VmiHandler<QemuDriverAmd64> for Tracer {
    type Output = usize;

    fn handle_event(
        &mut self,
        session: &VmiSession<QemuDriverAmd64>,
        event: &VmiEvent<Amd64>,
    ) -> Result<(), VmiError> {
        let reason = match event {
            VmiEvent::System(SystemEvent::VmReady) => return self.configure(session),
            VmiEvent::System(event) => {
                tracing::info!(%event);
                return Ok(());
            }
            VmiEvent::Cpu(reason) => reason,
        };

        match reason {
            EventReason::TaskSwitch(event) if self.task_switch.matches(event) => {
                tracing::info!(%event);
            }
            EventReason::Slp(event) if self.slp.matches::<Amd64>(event) => {
                let registers = session.registers(event.vcpu_id)?;
                tracing::info!(%event, rip = %format_args!("{:#x}", registers.rip()?));

                if let Ok(lbr) = self.lbr.lbr(session, event.vcpu_id) {
                    tracing::debug!("\n{lbr}");
                }

                self.step_over(session, event.vcpu_id, event.pa)?;
            }
            EventReason::SingleStep(event) if event.method == SingleStepMethod::Mtf => {
                return self.rearm(session, event.vcpu_id);
            }
            _ => return Ok(()),
        }

        self.events += 1;
        Ok(())
    }

    fn handle_timeout(&mut self, _session: &VmiSession<QemuDriverAmd64>) {
        tracing::trace!("no event");
    }

    fn check_completion(&self) -> Option<usize> {
        (self.events >= self.limit).then_some(self.events)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let driver = QemuDriverAmd64::new().map_err(VmiError::from)?;
    let config = VmiConfig::default().with_signal_handling(true);
    let session = VmiSession::new(driver, config)?;

    let slp = SlpFeature {
        global: true,
        access: MemoryAccess::X,
        ..Default::default()
    };

    let mut tracer = Tracer {
        task_switch: TaskSwitchFilter::default(),
        slp: slp.filter(),
        lbr: LbrMonitor::new(session.info().vcpus),
        stepping: vec![None; usize::from(session.info().vcpus)],
        events: 0,
        limit: 1000,
    };

    match session.run(&mut tracer) {
        Ok(events) => tracing::info!(?events, "done"),
        Err(VmiError::Interrupted) => {
            tracing::warn!("interrupted");
            session.stop();
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
