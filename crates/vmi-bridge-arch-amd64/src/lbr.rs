use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;
use smallvec::SmallVec;
use vmi_bridge_core::{VcpuId, VmiDriver, VmiError, VmiSession};

use crate::{
    Amd64, LbrFeature,
    feature::Feature,
    raw::{LBR_MAX, RawLbrState},
};

bitflags::bitflags! {
    /// Branch types suppressed from the last branch record stack
    /// (`LBR_SELECT` MSR).
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LbrSelect: u64 {
        /// Suppress branches in ring 0.
        const CPL_EQ_0 = 1 << 0;

        /// Suppress branches outside of ring 0.
        const CPL_NEQ_0 = 1 << 1;

        /// Suppress conditional branches.
        const JCC = 1 << 2;

        /// Suppress near relative calls.
        const NEAR_REL_CALL = 1 << 3;

        /// Suppress near indirect calls.
        const NEAR_IND_CALL = 1 << 4;

        /// Suppress near returns.
        const NEAR_RET = 1 << 5;

        /// Suppress near indirect jumps.
        const NEAR_IND_JMP = 1 << 6;

        /// Suppress near relative jumps.
        const NEAR_REL_JMP = 1 << 7;

        /// Suppress far branches.
        const FAR_BRANCH = 1 << 8;

        /// Record the stack as a call stack.
        const EN_CALLSTACK = 1 << 9;
    }
}

/// A driver that can take last branch record snapshots.
pub trait LbrDriver: VmiDriver<Architecture = Amd64> {
    /// Reads the last branch record stack of a vCPU into `state`.
    fn lbr(&self, vcpu_id: VcpuId, state: &mut RawLbrState) -> i32;
}

/// Point-in-time snapshot of the last branch record stack of a vCPU.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LbrState {
    /// Top of stack.
    pub tos: u32,

    /// Branch sources.
    pub from: SmallVec<[u64; LBR_MAX]>,

    /// Branch targets.
    pub to: SmallVec<[u64; LBR_MAX]>,
}

impl LbrState {
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.from.len().min(self.to.len())
    }

    /// Checks whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the entries as `(index, from, to)`, starting at the top of
    /// the stack.
    pub fn entries(&self) -> impl Iterator<Item = (usize, u64, u64)> + '_ {
        let size = self.len();
        (0..size).map(move |i| {
            let index = (self.tos as usize + i) % size;
            (index, self.from[index], self.to[index])
        })
    }
}

impl From<&RawLbrState> for LbrState {
    fn from(value: &RawLbrState) -> Self {
        let size = (value.size as usize).min(LBR_MAX);

        Self {
            tos: value.tos,
            from: SmallVec::from_slice(&value.from[..size]),
            to: SmallVec::from_slice(&value.to[..size]),
        }
    }
}

impl std::fmt::Display for LbrState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "LBR State - TOS: {}", self.tos)?;
        writeln!(f, "{}", "-".repeat(46))?;

        for (index, from, to) in self.entries() {
            writeln!(f, "[{index:2}]  0x{from:16x} -> 0x{to:16x}")?;
        }

        Ok(())
    }
}

/// Reference-counted last branch record control.
///
/// Several consumers may need the LBR of the same vCPU. The enable request
/// is only sent when a vCPU goes from zero to one user, the disable request
/// only when it goes back to zero. Snapshots are cached per vCPU until the
/// VM resumes.
#[derive(Debug)]
pub struct LbrMonitor {
    select: LbrSelect,
    refcounts: RefCell<Vec<u32>>,
    snapshots: RefCell<IndexMap<VcpuId, (u64, Rc<LbrState>)>>,
}

impl LbrMonitor {
    /// Creates a monitor for `vcpus` vCPUs.
    pub fn new(vcpus: u16) -> Self {
        Self {
            select: LbrSelect::empty(),
            refcounts: RefCell::new(vec![0; vcpus as usize]),
            snapshots: RefCell::new(IndexMap::new()),
        }
    }

    /// Sets the branch types to suppress in enable requests.
    pub fn with_select(self, select: LbrSelect) -> Self {
        Self { select, ..self }
    }

    /// Returns the number of users of the LBR of a vCPU.
    pub fn refcount(&self, vcpu_id: VcpuId) -> u32 {
        self.refcounts
            .borrow()
            .get(vcpu_id.0 as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Checks whether the LBR of a vCPU is enabled.
    pub fn is_enabled(&self, vcpu_id: VcpuId) -> bool {
        self.refcount(vcpu_id) > 0
    }

    /// Adds a user of the LBR of a vCPU, or of every vCPU if `None`.
    pub fn enable<Driver>(
        &self,
        session: &VmiSession<Driver>,
        vcpu_id: Option<VcpuId>,
    ) -> Result<(), VmiError>
    where
        Driver: VmiDriver<Architecture = Amd64>,
    {
        self.update(session, vcpu_id, true)
    }

    /// Removes a user of the LBR of a vCPU, or of every vCPU if `None`.
    pub fn disable<Driver>(
        &self,
        session: &VmiSession<Driver>,
        vcpu_id: Option<VcpuId>,
    ) -> Result<(), VmiError>
    where
        Driver: VmiDriver<Architecture = Amd64>,
    {
        self.update(session, vcpu_id, false)
    }

    fn update<Driver>(
        &self,
        session: &VmiSession<Driver>,
        vcpu_id: Option<VcpuId>,
        enable: bool,
    ) -> Result<(), VmiError>
    where
        Driver: VmiDriver<Architecture = Amd64>,
    {
        let mut refcounts = self.refcounts.borrow().clone();

        let range = match vcpu_id {
            Some(vcpu_id) => {
                let index = usize::from(vcpu_id.0);
                if index >= refcounts.len() {
                    return Err(VmiError::InvalidVcpu(vcpu_id));
                }

                index..index + 1
            }
            None => 0..refcounts.len(),
        };

        let mut transition = false;
        for refcount in &mut refcounts[range] {
            if enable {
                *refcount += 1;
                transition |= *refcount == 1;
            }
            else if *refcount > 0 {
                *refcount -= 1;
                transition |= *refcount == 0;
            }
        }

        if transition {
            tracing::debug!(?vcpu_id, enable, "updating LBR");
            session.update_feature(&Feature::Lbr(LbrFeature {
                enable,
                select: self.select,
                vcpu_id,
            }))?;
        }

        *self.refcounts.borrow_mut() = refcounts;
        Ok(())
    }

    /// Returns the last branch record stack of a vCPU.
    ///
    /// The snapshot is taken once per pause and cached until the VM resumes.
    pub fn lbr<Driver>(
        &self,
        session: &VmiSession<Driver>,
        vcpu_id: VcpuId,
    ) -> Result<Rc<LbrState>, VmiError>
    where
        Driver: LbrDriver,
    {
        if !self.is_enabled(vcpu_id) {
            return Err(VmiError::LbrNotEnabled(vcpu_id));
        }

        let epoch = session.epoch();
        if let Some((cached_epoch, state)) = self.snapshots.borrow().get(&vcpu_id)
            && *cached_epoch == epoch
        {
            return Ok(state.clone());
        }

        let mut raw = RawLbrState::default();
        let code = session.driver().lbr(vcpu_id, &mut raw);
        if code < 0 {
            return Err(VmiError::Native {
                operation: "lbr",
                code,
            });
        }

        tracing::trace!(%vcpu_id, tos = raw.tos, size = raw.size, "LBR snapshot");
        let state = Rc::new(LbrState::from(&raw));
        self.snapshots
            .borrow_mut()
            .insert(vcpu_id, (epoch, state.clone()));
        Ok(state)
    }

    /// Drops every cached snapshot.
    pub fn clear(&self) {
        self.snapshots.borrow_mut().clear();
    }
}
