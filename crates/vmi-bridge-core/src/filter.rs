use crate::{Architecture, EventBreakpoint, EventSlp, Gfn, MemoryAccess, Pa};

/// Matches second-level paging violations against a trap configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlpFilter {
    /// Match violations anywhere in guest memory.
    pub global: bool,

    /// First page of the matched range.
    pub gfn: Option<Gfn>,

    /// Number of pages of the matched range.
    pub num_pages: Option<u64>,

    /// The accesses to match.
    pub access: MemoryAccess,
}

impl SlpFilter {
    /// Returns the inclusive physical address range covered by the filter.
    ///
    /// Returns `None` for global filters and for incomplete ranges.
    pub fn range<Arch>(&self) -> Option<(Pa, Pa)>
    where
        Arch: Architecture,
    {
        if self.global {
            return None;
        }

        let gfn = self.gfn?;
        let last = self.num_pages?.checked_sub(1)?;

        let start = Arch::pa_from_gfn(gfn);
        let end = Arch::pa_from_gfn(gfn + last) | (Arch::PAGE_SIZE - 1);
        Some((start, end))
    }

    /// Checks whether the violation falls in the filter's scope and was
    /// caused by one of the matched accesses.
    pub fn matches<Arch>(&self, event: &EventSlp) -> bool
    where
        Arch: Architecture,
    {
        let in_scope = self.global
            || self
                .range::<Arch>()
                .is_some_and(|(start, end)| start <= event.pa && event.pa <= end);

        in_scope && self.access.intersects(event.access)
    }
}

/// Matches breakpoint events against a physical address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointFilter {
    /// The physical address to match. `None` matches every breakpoint.
    pub pa: Option<Pa>,
}

impl BreakpointFilter {
    /// Checks whether the breakpoint event matches.
    pub fn matches(&self, event: &EventBreakpoint) -> bool {
        match self.pa {
            Some(pa) => event.pa == pa,
            None => true,
        }
    }
}
