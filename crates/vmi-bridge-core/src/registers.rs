use std::{
    cell::{Cell, RefCell},
    ptr::NonNull,
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{Registers, VcpuId, VmiError};

/// Binding of a register proxy to a hypervisor-owned register block.
///
/// The block is only accessible while the VM stays paused. Every resume
/// advances a shared epoch, which invalidates all bindings made before it.
pub struct RegisterBlock<Raw> {
    vcpu_id: VcpuId,
    ptr: Cell<Option<NonNull<Raw>>>,
    bound_epoch: Cell<u64>,
    epoch: Rc<Cell<u64>>,
    dirty: Cell<bool>,
}

impl<Raw> RegisterBlock<Raw> {
    pub(crate) fn new(vcpu_id: VcpuId, epoch: Rc<Cell<u64>>) -> Self {
        Self {
            vcpu_id,
            ptr: Cell::new(None),
            bound_epoch: Cell::new(0),
            epoch,
            dirty: Cell::new(false),
        }
    }

    /// Binds the block to the current pause and clears the dirty flag.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid register block that no one else accesses
    /// until the epoch advances.
    pub(crate) unsafe fn bind(&self, ptr: NonNull<Raw>) {
        self.ptr.set(Some(ptr));
        self.bound_epoch.set(self.epoch.get());
        self.dirty.set(false);
    }

    /// Returns the vCPU this block belongs to.
    pub fn vcpu_id(&self) -> VcpuId {
        self.vcpu_id
    }

    /// Checks whether the block is bound to the current pause.
    pub fn is_bound(&self) -> bool {
        self.ptr.get().is_some() && self.bound_epoch.get() == self.epoch.get()
    }

    /// Checks whether a register was written since the last bind.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn pointer(&self) -> Result<NonNull<Raw>, VmiError> {
        match self.ptr.get() {
            Some(ptr) if self.bound_epoch.get() == self.epoch.get() => Ok(ptr),
            _ => Err(VmiError::StaleRegisters(self.vcpu_id)),
        }
    }

    /// Reads a field of the bound block.
    ///
    /// `field` is a plain function pointer, so it cannot reach back into the
    /// proxy while the block is borrowed.
    pub fn get<T>(&self, field: fn(&Raw) -> &T) -> Result<T, VmiError>
    where
        T: Copy,
    {
        let ptr = self.pointer()?;

        // SAFETY: The pointer was bound in the current epoch, so the
        //         hypervisor still keeps the block alive and untouched.
        Ok(*field(unsafe { ptr.as_ref() }))
    }

    /// Writes a field of the bound block and marks the block dirty.
    pub fn set<T>(&self, field: fn(&mut Raw) -> &mut T, value: T) -> Result<(), VmiError>
    where
        T: Copy,
    {
        let mut ptr = self.pointer()?;

        // SAFETY: See `get`. No other reference into the block is alive,
        //         because `field` cannot capture one.
        *field(unsafe { ptr.as_mut() }) = value;
        self.dirty.set(true);
        Ok(())
    }
}

impl<Raw> std::fmt::Debug for RegisterBlock<Raw> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RegisterBlock")
            .field("vcpu_id", &self.vcpu_id)
            .field("bound", &self.is_bound())
            .field("dirty", &self.dirty.get())
            .finish()
    }
}

/// Per-vCPU cache of register proxies.
///
/// Proxies are created on first use and rebound on every later lookup.
pub struct CpuRegistry<R>
where
    R: Registers,
{
    epoch: Rc<Cell<u64>>,
    cpus: RefCell<IndexMap<VcpuId, Rc<R>>>,
}

impl<R> CpuRegistry<R>
where
    R: Registers,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            epoch: Rc::new(Cell::new(1)),
            cpus: RefCell::new(IndexMap::new()),
        }
    }

    /// Returns the current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// Invalidates every binding.
    pub fn invalidate(&self) {
        self.epoch.set(self.epoch.get().wrapping_add(1));
    }

    /// Returns the proxy of a vCPU without rebinding it.
    pub fn get(&self, vcpu_id: VcpuId) -> Option<Rc<R>> {
        self.cpus.borrow().get(&vcpu_id).cloned()
    }

    /// Returns the number of cached proxies.
    pub fn len(&self) -> usize {
        self.cpus.borrow().len()
    }

    /// Checks whether no proxy was created yet.
    pub fn is_empty(&self) -> bool {
        self.cpus.borrow().is_empty()
    }

    /// Binds the proxy of a vCPU to `ptr`, creating it on first use.
    ///
    /// # Safety
    ///
    /// See [`RegisterBlock::bind`].
    pub(crate) unsafe fn bind(&self, vcpu_id: VcpuId, ptr: NonNull<R::Raw>) -> Rc<R> {
        let mut cpus = self.cpus.borrow_mut();
        let registers = cpus
            .entry(vcpu_id)
            .or_insert_with(|| Rc::new(R::new(RegisterBlock::new(vcpu_id, self.epoch.clone()))))
            .clone();

        // SAFETY: Forwarded to the caller.
        unsafe { registers.block().bind(ptr) };
        registers
    }
}

impl<R> Default for CpuRegistry<R>
where
    R: Registers,
{
    fn default() -> Self {
        Self::new()
    }
}
