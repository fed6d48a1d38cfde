use crate::{
    Architecture, Pa, Registers as _, TRANSLATION_FAILED, Va, VcpuId, VmiDriver, VmiError,
    VmiSession,
};

impl<Driver> VmiSession<Driver>
where
    Driver: VmiDriver,
{
    /// Reads `len` bytes of guest physical memory.
    pub fn read_physical(&self, pa: Pa, len: usize) -> Result<Box<[u8]>, VmiError> {
        let mut buffer = vec![0; len];
        self.read_physical_into(pa, &mut buffer)?;
        Ok(buffer.into_boxed_slice())
    }

    /// Reads guest physical memory into `buffer`.
    pub fn read_physical_into(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError> {
        let code = self.driver().read_physical(pa, buffer);
        tracing::trace!(%pa, len = buffer.len(), code, "read physical");

        if code < 0 {
            return Err(VmiError::Memory {
                operation: "read",
                pa,
                len: buffer.len(),
                code,
            });
        }

        Ok(())
    }

    /// Writes `buffer` to guest physical memory.
    pub fn write_physical(&self, pa: Pa, buffer: &[u8]) -> Result<(), VmiError> {
        let code = self.driver().write_physical(pa, buffer);
        tracing::trace!(%pa, len = buffer.len(), code, "write physical");

        if code < 0 {
            return Err(VmiError::Memory {
                operation: "write",
                pa,
                len: buffer.len(),
                code,
            });
        }

        Ok(())
    }

    /// Translates a virtual address using the page tables at `root`.
    pub fn translate(&self, va: Va, root: Pa) -> Result<Pa, VmiError> {
        match self.driver().translate(va, root) {
            TRANSLATION_FAILED => Err(VmiError::Translation { va, root }),
            pa => Ok(Pa(pa)),
        }
    }

    /// Translates a virtual address using the page tables of a vCPU.
    ///
    /// The page table base is taken from the bound registers of the vCPU
    /// (vCPU 0 if `None`).
    pub fn translate_with_vcpu(&self, va: Va, vcpu_id: Option<VcpuId>) -> Result<Pa, VmiError> {
        let registers = self.bound_registers(vcpu_id.unwrap_or_default())?;
        let root = registers.page_table_base(va)?;
        self.translate(va, root)
    }

    /// Reads `len` bytes of guest virtual memory.
    ///
    /// Every page touched by the read is translated separately.
    pub fn read_virtual(&self, va: Va, root: Pa, len: usize) -> Result<Box<[u8]>, VmiError> {
        check_range(va, len)?;

        let mut buffer = vec![0; len];
        let mut offset = 0;

        while offset < len {
            let chunk_va = va + offset as u64;
            let chunk_len = page_remaining::<Driver::Architecture>(chunk_va).min(len - offset);
            let pa = self.translate(chunk_va, root)?;

            self.read_physical_into(pa, &mut buffer[offset..offset + chunk_len])?;
            offset += chunk_len;
        }

        Ok(buffer.into_boxed_slice())
    }

    /// Writes `buffer` to guest virtual memory.
    ///
    /// Every page touched by the write is translated separately.
    pub fn write_virtual(&self, va: Va, root: Pa, buffer: &[u8]) -> Result<(), VmiError> {
        check_range(va, buffer.len())?;

        let mut offset = 0;

        while offset < buffer.len() {
            let chunk_va = va + offset as u64;
            let chunk_len =
                page_remaining::<Driver::Architecture>(chunk_va).min(buffer.len() - offset);
            let pa = self.translate(chunk_va, root)?;

            self.write_physical(pa, &buffer[offset..offset + chunk_len])?;
            offset += chunk_len;
        }

        Ok(())
    }

    /// Reads a little-endian pointer of `width` bytes (4 or 8) from guest
    /// virtual memory.
    pub fn read_pointer(&self, va: Va, root: Pa, width: usize) -> Result<u64, VmiError> {
        match width {
            4 => {
                let mut buffer = [0u8; 4];
                buffer.copy_from_slice(&self.read_virtual(va, root, 4)?);
                Ok(u32::from_le_bytes(buffer) as u64)
            }
            8 => {
                let mut buffer = [0u8; 8];
                buffer.copy_from_slice(&self.read_virtual(va, root, 8)?);
                Ok(u64::from_le_bytes(buffer))
            }
            _ => Err(VmiError::InvalidAddressWidth),
        }
    }
}

/// Number of bytes from `va` to the end of its page.
fn page_remaining<Arch>(va: Va) -> usize
where
    Arch: Architecture,
{
    (Arch::PAGE_SIZE - Arch::va_offset(va)) as usize
}

/// Checks that `len` bytes starting at `va` do not wrap around.
fn check_range(va: Va, len: usize) -> Result<(), VmiError> {
    match len.checked_sub(1) {
        Some(last) if va.0.checked_add(last as u64).is_none() => {
            Err(VmiError::OutOfBounds { va, len })
        }
        _ => Ok(()),
    }
}
