use super::macros::impl_address;

impl_address!(Gfn, "A guest frame number.");
impl_address!(Pa, "A guest physical address.");
impl_address!(Va, "A guest virtual address.");

impl Va {
    /// Checks if the virtual address is NULL.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}
