/// Error type for the QEMU driver.
#[derive(Debug)]
pub enum Error {
    /// The hypervisor refused to initialize the interface.
    Init(i32),

    /// The interface is already held by another driver.
    AlreadyInitialized,
}

impl From<Error> for vmi_bridge_core::VmiError {
    fn from(error: Error) -> Self {
        match error {
            Error::Init(code) => Self::Native {
                operation: "init",
                code,
            },
            Error::AlreadyInitialized => Self::Native {
                operation: "init",
                code: -libc::EBUSY,
            },
        }
    }
}
