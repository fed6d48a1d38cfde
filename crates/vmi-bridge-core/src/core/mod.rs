mod address;
mod info;
pub(crate) mod macros;
mod memory_access;
mod vcpu_id;

pub use self::{
    address::{Gfn, Pa, Va},
    info::VmiInfo,
    memory_access::MemoryAccess,
    vcpu_id::VcpuId,
};
