use sockscope_macros::BpfError;

pub const BPF_PROG_SUCCESS: u32 = 0;
pub const BPF_PROG_FAILURE: u32 = 1;

#[repr(C)]
#[derive(BpfError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("failed to insert value into map")]
    InsertFailure,
    #[error("map lock is poisoned")]
    Poisoned,
}

impl From<MapError> for ProbeError {
    fn from(value: MapError) -> Self {
        Self::BpfMapError(value)
    }
}

// a handler result must stay register sized, whatever gets wrapped
// into ProbeError in the future
const _: bool = {
    if core::mem::size_of::<ProbeError>() > core::mem::size_of::<u64>() {
        panic!("ProbeError enum does not fit into a register");
    }

    if core::mem::align_of::<ProbeError>() != core::mem::align_of::<u64>() {
        panic!("ProbeError must be 8 bytes aligned")
    }
    true
};

#[repr(C, align(8))]
#[derive(BpfError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("tls session handle is null")]
    NullSslHandle,
    #[wrap]
    BpfMapError(MapError),
}

pub type ProbeResult<T> = core::result::Result<T, ProbeError>;
