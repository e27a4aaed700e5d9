pub use sockscope_common::errors::*;

/// log a ProbeError through the log facade
macro_rules! log_err {
    ($err:expr) => {
        log_err!("", $err)
    };
    ($msg:expr, $err:expr) => {
        if $msg.is_empty() {
            log::error!("{}", $err.name())
        } else {
            log::error!("{}: {}: {}", $msg, $err.name(), $err.description())
        }
    };
}

pub(crate) use log_err;

/// if Result is an Err(BpfError), log it
macro_rules! log_result_err {
    ($res:expr) => {
        log_result_err!("", $res)
    };
    ($msg:expr, $res:expr) => {
        if let Err(e) = $res {
            $crate::error::log_err!($msg, e)
        }
    };
}

pub(crate) use log_result_err;

/// Converts a handler result into the program return code, logging the
/// error if any.
#[inline(always)]
pub(crate) fn prog_rc(name: &str, res: ProbeResult<()>) -> u32 {
    match res {
        Ok(_) => BPF_PROG_SUCCESS,
        Err(e) => {
            log_err!(name, e);
            BPF_PROG_FAILURE
        }
    }
}
