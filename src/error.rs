use crate::memory::MemAccess;

pub type MemResult<T> = Result<T, MemException>;
pub type FatalMemResult<T> = Result<T, FatalMemException>;

/// Exception resulting from a register or memory access.
#[derive(Debug, Clone)]
pub enum MemException {
    // -- Non-Fatal Errors -- //
    /// Location is using a stubbed read implementation.
    StubRead(log::Level, u32),
    /// Location is using a stubbed write implementation.
    StubWrite(log::Level, ()),

    // -- Internal Emulator Errors -- //
    /// Location that shouldn't have been accessed.
    Unexpected,
    /// Location hasn't been implemented.
    Unimplemented,
    /// An unrecoverable error which should immediately terminate execution.
    Fatal(String),

    // -- Guest Access Violations -- //
    /// Attempted to access a device at an invalid offset.
    Misaligned,
    /// Attempted to read a write-only register / write to a read-only register.
    InvalidAccess,
    /// Performed an unexpected action on the device.
    ///
    /// e.g: sending an invalid command byte to the drive, improper command
    /// sequencing, requesting a reply slice past the end of the payload, etc...
    ContractViolation {
        msg: String,
        severity: log::Level,
        stub_val: Option<u32>,
    },
}

/// Context around a MemException.
#[derive(Debug, Clone)]
pub struct MemExceptionCtx {
    pub pc: u32,
    pub access: MemAccess,
    pub in_device: String,
}

impl std::fmt::Display for MemExceptionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[pc {:#010x?}][addr {:#010x?}][{}]",
            self.pc, self.access.offset, self.in_device
        )
    }
}

/// An unrecoverable memory exception.
#[derive(Debug, Clone)]
pub struct FatalMemException {
    context: MemExceptionCtx,
    reason: MemException,
}

impl MemException {
    /// Handle the memory exception, potentially returning a FatalMemException.
    pub fn resolve(
        self,
        target: &'static str,
        ctx: MemExceptionCtx,
    ) -> Result<(), FatalMemException> {
        macro_rules! mlog {
            (($level:ident, $ctx:ident) => ($($args:tt)*)) => {
                if log_enabled!($level) {
                    let $ctx = $ctx;
                    log!(target: target, $level, $($args)*)
                }
            };
        }

        use MemException::*;
        match self {
            StubRead(level, _) => {
                mlog! { (level, ctx) => ("{} stubbed read ({})", ctx, ctx.access.val) }
            }
            StubWrite(level, ()) => {
                mlog! { (level, ctx) => ("{} stubbed write ({})", ctx, ctx.access.val) }
            }
            ContractViolation {
                msg,
                severity,
                stub_val,
            } => {
                if severity == log::Level::Error {
                    return Err(FatalMemException {
                        context: ctx,
                        reason: ContractViolation {
                            msg,
                            severity,
                            stub_val,
                        },
                    });
                } else {
                    mlog! { (severity, ctx) => ("{} {}", ctx, msg) }
                }
            }
            Misaligned | Unexpected | Unimplemented | Fatal(_) | InvalidAccess => {
                return Err(FatalMemException {
                    context: ctx,
                    reason: self,
                })
            }
        }

        Ok(())
    }
}
