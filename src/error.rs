//! DOS-standard error codes, surfaced to the guest via `CF=1, AX=code`
//! (spec.md §7) and to the host caller as a `Result<_, DosError>`.

use std::io;

use quick_error::quick_error;

quick_error! {
    /// The DOS-standard error-code subset this emulator implements (spec.md §7).
    ///
    /// Architectural faults (divide-by-zero, an unhandled opcode) are never
    /// represented here: the former is delivered to the guest as `INT 0`,
    /// the latter halts emulation directly (see `cpu::StepResult::Fault`).
    #[derive(Debug)]
    pub enum DosError {
        InvalidFunction {
            display("invalid function number")
        }
        FileNotFound {
            display("file not found")
        }
        PathNotFound {
            display("path not found")
        }
        AccessDenied {
            display("access denied")
        }
        InvalidHandle {
            display("invalid handle")
        }
        McbCorrupted {
            display("memory control block destroyed")
        }
        InsufficientMemory {
            display("insufficient memory")
        }
        InvalidAccessCode {
            display("invalid access code")
        }
        NoMoreFiles {
            display("no more files")
        }
        NetworkRequestNotSupported {
            display("network request not supported")
        }
        HostIo(err: io::Error) {
            display("host I/O error: {}", err)
            from()
        }
    }
}

impl DosError {
    /// The value DOS places in `AX` on `CF=1` (spec.md §7).
    pub fn as_dos_code(&self) -> u16 {
        match self {
            DosError::InvalidFunction => 1,
            DosError::FileNotFound => 2,
            DosError::PathNotFound => 3,
            DosError::AccessDenied => 5,
            DosError::InvalidHandle => 6,
            DosError::McbCorrupted => 7,
            DosError::InsufficientMemory => 8,
            DosError::InvalidAccessCode => 12,
            DosError::NoMoreFiles => 18,
            DosError::NetworkRequestNotSupported => 50,
            // closest generic DOS codes for host I/O failures (spec.md §7)
            DosError::HostIo(err) => match err.kind() {
                io::ErrorKind::NotFound => 2,
                io::ErrorKind::PermissionDenied => 5,
                _ => 50,
            },
        }
    }
}

pub type DosResult<T> = Result<T, DosError>;
