#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Invalid CLI/config input (bad flags, unreadable or invalid scenario file, bad request spec).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, VU task failures).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
