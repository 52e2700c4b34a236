use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Process is no longer running")]
    ProcessClosed,

    #[error("Address {0:#x} is outside the user address range")]
    AddressOutOfRange(u64),

    #[error("Failed to read {size} bytes at {address:#x}")]
    MemoryRead { address: u64, size: usize },

    #[error("Failed to write {size} bytes at {address:#x}")]
    MemoryWrite { address: u64, size: usize },

    #[error("Remote allocation of {0} bytes failed")]
    AllocationFailed(usize),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("No symbol named {symbol} in module {module}")]
    SymbolNotFound { module: String, symbol: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Pattern {0} returned no results")]
    PatternFailed(String),

    #[error("Pattern {pattern} returned {count} results")]
    PatternMultipleResults { pattern: String, count: usize },

    #[error("No hook descriptor for {0}")]
    DescriptorMissing(String),

    #[error("Hook {0} is already active")]
    HookAlreadyActive(String),

    #[error("Hook {0} is not active")]
    HookNotActive(String),

    #[error("Hook {0} has not produced a value yet")]
    HookNotReady(String),

    #[error("Shared cave region exhausted: requested {requested} with {remaining} remaining")]
    CaveExhausted { requested: usize, remaining: usize },

    #[error("Failed to relocate instructions: {0}")]
    Relocation(String),

    #[error("Object constructed with a zero base address")]
    ZeroBaseAddress,

    #[error("Value {value} is not a valid {type_name}")]
    InvalidEnumValue { type_name: &'static str, value: i32 },

    #[error("Shared vector has {len} elements, more than the maximum {max}")]
    SharedVectorTooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PE parse error: {0}")]
    Pe(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error means the target process itself is gone, as
    /// opposed to a single bad address.
    pub fn is_process_loss(&self) -> bool {
        matches!(self, Error::ProcessClosed)
    }
}
