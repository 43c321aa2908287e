//! Result-code ABI (§X) and the internal error type it is built from.

use std::fmt;

/// Severity/facility/code-packed result value, bit-compatible with the
/// original HRESULT layout: bit 31 severity, bits 30..16 facility, bits
/// 15..0 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HResult(pub u32);

const SEVERITY_SHIFT: u32 = 31;
const FACILITY_SHIFT: u32 = 16;
const FACILITY_MASK: u32 = 0x1FFF;
const CODE_MASK: u32 = 0xFFFF;

const FACILITY_NULL: u32 = 0;
const FACILITY_AMIGA: u32 = 11;

const fn make(severity: u32, facility: u32, code: u32) -> HResult {
    HResult((severity << SEVERITY_SHIFT) | ((facility & FACILITY_MASK) << FACILITY_SHIFT) | (code & CODE_MASK))
}

impl HResult {
    pub const OK: HResult = make(0, FACILITY_NULL, 0x00);
    pub const FALSE: HResult = make(0, FACILITY_NULL, 0x01);
    pub const NOT_ALL_INTERFACES: HResult = make(0, FACILITY_NULL, 0x02);

    pub const UNEXPECTED: HResult = make(1, FACILITY_NULL, 0x00);
    pub const INVALID_ARGUMENT: HResult = make(1, FACILITY_NULL, 0x01);
    pub const OUT_OF_MEMORY: HResult = make(1, FACILITY_NULL, 0x02);
    pub const READ_REGISTRY_ERROR: HResult = make(1, FACILITY_NULL, 0x03);
    pub const WRITE_REGISTRY_ERROR: HResult = make(1, FACILITY_NULL, 0x04);
    pub const LIBRARY_NOT_FOUND: HResult = make(1, FACILITY_NULL, 0x05);
    pub const SYMBOL_NOT_FOUND: HResult = make(1, FACILITY_NULL, 0x06);

    pub const NO_AGGREGATION: HResult = make(1, FACILITY_NULL, 0x10);
    pub const CLASS_NOT_REGISTERED: HResult = make(1, FACILITY_NULL, 0x11);
    pub const OBJECT_IS_REGISTERED: HResult = make(1, FACILITY_NULL, 0x12);
    pub const NO_INTERFACE: HResult = make(1, FACILITY_NULL, 0x13);

    pub const NO_PERMISSION: HResult = make(1, FACILITY_AMIGA, 0x00);

    #[inline]
    pub const fn severity(self) -> u32 {
        (self.0 >> SEVERITY_SHIFT) & 1
    }

    #[inline]
    pub const fn facility(self) -> u32 {
        (self.0 >> FACILITY_SHIFT) & FACILITY_MASK
    }

    #[inline]
    pub const fn code(self) -> u32 {
        self.0 & CODE_MASK
    }

    #[inline]
    pub const fn succeeded(self) -> bool {
        self.severity() == 0
    }

    #[inline]
    pub const fn failed(self) -> bool {
        !self.succeeded()
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult(0x{:08X})", self.0)
    }
}

/// Internal error type for fallible helpers that sit below the result-code
/// ABI boundary. Every variant has a total, tested mapping to an [`HResult`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("class id {0} is not registered")]
    ClassNotRegistered(crate::guid::Guid),

    #[error("registry entry not found")]
    RegistryEntryNotFound,

    #[error("failed to read registry entry")]
    RegistryRead(#[source] std::io::Error),

    #[error("permission denied reading or writing registry entry")]
    RegistryPermissionDenied(#[source] std::io::Error),

    #[error("failed to write registry entry")]
    RegistryWrite(#[source] std::io::Error),

    #[error("registry entry is not valid UTF-8")]
    RegistryEntryNotUtf8(#[from] std::string::FromUtf8Error),

    #[error("library not found or failed to load: {path}")]
    LibraryNotFound {
        path: String,
        #[source]
        source: Option<libloading::Error>,
    },

    #[error("symbol {0:?} not found in library")]
    SymbolNotFound(String),

    #[error("interface not supported")]
    NoInterface,

    #[error("aggregation is not supported")]
    NoAggregation,

    #[error("allocation failed")]
    OutOfMemory,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("not all requested interfaces were satisfied")]
    NotAllInterfaces,

    #[error("unexpected internal error")]
    Unexpected,
}

impl Error {
    /// Total mapping from the internal error representation to the
    /// result-code ABI surface (§7).
    pub const fn to_hresult(&self) -> HResult {
        match self {
            Error::ClassNotRegistered(_) => HResult::CLASS_NOT_REGISTERED,
            Error::RegistryEntryNotFound => HResult::READ_REGISTRY_ERROR,
            Error::RegistryRead(_) => HResult::READ_REGISTRY_ERROR,
            Error::RegistryPermissionDenied(_) => HResult::NO_PERMISSION,
            Error::RegistryWrite(_) => HResult::WRITE_REGISTRY_ERROR,
            Error::RegistryEntryNotUtf8(_) => HResult::READ_REGISTRY_ERROR,
            Error::LibraryNotFound { .. } => HResult::LIBRARY_NOT_FOUND,
            Error::SymbolNotFound(_) => HResult::SYMBOL_NOT_FOUND,
            Error::NoInterface => HResult::NO_INTERFACE,
            Error::NoAggregation => HResult::NO_AGGREGATION,
            Error::OutOfMemory => HResult::OUT_OF_MEMORY,
            Error::InvalidArgument => HResult::INVALID_ARGUMENT,
            Error::NotAllInterfaces => HResult::NOT_ALL_INTERFACES,
            Error::Unexpected => HResult::UNEXPECTED,
        }
    }
}

impl From<Error> for HResult {
    fn from(e: Error) -> Self {
        e.to_hresult()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_and_failed_are_exclusive() {
        assert!(HResult::OK.succeeded());
        assert!(HResult::FALSE.succeeded());
        assert!(HResult::NOT_ALL_INTERFACES.succeeded());
        assert!(HResult::UNEXPECTED.failed());
        assert!(HResult::NO_INTERFACE.failed());
    }

    #[test]
    fn facility_and_code_roundtrip_through_bit_layout() {
        let hr = make(1, FACILITY_AMIGA, 0x2A);
        assert_eq!(hr.severity(), 1);
        assert_eq!(hr.facility(), FACILITY_AMIGA);
        assert_eq!(hr.code(), 0x2A);
    }

    #[test]
    fn every_error_variant_maps_to_a_failure_hresult() {
        let failing = [
            Error::ClassNotRegistered(crate::guid::Guid::NIL),
            Error::RegistryEntryNotFound,
            Error::SymbolNotFound("x".into()),
            Error::NoInterface,
            Error::NoAggregation,
            Error::OutOfMemory,
            Error::InvalidArgument,
            Error::Unexpected,
        ];
        for e in failing {
            assert!(e.to_hresult().failed(), "{e:?} should map to a failure HResult");
        }
    }
}
