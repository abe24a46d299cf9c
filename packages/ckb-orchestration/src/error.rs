//! Orchestration-layer error type.
//!
//! Wraps `ckb_core::CkbError` so callers up here see one error taxonomy;
//! conversions from `ckb_core`/`ckb_storage` errors are transparent.

pub use ckb_core::errors::{CkbError, ErrorKind};

pub type Result<T> = std::result::Result<T, CkbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_converts_through_core() {
        let storage_err = ckb_storage::StorageError::symbol_not_found("s1");
        let core_err: CkbError = storage_err.into();
        assert_eq!(core_err.kind, ErrorKind::SymbolNotFound);
    }
}
