//! Thin helpers around raw `gdal_sys` calls

use crate::error::{Error, Result};
use std::ffi::{CStr, CString};

/// Message of the most recent GDAL error on this thread
pub fn last_error_message() -> String {
    // SAFETY: CPLGetLastErrorMsg returns a pointer to a thread-local buffer owned by GDAL
    unsafe {
        let msg = gdal_sys::CPLGetLastErrorMsg();
        if msg.is_null() {
            return String::new();
        }
        CStr::from_ptr(msg).to_string_lossy().into_owned()
    }
}

/// Turn a `CPLErr` return code into a `Result`
pub fn check_rc(rc: gdal_sys::CPLErr::Type, operation: &str) -> Result<()> {
    if rc == gdal_sys::CPLErr::CE_None {
        Ok(())
    } else {
        Err(Error::Gdal(format!("{} failed: {}", operation, last_error_message())))
    }
}

pub fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::InvalidParameter {
        name: "string",
        value: value.to_string(),
        reason: "contains an interior NUL byte".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rc() {
        assert!(check_rc(gdal_sys::CPLErr::CE_None, "noop").is_ok());
        let err = check_rc(gdal_sys::CPLErr::CE_Failure, "FillNodata").unwrap_err();
        assert!(err.to_string().contains("FillNodata failed"));
    }

    #[test]
    fn test_c_string_rejects_nul() {
        assert!(c_string("EPSG:2992").is_ok());
        assert!(c_string("a\0b").is_err());
    }
}
