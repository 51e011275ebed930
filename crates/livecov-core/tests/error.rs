//! Tests for error handling

use livecov_core::error::{CoverageError, Result};

#[test]
fn test_coverage_disabled_names_variable()
{
    let error = CoverageError::CoverageDisabled {
        variable: "LLVM_PROFILE_FILE".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("disabled"));
    assert!(message.contains("LLVM_PROFILE_FILE"));
}

#[test]
fn test_window_protocol_errors()
{
    assert!(format!("{}", CoverageError::WindowAlreadyOpen).contains("already open"));
    assert!(format!("{}", CoverageError::WindowNotOpen).contains("not open"));
}

#[test]
fn test_missing_capability_message()
{
    let error = CoverageError::MissingRequiredCapability {
        binary: "libapp.so".to_string(),
        capability: "bitmap range",
    };
    let message = format!("{}", error);
    assert!(message.contains("libapp.so"));
    assert!(message.contains("bitmap range"));
}

#[test]
fn test_decode_failed_carries_backend_message()
{
    let error = CoverageError::DecodeFailed("truncated header".to_string());
    assert!(format!("{}", error).contains("truncated header"));
}

#[test]
fn test_io_error_conversion()
{
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "window missing");
    let coverage_err: CoverageError = io_err.into();

    match coverage_err {
        CoverageError::Io(e) => {
            assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
        }
        _ => panic!("Expected Io variant"),
    }
}

#[test]
fn test_json_error_conversion()
{
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let coverage_err: CoverageError = json_err.into();
    assert!(matches!(coverage_err, CoverageError::Json(_)));
}

#[test]
fn test_result_type_alias()
{
    fn returns_result() -> Result<u32>
    {
        Ok(42)
    }

    fn returns_error() -> Result<u32>
    {
        Err(CoverageError::WindowNotOpen)
    }

    assert_eq!(returns_result().unwrap(), 42);
    assert!(returns_error().is_err());
}
