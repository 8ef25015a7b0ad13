//! Server result code → error taxonomy mapping (§7 "Server application").

use meridian_core::Error;

/// The 1-byte result code from the message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultCode(pub u8);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(0);
    pub const KEY_NOT_FOUND: ResultCode = ResultCode(2);
    pub const GENERATION_ERROR: ResultCode = ResultCode(3);
    pub const PARAMETER_ERROR: ResultCode = ResultCode(4);
    pub const RECORD_EXISTS: ResultCode = ResultCode(5);
    pub const BIN_NAME_INVALID: ResultCode = ResultCode(21);
    pub const RECORD_TOO_BIG: ResultCode = ResultCode(13);
    pub const DEVICE_OVERLOAD: ResultCode = ResultCode(18);
    pub const TIMEOUT: ResultCode = ResultCode(9);
    pub const PARTITION_UNAVAILABLE: ResultCode = ResultCode(11);
    pub const FILTERED_OUT: ResultCode = ResultCode(27);
    pub const UDF_BAD_RESPONSE: ResultCode = ResultCode(100);
    pub const NOT_AUTHENTICATED: ResultCode = ResultCode(80);
    pub const INVALID_CREDENTIAL: ResultCode = ResultCode(81);
    pub const EXPIRED_SESSION: ResultCode = ResultCode(82);
    pub const SERVER_NOT_AVAILABLE: ResultCode = ResultCode(24);

    pub fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }

    /// Whether this code is safe for the command engine to retry.
    pub fn is_retryable(self) -> bool {
        matches!(
            self.0,
            11 /* partition unavailable */ | 18 /* device overload */ | 9 /* timeout */ | 24 /* server not available */
        )
    }

    /// Translate into the consolidated `Error` type, classifying along the
    /// way (retryable / fatal / not-found / filtered-out / auth).
    pub fn into_error(self) -> Option<Error> {
        if self.is_ok() {
            return None;
        }
        Some(match self.0 {
            2 => Error::NotFound,
            27 => Error::FilteredOut,
            80 | 81 | 82 => Error::Authentication(self.describe()),
            code => Error::Server {
                code,
                message: self.describe(),
                retryable: self.is_retryable(),
            },
        })
    }

    fn describe(self) -> String {
        match self.0 {
            2 => "key not found".into(),
            3 => "generation mismatch".into(),
            4 => "parameter error".into(),
            5 => "record already exists".into(),
            9 => "server-side timeout".into(),
            11 => "partition unavailable".into(),
            13 => "record too big".into(),
            18 => "device overload".into(),
            21 => "bin name invalid".into(),
            24 => "server not available".into(),
            27 => "filtered out".into(),
            80 => "not authenticated".into(),
            81 => "invalid credential".into(),
            82 => "expired session".into(),
            100 => "UDF bad response".into(),
            other => format!("unmapped server result code {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_code_yields_no_error() {
        assert!(ResultCode::OK.into_error().is_none());
    }

    #[test]
    fn partition_unavailable_is_retryable() {
        assert!(ResultCode::PARTITION_UNAVAILABLE.is_retryable());
        let err = ResultCode::PARTITION_UNAVAILABLE.into_error().unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn bin_name_invalid_is_fatal() {
        assert!(!ResultCode::BIN_NAME_INVALID.is_retryable());
        let err = ResultCode::BIN_NAME_INVALID.into_error().unwrap();
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_found_maps_to_not_found_variant() {
        let err = ResultCode::KEY_NOT_FOUND.into_error().unwrap();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn filtered_out_maps_to_filtered_out_variant() {
        let err = ResultCode::FILTERED_OUT.into_error().unwrap();
        assert!(matches!(err, Error::FilteredOut));
    }

    #[test]
    fn auth_codes_map_to_authentication_variant() {
        let err = ResultCode::EXPIRED_SESSION.into_error().unwrap();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
