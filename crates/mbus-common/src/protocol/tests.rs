//! Tests for the protocol module
//!
//! These tests verify request/response serialization, ID generation, version
//! parsing and ordering, and the error code table.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::HashSet;
    use std::str::FromStr;

    #[test]
    fn test_request_creation() {
        let req = Request::new("mbus.getVersion", Vec::new());
        assert_eq!(req.method, "mbus.getVersion");
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000)
            .map(|_| Request::new("test", Vec::new()).id)
            .collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    #[test]
    fn test_response_success() {
        let resp = Response::success(123, vec![1, 2, 3]);
        assert!(resp.success);
        assert_eq!(resp.id, 123);
        assert_eq!(resp.payload, vec![1, 2, 3]);
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_response_error() {
        let resp = Response::error(456, "something failed");
        assert!(!resp.success);
        assert_eq!(resp.id, 456);
        assert_eq!(resp.error, Some("something failed".to_string()));
        assert!(resp.payload.is_empty());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let req = Request::new("mbus.send2", vec![0, 9, 1]);
        let bytes = postcard::to_allocvec(&req).unwrap();
        let back: Request = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(req, back);

        let resp = Response::success(1, vec![42]);
        let bytes = postcard::to_allocvec(&resp).unwrap();
        let back: Response = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(resp, back);
    }

    // ========================================================================
    // Version
    // ========================================================================

    #[test]
    fn test_version_parse_full() {
        let v = Version::from_str("6.221.15").unwrap();
        assert_eq!(v, Version::new(6, 221, 15));
    }

    #[test]
    fn test_version_parse_partial_components_default_to_zero() {
        assert_eq!(Version::from_str("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(Version::from_str("2.1").unwrap(), Version::new(2, 1, 0));
    }

    #[test]
    fn test_version_parse_rejects_garbage() {
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("a.b.c").is_err());
        assert!(Version::from_str("1.2.3.4").is_err());
        assert!(Version::from_str("1..3").is_err());
        assert!(Version::from_str("-1.0.0").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 0, 0) < Version::new(2, 0, 0));
        assert!(Version::new(2, 0, 0) < Version::new(2, 0, 1));
        assert!(Version::new(2, 0, 1) < Version::new(2, 1, 0));
        assert_eq!(Version::new(3, 2, 1), Version::from_str("3.2.1").unwrap());
    }

    #[test]
    fn test_version_display_roundtrip() {
        let v = Version::new(2, 0, 0);
        assert_eq!(v.to_string(), "2.0.0");
        assert_eq!(Version::from_str(&v.to_string()).unwrap(), v);
    }

    // ========================================================================
    // Bus errors
    // ========================================================================

    #[test]
    fn test_bus_error_service_backfill() {
        let err = BusError::new(codes::CONNECTION_ERROR, "connect refused");
        assert!(err.service.is_empty());
        let err = err.with_service("prefix/session");
        assert_eq!(err.service, "prefix/session");
    }

    #[test]
    fn test_error_code_transience() {
        assert!(codes::is_transient(codes::CONNECTION_ERROR));
        assert!(codes::is_transient(codes::TIMEOUT));
        assert!(codes::is_transient(codes::HANDSHAKE_FAILED));
        assert!(!codes::is_transient(codes::ENCODE_ERROR));
        assert!(!codes::is_transient(codes::DECODE_ERROR));
        assert!(!codes::is_transient(codes::UNKNOWN_PROTOCOL));
        assert!(!codes::is_transient(codes::NONE));
    }

    #[test]
    fn test_error_code_names() {
        assert_eq!(codes::name(codes::TIMEOUT), "TIMEOUT");
        assert_eq!(codes::name(987), "UNKNOWN(987)");
    }

    #[test]
    fn test_bus_error_display() {
        let err = BusError::new(codes::TIMEOUT, "ran out of time").with_service("a/b");
        let text = err.to_string();
        assert!(text.contains("TIMEOUT"));
        assert!(text.contains("a/b"));
    }
}
