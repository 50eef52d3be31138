//! Interpretation of raw process output.
//!
//! Output is one of three shapes (object, array, bare scalar). Some methods
//! print a bare token such as a block hash that is not valid JSON; those are
//! wrapped as string scalars rather than rejected.

use bitlens_core::{ErrorKind, Payload, QueryError, QueryResult};
use serde_json::Value;

/// Diagnostics meaning "the node lacks this data" rather than "bad request".
const UNAVAILABLE_MARKERS: &[&str] = &[
    "pruned",
    "-txindex",
    "No such mempool or blockchain transaction",
    "Block not available",
    "not available (pruned data)",
];

/// Maps a finished invocation to a result.
pub fn interpret(success: bool, exit_code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> QueryResult {
    let diagnostic = String::from_utf8_lossy(stderr).trim().to_string();

    if !success {
        return Err(classify_failure(exit_code, diagnostic));
    }
    // Some wrappers exit 0 but still print an error envelope.
    if diagnostic.starts_with("error") && stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(classify_failure(exit_code, diagnostic));
    }
    parse_stdout(stdout)
}

/// Parses standard output into a [`Payload`].
pub fn parse_stdout(stdout: &[u8]) -> QueryResult {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| QueryError::protocol(format!("output is not UTF-8: {e}")))?;
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Ok(Payload::Scalar(Value::Null));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(Payload::from_value(value)),
        Err(e) => {
            let structured = trimmed.starts_with('{') || trimmed.starts_with('[');
            if structured || trimmed.contains('\n') {
                Err(QueryError::protocol(format!("unparseable output: {e}")))
            } else {
                Ok(Payload::Scalar(Value::String(trimmed.to_string())))
            }
        }
    }
}

/// Builds the error for a failed invocation, keeping the node's text verbatim.
pub fn classify_failure(exit_code: Option<i32>, diagnostic: String) -> QueryError {
    let message = if diagnostic.is_empty() {
        match exit_code {
            Some(code) => format!("exited with status {code} and no diagnostic"),
            None => "terminated by signal".to_string(),
        }
    } else {
        diagnostic
    };

    let kind = if UNAVAILABLE_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorKind::DataUnavailable
    } else {
        ErrorKind::NodeError
    };
    let code = rpc_error_code(&message);
    QueryError::new(kind, message).with_code(code)
}

/// Extracts `N` from a `error code: N` line.
pub fn rpc_error_code(diagnostic: &str) -> Option<i64> {
    let rest = diagnostic.split("error code:").nth(1)?;
    rest.lines().next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_output() {
        let p = parse_stdout(b"{\n  \"blocks\": 840000\n}\n").unwrap();
        assert_eq!(p.get("blocks"), Some(&json!(840000)));
    }

    #[test]
    fn array_output() {
        let p = parse_stdout(b"[{\"height\": 1}]").unwrap();
        assert_eq!(p.as_array().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn bare_hash_is_scalar() {
        let hash = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
        let p = parse_stdout(format!("{hash}\n").as_bytes()).unwrap();
        assert_eq!(p.as_str(), Some(hash));
    }

    #[test]
    fn bare_number_is_scalar() {
        assert_eq!(parse_stdout(b"840000\n").unwrap().as_u64(), Some(840000));
        assert_eq!(parse_stdout(b"4.5\n").unwrap().as_f64(), Some(4.5));
    }

    #[test]
    fn empty_output_is_null() {
        assert!(parse_stdout(b"  \n").unwrap().is_null());
    }

    #[test]
    fn truncated_json_is_protocol_error() {
        let err = parse_stdout(b"{\"blocks\": 8").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolError);
    }

    #[test]
    fn non_utf8_is_protocol_error() {
        let err = parse_stdout(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolError);
    }

    #[test]
    fn unknown_block_keeps_literal_text() {
        let stderr = b"error code: -5\nerror message:\nBlock not found\n";
        let err = interpret(false, Some(5), b"", stderr).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NodeError);
        assert_eq!(err.code, Some(-5));
        assert_eq!(err.message, "error code: -5\nerror message:\nBlock not found");
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_txindex_is_unavailable() {
        let stderr = b"error code: -5\nerror message:\nNo such mempool or blockchain transaction. Use gettransaction for wallet transactions.";
        let err = interpret(false, Some(5), b"", stderr).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataUnavailable);
    }

    #[test]
    fn pruned_block_is_unavailable() {
        let err = interpret(false, Some(1), b"", b"error code: -1\nerror message:\nBlock not available (pruned data)")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataUnavailable);
        assert_eq!(err.code, Some(-1));
    }

    #[test]
    fn connection_refused_is_transient() {
        let err = interpret(
            false,
            Some(1),
            b"",
            b"error: Could not connect to the server 127.0.0.1:8332\n\nMake sure the bitcoind server is running",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NodeError);
        assert!(err.is_transient());
    }

    #[test]
    fn silent_failure_reports_status() {
        let err = interpret(false, Some(3), b"", b"").unwrap_err();
        assert!(err.message.contains("status 3"));
    }

    #[test]
    fn error_envelope_with_zero_exit() {
        let err = interpret(true, Some(0), b"", b"error: timeout on transient error").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NodeError);
    }
}
