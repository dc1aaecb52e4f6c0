//! ExecResult: what one top-level execution produced.
//!
//! A chunk writes to two sub-streams on fd 1 and to bytes on fd 2. The
//! kernel collects all three and attaches the exception, if any, that ended
//! the chunk.

use serde_json::json;

use super::exception::Exception;
use super::value::Value;

#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Byte output of fd 1, lossily decoded.
    pub out: String,
    /// Byte output of fd 2.
    pub err: String,
    /// Values emitted on fd 1, in order.
    pub values: Vec<Value>,
    /// The failure that stopped the chunk. `None` means success.
    pub exception: Option<Exception>,
}

impl ExecResult {
    /// Create a successful result with byte output only.
    pub fn success(out: impl Into<String>) -> Self {
        Self {
            out: out.into(),
            ..Self::default()
        }
    }

    pub fn ok(&self) -> bool {
        self.exception.is_none()
    }

    /// Process exit status a front end should report.
    pub fn code(&self) -> i32 {
        if self.ok() {
            0
        } else {
            1
        }
    }

    /// JSON rendering for front ends that speak JSON. Values that have no
    /// JSON form (closures, namespaces) are rendered by their repr.
    pub fn to_json(&self) -> serde_json::Value {
        let values: Vec<serde_json::Value> = self
            .values
            .iter()
            .map(|v| v.to_json().unwrap_or_else(|_| json!(v.repr())))
            .collect();
        json!({
            "ok": self.ok(),
            "out": self.out,
            "err": self.err,
            "values": values,
            "exception": self.exception.as_ref().map(|e| json!({
                "reason": e.reason().to_json().unwrap_or_else(|_| json!(e.reason().repr())),
                "report": e.report(),
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_no_exception() {
        let r = ExecResult::success("hi\n");
        assert!(r.ok());
        assert_eq!(r.code(), 0);
        assert_eq!(r.out, "hi\n");
    }

    #[test]
    fn failure_reports_reason_in_json() {
        let r = ExecResult {
            exception: Some(Exception::fail("boom")),
            ..ExecResult::default()
        };
        assert_eq!(r.code(), 1);
        let j = r.to_json();
        assert_eq!(j["ok"], json!(false));
        assert_eq!(j["exception"]["reason"], json!("boom"));
    }

    #[test]
    fn values_render_as_json() {
        let r = ExecResult {
            values: vec![Value::from("a"), Value::list(vec![Value::from("b")])],
            ..ExecResult::default()
        };
        assert_eq!(r.to_json()["values"], json!(["a", ["b"]]));
    }
}
