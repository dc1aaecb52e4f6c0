//! Output formatting for the CLI.
//!
//! Byte output is passed through untouched. Values get one line each,
//! marked so they cannot be mistaken for bytes.

use duosh_kernel::{CompileError, ExecResult, Exception, Value};

/// Marker in front of every value line.
pub const VALUE_MARKER: &str = "▶ ";

/// One `▶ repr` line per value.
pub fn format_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| format!("{VALUE_MARKER}{}\n", v.repr()))
        .collect()
}

/// Everything a result sends to stdout: bytes first, then values.
pub fn format_stdout(result: &ExecResult) -> String {
    let mut out = result.out.clone();
    if !out.is_empty() && !out.ends_with('\n') && !result.values.is_empty() {
        out.push('\n');
    }
    out.push_str(&format_values(&result.values));
    out
}

/// Exception report with its traceback, for stderr.
pub fn format_exception(e: &Exception) -> String {
    let mut report = e.report();
    if !report.ends_with('\n') {
        report.push('\n');
    }
    report
}

pub fn format_compile_error(e: &CompileError) -> String {
    format!("compilation error: {e}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_marked() {
        let values = vec![Value::from("a b"), Value::list([Value::from("x")])];
        assert_eq!(format_values(&values), "▶ 'a b'\n▶ [x]\n");
    }

    #[test]
    fn bytes_then_values() {
        let result = ExecResult {
            out: "partial".into(),
            values: vec![Value::from("v")],
            ..ExecResult::default()
        };
        assert_eq!(format_stdout(&result), "partial\n▶ v\n");
    }

    #[test]
    fn bytes_only() {
        assert_eq!(format_stdout(&ExecResult::success("hi\n")), "hi\n");
    }
}
