//! The input sequence of builtins such as `each` and `to-lines`.
//!
//! An explicit list argument is iterated. Otherwise inputs come from fd 0:
//! values from the value side, interleaved with byte lines as strings.

use crate::interpreter::{EvalResult, ExecContext, Value};
use crate::scheduler::InPort;

pub enum Inputs {
    Given(std::vec::IntoIter<Value>),
    Port(PortInputs),
}

pub struct PortInputs {
    port: InPort,
    values_open: bool,
    lines_open: bool,
}

impl Inputs {
    pub fn new(given: Option<&Value>, ctx: &ExecContext) -> EvalResult<Self> {
        if let Some(given) = given {
            return Ok(Inputs::Given(given.iterate()?.into_iter()));
        }
        Ok(match ctx.stdin() {
            Some(port) => Inputs::Port(PortInputs::new(port.clone())),
            None => Inputs::Given(Vec::new().into_iter()),
        })
    }

    pub async fn next(&mut self) -> EvalResult<Option<Value>> {
        match self {
            Inputs::Given(items) => Ok(items.next()),
            Inputs::Port(port) => port.next().await,
        }
    }
}

impl PortInputs {
    fn new(port: InPort) -> Self {
        Self {
            port,
            values_open: true,
            lines_open: true,
        }
    }

    /// Both reads are cancel-safe, so the losing branch of the select
    /// leaves its input on the port for whoever reads next.
    async fn next(&mut self) -> EvalResult<Option<Value>> {
        loop {
            tokio::select! {
                v = self.port.recv(), if self.values_open => match v {
                    Some(v) => return Ok(Some(v)),
                    None => self.values_open = false,
                },
                line = self.port.read_line(), if self.lines_open => match line? {
                    Some(line) => return Ok(Some(Value::String(line))),
                    None => self.lines_open = false,
                },
                else => return Ok(None),
            }
        }
    }
}
