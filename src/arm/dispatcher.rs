//! # Command Dispatcher
//!
//! Formats an [`ActuatorCommand`] as an arm controller request and sends it.
//!
//! ## Request Format
//!
//! ```text
//! http://<host>:<port>/?command=<code>,<base>,<shoulder>,<elbow>,<wrist rotate>,<wrist vertical>,<grip>
//! ```
//!
//! Delivery is best effort: one GET per command, the response is ignored and
//! failed requests are not retried.

use tracing::debug;

use super::mapper::ActuatorCommand;
use super::transport::CommandTransport;
use crate::error::Result;

/// Command code the arm controller uses for "move all servos".
pub const MOVE_ALL_COMMAND_CODE: u32 = 10;

/// Sends arm commands to a fixed controller endpoint.
pub struct CommandDispatcher<T> {
    host: String,
    port: u16,
    code: u32,
    transport: T,
}

impl<T> std::fmt::Debug for CommandDispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl<T: CommandTransport> CommandDispatcher<T> {
    /// Create a dispatcher for `host:port` using the move-all command code.
    pub fn new(host: impl Into<String>, port: u16, transport: T) -> Self {
        Self::with_code(host, port, MOVE_ALL_COMMAND_CODE, transport)
    }

    /// Create a dispatcher with a custom leading command code.
    pub fn with_code(host: impl Into<String>, port: u16, code: u32, transport: T) -> Self {
        Self {
            host: host.into(),
            port,
            code,
            transport,
        }
    }

    /// Request target without scheme, e.g.
    /// `192.168.3.14:4200/?command=10,90,90,0,90,90,25`.
    #[must_use]
    pub fn request_target(&self, command: &ActuatorCommand) -> String {
        let [base, shoulder, elbow, wrist_rotate, wrist_vertical, grip] = command.to_array();
        format!(
            "{}:{}/?command={},{},{},{},{},{},{}",
            self.host, self.port, self.code, base, shoulder, elbow, wrist_rotate, wrist_vertical, grip
        )
    }

    /// Full request URL.
    #[must_use]
    pub fn url(&self, command: &ActuatorCommand) -> String {
        format!("http://{}", self.request_target(command))
    }

    /// Send `command` to the arm controller.
    ///
    /// # Errors
    ///
    /// Returns the transport error. Callers log it and carry on.
    pub fn dispatch(&self, command: &ActuatorCommand) -> Result<()> {
        let url = self.url(command);
        debug!("Dispatching {}", url);
        self.transport.get(&url)
    }
}
