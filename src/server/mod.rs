//! Network side of the remote shell.
//!
//! - `shell`: the session loop, usable on any async byte stream
//! - `listener`: TCP accept loop spawning one task per connection

mod listener;
mod shell;

pub use listener::Server;
pub use shell::{CommandShellServer, SessionEnd};
