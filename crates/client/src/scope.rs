//! RAII mount guard tying a connection to an enclosing scope.

use std::sync::Arc;

use crate::context::SocketContext;
use crate::manager::ConnectionManager;

/// Returned by [`ConnectionManager::mount`]. Dropping it (or calling
/// [`ConnectionScope::unmount`]) tears the connection down.
#[must_use = "dropping the scope disconnects immediately"]
#[derive(Debug)]
pub struct ConnectionScope {
    manager: Arc<ConnectionManager>,
}

impl ConnectionScope {
    pub(crate) fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn context(&self) -> SocketContext {
        self.manager.context()
    }

    pub fn unmount(self) {}
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        tracing::debug!("Connection scope unmounted");
        self.manager.teardown();
    }
}
