use std::sync::Arc;

use labctl::machine::{BoxFuture, Machine, MockMachine, Shell};
use labctl::provision::Machines;

/// Hands out pre-built machines, so provisioning steps can run against
/// mocks without going through the memoized ssh/kubectl chain.
pub struct FixedMachines {
    pub secrets: Arc<dyn Machine>,
    pub remote: Arc<Shell>,
    pub control: Arc<dyn Machine>,
}

impl FixedMachines {
    /// Every machine is a fresh, unrelated mock.
    pub fn mocks() -> (Self, Mocks) {
        let mocks = Mocks {
            secrets: MockMachine::new(),
            remote: MockMachine::new(),
            control: MockMachine::new(),
        };
        let machines = Self {
            secrets: Arc::new(mocks.secrets.clone()),
            remote: Arc::new(Shell::new(mocks.remote.clone())),
            control: Arc::new(mocks.control.clone()),
        };
        (machines, mocks)
    }

    pub fn with_remote(mut self, remote: Shell) -> Self {
        self.remote = Arc::new(remote);
        self
    }
}

/// Handles onto the mocks behind [`FixedMachines::mocks`].
pub struct Mocks {
    pub secrets: MockMachine,
    pub remote: MockMachine,
    pub control: MockMachine,
}

impl Machines for FixedMachines {
    fn secrets(&self) -> BoxFuture<'_, anyhow::Result<Arc<dyn Machine>>> {
        let m = Arc::clone(&self.secrets);
        Box::pin(async move { Ok(m) })
    }

    fn remote(&self) -> BoxFuture<'_, anyhow::Result<Arc<Shell>>> {
        let m = Arc::clone(&self.remote);
        Box::pin(async move { Ok(m) })
    }

    fn control(&self) -> BoxFuture<'_, anyhow::Result<Arc<dyn Machine>>> {
        let m = Arc::clone(&self.control);
        Box::pin(async move { Ok(m) })
    }
}
