use std::{ops::Deref, sync::Arc};

use kubently_common::args::FabricArgs;

use crate::{bus::CommandBus, capability::CapabilityRegistry, credstore::CredentialStore};

pub struct FabricStateInner {
    pub credstore: CredentialStore,
    pub bus: CommandBus,
    pub capabilities: CapabilityRegistry,
    pub args: FabricArgs,
}

/// Explicit, once-constructed process state (DESIGN NOTES §9: no implicit
/// singletons beyond the Prometheus recorder handle, which the teacher
/// treats as process-global already).
#[derive(Clone)]
pub struct FabricState {
    inner: Arc<FabricStateInner>,
}

impl Deref for FabricState {
    type Target = FabricStateInner;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FabricState {
    pub fn new(
        credstore: CredentialStore,
        bus: CommandBus,
        capabilities: CapabilityRegistry,
        args: FabricArgs,
    ) -> Self {
        Self {
            inner: Arc::new(FabricStateInner {
                credstore,
                bus,
                capabilities,
                args,
            }),
        }
    }
}
