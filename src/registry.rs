//! Hook for pushing device names and areas to an external registry.

/// Name and area for one device, keyed by its stable identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUpdate {
    /// `<bridge id>_<point key>`.
    pub identifier: String,
    /// Override name, or the derived name.
    pub name: String,
    /// Override area, if configured.
    pub area: Option<String>,
}

/// Receives one update per known device after each discovery pass.
pub trait DeviceRegistry: Send + Sync {
    /// Applies an update. Unknown identifiers may be ignored.
    fn apply(&self, update: RegistryUpdate);
}

impl<F> DeviceRegistry for F
where
    F: Fn(RegistryUpdate) + Send + Sync,
{
    fn apply(&self, update: RegistryUpdate) {
        self(update);
    }
}
