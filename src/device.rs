//! Device descriptor handed to the manager by the enumeration layer

/// Identity of the accelerator a manager drives.
///
/// Device enumeration and selection happen before the manager is built;
/// the manager only reports this descriptor back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuDevice {
    /// Ordinal reported by the platform runtime
    pub id: i32,
    /// Marketing name reported by the platform runtime
    pub name: String,
}

impl GpuDevice {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        GpuDevice {
            id,
            name: name.into(),
        }
    }
}
