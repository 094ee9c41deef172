//! Stimulator device descriptor.

/// A stimulation device driving one or more coil elements.
///
/// Stimulators are owned by the [`Coil`](crate::Coil) arena and referenced by
/// index; several elements referencing the same index share one logical
/// device, and that identity survives serialization round-trips.
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulator {
    pub name: Option<String>,
    pub brand: Option<String>,
    /// Maximum rated rate of change of current (A/s), if known.
    pub max_di_dt: Option<f64>,
    /// Current rate of change of coil current (A/s); scales the vector
    /// potential into the induced field, `dA/dt = di_dt * A`.
    pub di_dt: f64,
}

impl Stimulator {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

impl Default for Stimulator {
    fn default() -> Self {
        Self {
            name: None,
            brand: None,
            max_di_dt: None,
            di_dt: 1.0,
        }
    }
}
