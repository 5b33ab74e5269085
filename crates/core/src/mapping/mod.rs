use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Atmosphere, VisualMode};

/// Routes a stabilised atmosphere to the visual mode that suits it.
///
/// Labels missing from the table fall back to [`ModeMapping::fallback`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeMapping {
    pub routes: BTreeMap<Atmosphere, VisualMode>,
    pub fallback: VisualMode,
}

impl Default for ModeMapping {
    fn default() -> Self {
        let routes = BTreeMap::from([
            (Atmosphere::Ambient, VisualMode::Orbit),
            (Atmosphere::Quiet, VisualMode::Lattice),
            (Atmosphere::Calm, VisualMode::Orbit),
            (Atmosphere::Bright, VisualMode::Pulse),
            (Atmosphere::Energetic, VisualMode::Particles),
        ]);
        Self {
            routes,
            fallback: VisualMode::Orbit,
        }
    }
}

impl ModeMapping {
    /// Mapping with no routes; every label resolves to `fallback`.
    pub fn empty(fallback: VisualMode) -> Self {
        Self {
            routes: BTreeMap::new(),
            fallback,
        }
    }

    pub fn route(&mut self, atmosphere: Atmosphere, mode: VisualMode) {
        self.routes.insert(atmosphere, mode);
    }

    pub fn mode_for(&self, atmosphere: Atmosphere) -> VisualMode {
        self.routes
            .get(&atmosphere)
            .copied()
            .unwrap_or(self.fallback)
    }
}
