use std::collections::{HashMap, HashSet};

use crate::models::{LatLon, VehicleId};

/// Whatever draws vehicle markers. The core only places, moves and removes them.
pub trait MarkerLayer {
    fn place(&mut self, id: &VehicleId, pos: LatLon);
    fn move_to(&mut self, id: &VehicleId, pos: LatLon);
    fn remove(&mut self, id: &VehicleId);
}

/// Keeps a [`MarkerLayer`] in step with interpolated frames and evictions.
#[derive(Debug, Default)]
pub struct MarkerSync<L> {
    layer: L,
    placed: HashSet<VehicleId>,
}

impl<L: MarkerLayer> MarkerSync<L> {
    pub fn new(layer: L) -> Self {
        Self {
            layer,
            placed: HashSet::new(),
        }
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn placed(&self) -> usize {
        self.placed.len()
    }

    /// Draw one frame: place markers seen for the first time, move the rest.
    pub fn frame(&mut self, positions: &HashMap<VehicleId, LatLon>) {
        for (id, pos) in positions {
            if self.placed.contains(id) {
                self.layer.move_to(id, *pos);
            } else {
                self.layer.place(id, *pos);
                self.placed.insert(id.clone());
            }
        }
    }

    /// Tear down markers for vehicles the tracker evicted
    pub fn release(&mut self, evicted: &[VehicleId]) {
        for id in evicted {
            if self.placed.remove(id) {
                self.layer.remove(id);
            }
        }
    }
}

/// Marker layer for headless runs: reports marker changes through `tracing`
#[derive(Debug, Default)]
pub struct TracingLayer;

impl MarkerLayer for TracingLayer {
    fn place(&mut self, id: &VehicleId, pos: LatLon) {
        tracing::info!(vehicle_id = %id, lat = pos.lat, lon = pos.lon, "Placing marker");
    }

    fn move_to(&mut self, id: &VehicleId, pos: LatLon) {
        tracing::trace!(vehicle_id = %id, lat = pos.lat, lon = pos.lon, "Moving marker");
    }

    fn remove(&mut self, id: &VehicleId) {
        tracing::info!(vehicle_id = %id, "Removing marker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl MarkerLayer for Recorder {
        fn place(&mut self, id: &VehicleId, _: LatLon) {
            self.0.push(format!("place {id}"));
        }
        fn move_to(&mut self, id: &VehicleId, _: LatLon) {
            self.0.push(format!("move {id}"));
        }
        fn remove(&mut self, id: &VehicleId) {
            self.0.push(format!("remove {id}"));
        }
    }

    #[test]
    fn places_once_then_moves_then_removes() {
        let mut sync = MarkerSync::new(Recorder::default());
        let frame = HashMap::from([(VehicleId::from("B1"), LatLon::new(1.0, 2.0))]);

        sync.frame(&frame);
        sync.frame(&frame);
        sync.release(&[VehicleId::from("B1"), VehicleId::from("never-drawn")]);

        assert_eq!(sync.layer().0, vec!["place B1", "move B1", "remove B1"]);
        assert_eq!(sync.placed(), 0);
    }
}
