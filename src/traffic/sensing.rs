// ==============================================================================
// sensing.rs — FORWARD BOX-CAST SENSING (INTERFACE + IN-MEMORY VIEW)
// ------------------------------------------------------------------------------
// Traffic agents never read another agent's state. Everything they know about
// the road comes from two queries:
// - cast(probe, me): sweep a box along the probe direction and return the
//   nearest hit that does not belong to `me`
// - locate(key): where a previously sensed vehicle is now (None once gone)
//
// PhysicsWorld implements this against rapier's query pipeline. AabbTraffic is
// an engine-free view over axis-aligned boxes, used for headless runs and
// tests.
// ==============================================================================

use std::fmt::Debug;

pub type Vec3 = [f32; 3];

pub const FORWARD: Vec3 = [0.0, 0.0, -1.0];
pub const UP: Vec3 = [0.0, 1.0, 0.0];

/// A box swept from `origin` along `direction` for `distance` meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxProbe {
    pub origin: Vec3,
    pub half_extents: Vec3,
    pub direction: Vec3,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensedVehicle<K> {
    pub key: K,
    pub position: Vec3,
    pub velocity: Vec3,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SenseHit<K> {
    Vehicle(SensedVehicle<K>),
    /// Something on the vehicle layer without a rigid body behind it.
    Unbodied { label: String, distance: f32 },
}

impl<K> SenseHit<K> {
    pub fn distance(&self) -> f32 {
        match self {
            SenseHit::Vehicle(v) => v.distance,
            SenseHit::Unbodied { distance, .. } => *distance,
        }
    }
}

pub trait TrafficSensor {
    type Key: Copy + Eq + Debug;

    fn cast(&self, probe: &BoxProbe, me: Self::Key) -> Option<SenseHit<Self::Key>>;

    fn locate(&self, key: Self::Key) -> Option<Vec3>;
}

// ------------------------------------------------------------------
// In-memory view
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AabbVehicle {
    pub key: u32,
    pub center: Vec3,
    pub half_extents: Vec3,
    /// None for colliders on the vehicle layer that have no body.
    pub velocity: Option<Vec3>,
}

/// Axis-aligned boxes that only sweep along Z, which is all traffic needs
/// since every car is held facing the road.
#[derive(Debug, Clone, Default)]
pub struct AabbTraffic {
    pub vehicles: Vec<AabbVehicle>,
}

fn overlaps(a_center: f32, a_half: f32, b_center: f32, b_half: f32) -> bool {
    (a_center - b_center).abs() < a_half + b_half
}

impl AabbTraffic {
    pub fn insert(&mut self, key: u32, center: Vec3, half_extents: Vec3, velocity: Option<Vec3>) {
        self.remove(key);
        self.vehicles.push(AabbVehicle { key, center, half_extents, velocity });
    }

    pub fn remove(&mut self, key: u32) {
        self.vehicles.retain(|v| v.key != key);
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut AabbVehicle> {
        self.vehicles.iter_mut().find(|v| v.key == key)
    }

    /// Time of impact along Z for a probe sweeping toward `dir_z`'s sign.
    fn sweep_z(probe: &BoxProbe, v: &AabbVehicle) -> Option<f32> {
        let dir = probe.direction[2].signum();
        if dir == 0.0 {
            return None;
        }

        let (pz, ph) = (probe.origin[2], probe.half_extents[2]);
        let (vz, vh) = (v.center[2], v.half_extents[2]);

        if overlaps(pz, ph, vz, vh) {
            return Some(0.0);
        }

        // distance between the probe's leading face and the vehicle's near face
        let gap = if dir < 0.0 { (pz - ph) - (vz + vh) } else { (vz - vh) - (pz + ph) };
        (gap >= 0.0 && gap <= probe.distance).then_some(gap)
    }
}

impl TrafficSensor for AabbTraffic {
    type Key = u32;

    fn cast(&self, probe: &BoxProbe, me: u32) -> Option<SenseHit<u32>> {
        self.vehicles
            .iter()
            .filter(|v| v.key != me)
            .filter(|v| {
                overlaps(probe.origin[0], probe.half_extents[0], v.center[0], v.half_extents[0])
                    && overlaps(probe.origin[1], probe.half_extents[1], v.center[1], v.half_extents[1])
            })
            .filter_map(|v| Self::sweep_z(probe, v).map(|toi| (toi, v)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(toi, v)| match v.velocity {
                Some(velocity) => SenseHit::Vehicle(SensedVehicle {
                    key: v.key,
                    position: v.center,
                    velocity,
                    distance: toi,
                }),
                None => SenseHit::Unbodied {
                    label: format!("static#{}", v.key),
                    distance: toi,
                },
            })
    }

    fn locate(&self, key: u32) -> Option<Vec3> {
        self.vehicles.iter().find(|v| v.key == key).map(|v| v.center)
    }
}
