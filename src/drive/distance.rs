/// Accumulated absolute forward (Z) displacement of the player this run.
#[derive(Debug, Clone, Default)]
pub struct DistanceMeter {
    last_z: Option<f32>,
    total: f32,
}

impl DistanceMeter {
    pub fn track(&mut self, z: f32) {
        if let Some(prev) = self.last_z {
            self.total += (z - prev).abs();
        }
        self.last_z = Some(z);
    }

    /// Forget the previous sample without touching the total (car teleported).
    pub fn rebase(&mut self) {
        self.last_z = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn distance(&self) -> f32 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_absolute_displacement() {
        let mut m = DistanceMeter::default();
        m.track(0.0);
        m.track(-10.0);
        m.track(-12.5);
        m.track(-11.5);
        assert_eq!(m.distance(), 13.5);
    }

    #[test]
    fn rebase_skips_the_jump() {
        let mut m = DistanceMeter::default();
        m.track(0.0);
        m.track(-5.0);
        m.rebase();
        m.track(100.0);
        m.track(99.0);
        assert_eq!(m.distance(), 6.0);
    }
}
