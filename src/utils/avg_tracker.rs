use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AvgTracker {
    total: f64,
    count: u64,
}

impl AvgTracker {
    /// NaN until something has been added
    pub fn get(&self) -> f64 {
        if self.count > 0 {
            self.total / self.count as f64
        } else {
            f64::NAN
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl AddAssign<f64> for AvgTracker {
    fn add_assign(&mut self, val: f64) {
        if !val.is_nan() {
            self.total += val;
            self.count += 1;
        }
    }
}
