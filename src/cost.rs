/// Kinematic cost model shared by all scoring code.
///
/// Travel times come from a symmetric trapezoidal velocity profile;
/// rewards decay multiplicatively per second of travel. Every robot prices
/// distance through the same closed form so bids stay comparable.
#[derive(Clone, Copy, Debug)]
pub struct CostModel {
    pub v_max: f64,
    pub a_max: f64,
    pub lambda: f64,
}

impl CostModel {
    pub fn new(v_max: f64, a_max: f64, lambda: f64) -> Self {
        CostModel {
            v_max,
            a_max,
            lambda,
        }
    }

    /// Seconds to cover `dist` meters from standstill to standstill.
    ///
    /// Below the ramp distance `d_a = v_max^2 / a_max` the robot never
    /// reaches cruise speed and the time is `2 * sqrt(dist / a_max)`;
    /// beyond it the profile flattens into `v_max / a_max + dist / v_max`.
    pub fn travel_time(&self, dist: f64) -> f64 {
        let d_a = (self.v_max * self.v_max) / self.a_max;
        if dist < d_a {
            2.0 * (dist / self.a_max).sqrt()
        } else {
            self.v_max / self.a_max + dist / self.v_max
        }
    }

    /// Reward for reaching a task `cost` seconds into the plan.
    pub fn discounted(&self, cost: f64, reward: f64) -> f64 {
        self.lambda.powf(cost) * reward
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    fn model() -> CostModel {
        CostModel::new(3.0, 1.0, 0.95)
    }

    #[test]
    fn ramp_below_cruise_distance() {
        // d_a = 9; a 4m hop stays on the acceleration ramp
        assert_approx_eq!(model().travel_time(4.0), 4.0);
        assert_approx_eq!(model().travel_time(0.0), 0.0);
    }

    #[test]
    fn ramp_above_cruise_distance() {
        // 3/1 + 30/3
        assert_approx_eq!(model().travel_time(30.0), 13.0);
    }

    #[test]
    fn ramp_is_continuous_at_the_switch() {
        let m = model();
        let d_a = m.v_max * m.v_max / m.a_max;
        assert_approx_eq!(m.travel_time(d_a - 1e-9), m.travel_time(d_a), 1e-6);
    }

    #[test]
    fn discount_decays_with_cost() {
        let m = model();
        assert_approx_eq!(m.discounted(0.0, 10.0), 10.0);
        assert!(m.discounted(5.0, 10.0) < m.discounted(1.0, 10.0));
    }

    #[test]
    fn unit_lambda_disables_decay() {
        let m = CostModel::new(3.0, 1.0, 1.0);
        assert_approx_eq!(m.discounted(100.0, 7.0), 7.0);
    }
}
