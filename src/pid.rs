use crate::clamp::sym;

/// `dt` is fixed at construction; the caller must tick at that cadence.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    dt: f64,

    /// Symmetric output clamp, if any
    max_output: Option<f64>,
    /// Symmetric anti-windup clamp on the accumulated integral
    integral_limit: Option<f64>,

    integral: f64,
    prev_error: f64,
}

impl Pid {
    pub fn new(kp: f64, ki: f64, kd: f64, dt: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            dt,
            max_output: None,
            integral_limit: None,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    /// Non-finite limits are ignored.
    pub fn with_max_output(mut self, max: Option<f64>) -> Self {
        self.max_output = max.filter(|v| v.is_finite()).map(f64::abs);
        self
    }

    pub fn with_integral_limit(mut self, limit: Option<f64>) -> Self {
        self.integral_limit = limit.filter(|v| v.is_finite()).map(f64::abs);
        self
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn prev_error(&self) -> f64 {
        self.prev_error
    }

    /// Clear integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    pub fn update(&mut self, error: f64) -> f64 {
        self.integral += error * self.dt;
        if let Some(limit) = self.integral_limit {
            self.integral = sym(self.integral, limit);
        }

        // First call after construction/reset differentiates against 0.
        let derivative = (error - self.prev_error) / self.dt;

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        self.prev_error = error;

        match self.max_output {
            Some(max) => sym(output, max),
            None => output,
        }
    }
}
