use ::metrics::{counter, describe_counter, describe_gauge, gauge};
use num_traits::ToPrimitive;

/// The ballast component a metric belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricScope {
    Executor,
    Infra,
}

/// A monotonically increasing counter, registered with its description and
/// initial value through [`MetricCounter::register`].
#[derive(Clone, Copy, Debug)]
pub struct MetricCounter {
    scope: MetricScope,
    name: &'static str,
    description: &'static str,
    initial_value: u64,
}

impl MetricCounter {
    pub const fn new(
        scope: MetricScope,
        name: &'static str,
        description: &'static str,
        initial_value: u64,
    ) -> Self {
        Self { scope, name, description, initial_value }
    }

    pub const fn get_name(&self) -> &'static str {
        self.name
    }

    pub const fn get_scope(&self) -> MetricScope {
        self.scope
    }

    pub const fn get_description(&self) -> &'static str {
        self.description
    }

    pub fn register(&self) {
        describe_counter!(self.name, self.description);
        counter!(self.name).absolute(self.initial_value);
    }

    pub fn increment(&self, value: u64) {
        counter!(self.name).increment(value);
    }

    #[cfg(any(feature = "testing", test))]
    pub fn parse_numeric_metric<T: num_traits::Num + std::str::FromStr>(
        &self,
        metrics_as_string: &str,
    ) -> Option<T> {
        crate::test_utils::parse_numeric_metric::<T>(metrics_as_string, self.name)
    }
}

/// A gauge holding the latest observed value.
#[derive(Clone, Copy, Debug)]
pub struct MetricGauge {
    scope: MetricScope,
    name: &'static str,
    description: &'static str,
}

impl MetricGauge {
    pub const fn new(scope: MetricScope, name: &'static str, description: &'static str) -> Self {
        Self { scope, name, description }
    }

    pub const fn get_name(&self) -> &'static str {
        self.name
    }

    pub const fn get_scope(&self) -> MetricScope {
        self.scope
    }

    pub const fn get_description(&self) -> &'static str {
        self.description
    }

    pub fn register(&self) {
        describe_gauge!(self.name, self.description);
        gauge!(self.name).set(0_f64);
    }

    pub fn set<T: Into<f64>>(&self, value: T) {
        gauge!(self.name).set(value.into());
    }

    /// Sets the gauge from a numeric type with no lossless `f64` conversion
    /// (`u64`, `usize`, ...).
    pub fn set_lossy<T: ToPrimitive>(&self, value: T) {
        gauge!(self.name).set(value.to_f64().expect("gauge value not representable as f64"));
    }

    pub fn increment<T: Into<f64>>(&self, value: T) {
        gauge!(self.name).increment(value.into());
    }

    pub fn decrement<T: Into<f64>>(&self, value: T) {
        gauge!(self.name).decrement(value.into());
    }

    #[cfg(any(feature = "testing", test))]
    pub fn parse_numeric_metric<T: num_traits::Num + std::str::FromStr>(
        &self,
        metrics_as_string: &str,
    ) -> Option<T> {
        crate::test_utils::parse_numeric_metric::<T>(metrics_as_string, self.name)
    }
}
