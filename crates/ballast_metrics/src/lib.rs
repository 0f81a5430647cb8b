pub mod metrics;

#[cfg(any(feature = "testing", test))]
pub mod test_utils;

/// Declares the metrics of a component: a `pub const` per metric, grouped
/// under a [`metrics::MetricScope`].
///
/// ```
/// use ballast_metrics::define_metrics;
///
/// define_metrics!(
///     Executor => {
///         MetricCounter { MOVES_STARTED, "executor_moves_started", "Counter of started moves", init = 0 },
///         MetricGauge { MOVES_IN_FLIGHT, "executor_moves_in_flight", "Moves currently in flight" },
///     },
/// );
/// ```
#[macro_export]
macro_rules! define_metrics {
    (
        $(
            $scope:ident => {
                $(
                    $kind:ident { $name:ident, $key:expr, $desc:expr $(, init = $init:expr)? }
                ),+
                $(,)?
            }
        ),+
        $(,)?
    ) => {
        $(
            $(
                $crate::define_metrics!(@define $scope, $kind, $name, $key, $desc $(, $init)?);
            )+
        )+
    };
    (@define $scope:ident, MetricCounter, $name:ident, $key:expr, $desc:expr, $init:expr) => {
        pub const $name: $crate::metrics::MetricCounter = $crate::metrics::MetricCounter::new(
            $crate::metrics::MetricScope::$scope,
            $key,
            $desc,
            $init,
        );
    };
    (@define $scope:ident, MetricGauge, $name:ident, $key:expr, $desc:expr) => {
        pub const $name: $crate::metrics::MetricGauge = $crate::metrics::MetricGauge::new(
            $crate::metrics::MetricScope::$scope,
            $key,
            $desc,
        );
    };
}
