#![cfg(feature = "macros")]

use stampede::macros::{aggregate, metric};
use stampede::{Aggregate, Metric};

#[metric]
struct QueueDepth(u64);

#[aggregate]
struct DepthTotals {
    samples: u64,
    deepest: u64,
}

impl Aggregate for DepthTotals {
    type Metric = QueueDepth;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.samples += 1;
        self.deepest = self.deepest.max(metric.0);
    }

    fn merge(&mut self, other: Self) {
        self.samples += other.samples;
        self.deepest = self.deepest.max(other.deepest);
    }
}

#[test]
fn custom_types_plug_into_the_pipeline() {
    let mut a = DepthTotals::new();
    a.aggregate(&[QueueDepth(3), QueueDepth(9)]);
    let mut b = DepthTotals::new();
    b.consume(&QueueDepth(4));

    a.merge(b);
    assert_eq!(a, DepthTotals { samples: 3, deepest: 9 });
    assert!(QueueDepth(1) < QueueDepth(2));

    let json = serde_json::to_string(&a).unwrap();
    assert_eq!(serde_json::from_str::<DepthTotals>(&json).unwrap(), a);
}
