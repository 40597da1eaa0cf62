use chrono::{DateTime, SubsecRound, Utc};
use tokio::time::Instant;

/// Source of wall-clock timestamps and monotonic instants. Swapped out in tests so timer
/// arithmetic can be checked without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time, truncated to whole seconds since slots are stored at that
    /// precision.
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
pub mod testing {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::{DateTime, Utc};
    use tokio::time::Instant;

    use super::Clock;

    /// Clock that only moves when told to. Wall time and instants advance together.
    #[derive(Clone)]
    pub struct ManualClock {
        start_time: DateTime<Utc>,
        reference: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl ManualClock {
        pub fn new(start_time: DateTime<Utc>) -> Self {
            Self {
                start_time,
                reference: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }

        fn offset(&self) -> Duration {
            *self.offset.lock().unwrap()
        }
    }

    impl Clock for ManualClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + chrono::Duration::from_std(self.offset()).unwrap()
        }

        fn instant(&self) -> Instant {
            self.reference + self.offset()
        }
    }
}
