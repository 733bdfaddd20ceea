use core::time::Duration;

use crate::dataset::{OperationalDataset, Timestamp, TimestampDelta};

/// Delay before a border router commits a pending dataset.
pub const COMMIT_DELAY: Duration = Duration::from_secs(60);

/// How the dataset of a border router and an external dataset must be
/// merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The external dataset replaces the local one.
    AdoptExternal {
        /// Delay before the border router commits the dataset.
        commit_delay: Duration,
    },
    /// The external dataset is older than the local one: its active timestamp
    /// must be advanced by `delta` before being written.
    KeepLocalBumpExternal {
        /// Distance between the local and the external active timestamps.
        delta: TimestampDelta,
        /// Delay before the border router commits the dataset.
        commit_delay: Duration,
    },
}

impl Decision {
    /// Returns the commit delay.
    #[must_use]
    pub const fn commit_delay(&self) -> Duration {
        match self {
            Self::AdoptExternal { commit_delay }
            | Self::KeepLocalBumpExternal { commit_delay, .. } => *commit_delay,
        }
    }

    /// Builds the pending dataset to write, starting from `external`.
    ///
    /// The returned dataset carries a delay timer equal to the commit delay.
    /// When the local dataset must be kept, the active timestamp of the
    /// external dataset is advanced by the decision delta.
    #[must_use]
    pub fn resolve(&self, external: &OperationalDataset) -> OperationalDataset {
        let mut resolved = external.clone();

        if let Self::KeepLocalBumpExternal { delta, .. } = self {
            let timestamp = external
                .active_timestamp()
                .unwrap_or(Timestamp::new(0, 0, false));
            resolved.set_active_timestamp(timestamp.advanced_by(*delta));
        }

        resolved.set_delay_timer(self.commit_delay());
        resolved
    }
}

/// Decides how `external` must be merged into the `local` dataset of a
/// border router.
///
/// Only the active timestamps are compared. A local dataset without an
/// active timestamp is always replaced, while an external dataset without one
/// counts as timestamp zero.
#[must_use]
pub fn reconcile(local: &OperationalDataset, external: &OperationalDataset) -> Decision {
    let Some(local) = local.active_timestamp() else {
        return Decision::AdoptExternal {
            commit_delay: COMMIT_DELAY,
        };
    };
    let external = external
        .active_timestamp()
        .unwrap_or(Timestamp::new(0, 0, false));

    if external.total_ticks() > local.total_ticks() {
        Decision::AdoptExternal {
            commit_delay: COMMIT_DELAY,
        }
    } else {
        Decision::KeepLocalBumpExternal {
            delta: TimestampDelta::between(local, external),
            commit_delay: COMMIT_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use crate::dataset::tests::dataset_with_timestamp;
    use crate::dataset::{OperationalDataset, Timestamp, TimestampDelta, TlvType};

    use super::{COMMIT_DELAY, Decision, reconcile};

    #[test]
    fn newer_external_is_adopted() {
        let decision = reconcile(&dataset_with_timestamp(1), &dataset_with_timestamp(2));
        assert_eq!(
            decision,
            Decision::AdoptExternal {
                commit_delay: Duration::from_secs(60)
            }
        );

        let external = dataset_with_timestamp(2);
        let resolved = decision.resolve(&external);
        assert_eq!(resolved.active_timestamp(), external.active_timestamp());
        assert_eq!(resolved.delay_timer(), Some(COMMIT_DELAY));
    }

    #[test]
    fn older_external_is_bumped() {
        let decision = reconcile(&dataset_with_timestamp(5), &dataset_with_timestamp(2));
        assert_eq!(
            decision,
            Decision::KeepLocalBumpExternal {
                delta: TimestampDelta::from_secs(3),
                commit_delay: COMMIT_DELAY,
            }
        );

        let resolved = decision.resolve(&dataset_with_timestamp(2));
        assert_eq!(
            resolved.active_timestamp(),
            Some(Timestamp::new(5, 0, false))
        );
        assert_eq!(resolved.delay_timer(), Some(COMMIT_DELAY));
        assert_eq!(resolved.network_name(), Some("home-mesh"));
    }

    #[test]
    fn equal_timestamps_keep_local() {
        let decision = reconcile(&dataset_with_timestamp(7), &dataset_with_timestamp(7));
        assert_eq!(
            decision,
            Decision::KeepLocalBumpExternal {
                delta: TimestampDelta::ZERO,
                commit_delay: COMMIT_DELAY,
            }
        );
    }

    #[test]
    fn ticks_break_ties_on_seconds() {
        let mut local = dataset_with_timestamp(0);
        local.set_active_timestamp(Timestamp::new(4, 10, false));
        let mut external = dataset_with_timestamp(0);
        external.set_active_timestamp(Timestamp::new(4, 11, true));

        assert!(matches!(
            reconcile(&local, &external),
            Decision::AdoptExternal { .. }
        ));
        assert_eq!(
            reconcile(&external, &local),
            Decision::KeepLocalBumpExternal {
                delta: TimestampDelta::from_ticks(1),
                commit_delay: COMMIT_DELAY,
            }
        );
    }

    #[test]
    fn missing_timestamps() {
        let without_timestamp = OperationalDataset::new()
            .with(TlvType::NetworkName, b"other")
            .unwrap();

        assert!(matches!(
            reconcile(&without_timestamp, &dataset_with_timestamp(3)),
            Decision::AdoptExternal { .. }
        ));

        let decision = reconcile(&dataset_with_timestamp(3), &without_timestamp);
        assert_eq!(
            decision,
            Decision::KeepLocalBumpExternal {
                delta: TimestampDelta::from_secs(3),
                commit_delay: COMMIT_DELAY,
            }
        );
        assert_eq!(
            decision.resolve(&without_timestamp).active_timestamp(),
            Some(Timestamp::new(3, 0, false))
        );
    }
}
