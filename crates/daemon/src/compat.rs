//! Hardware signal-compatibility rules.
//!
//! The band computes navigation deltas on-device from the same inertial
//! sensors it would otherwise stream raw, so `navigation` and the two IMU
//! signals are mutually exclusive. The check runs over the union of every
//! connection's active signals: two different clients cannot hold
//! conflicting features either.

use std::collections::HashSet;

use band_types::{CommandError, SignalType};

fn conflicts_of(signal: SignalType) -> &'static [SignalType] {
    match signal {
        SignalType::Navigation => &[SignalType::ImuAcc, SignalType::ImuGyro],
        SignalType::ImuAcc | SignalType::ImuGyro => &[SignalType::Navigation],
        _ => &[],
    }
}

/// Decides whether `signal` may be enabled given the device-wide active set.
/// Enabling an already-active signal is a no-op success so that multiple
/// clients can share one signal.
pub fn can_enable(signal: SignalType, active: &HashSet<SignalType>) -> Result<(), CommandError> {
    if active.contains(&signal) {
        return Ok(());
    }
    for &with in conflicts_of(signal) {
        if active.contains(&with) {
            return Err(CommandError::Conflict {
                signal,
                with,
                reason: format!(
                    "{signal} and {with} cannot be active on the device at the same time"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(signals: &[SignalType]) -> HashSet<SignalType> {
        signals.iter().copied().collect()
    }

    #[test]
    fn navigation_conflicts_with_both_imu_signals() {
        let err = can_enable(SignalType::Navigation, &active(&[SignalType::ImuAcc])).unwrap_err();
        assert_eq!(err.conflict_with(), Some(SignalType::ImuAcc));

        let err = can_enable(SignalType::Navigation, &active(&[SignalType::ImuGyro])).unwrap_err();
        assert_eq!(err.conflict_with(), Some(SignalType::ImuGyro));
    }

    #[test]
    fn imu_conflicts_with_active_navigation() {
        let set = active(&[SignalType::Navigation]);
        assert!(can_enable(SignalType::ImuAcc, &set).is_err());
        assert!(can_enable(SignalType::ImuGyro, &set).is_err());
    }

    #[test]
    fn unconstrained_signals_combine_freely() {
        let set = active(&[SignalType::Navigation, SignalType::Snc]);
        for signal in [
            SignalType::Gesture,
            SignalType::Pressure,
            SignalType::Snc,
            SignalType::Battery,
            SignalType::Button,
        ] {
            assert!(can_enable(signal, &set).is_ok(), "{signal} should be allowed");
        }
    }

    #[test]
    fn already_active_signal_is_a_noop_success() {
        let set = active(&[SignalType::Navigation]);
        assert!(can_enable(SignalType::Navigation, &set).is_ok());
    }

    #[test]
    fn both_imu_signals_can_coexist() {
        let set = active(&[SignalType::ImuAcc]);
        assert!(can_enable(SignalType::ImuGyro, &set).is_ok());
    }
}
