//! Hysteretic thermal escalation state machine
//!
//! Consumes one CPU temperature per poll cycle against the profile's
//! [`ThermalLimits`] and drives a four-zone state machine. Escalation is
//! immediate (a reading may jump several zones up); de-escalation moves one
//! zone per cycle and only after the temperature clears the zone's entry
//! boundary by a hysteresis margin, so a value oscillating across a
//! boundary by less than the margin produces no chatter. Leaving Emergency
//! additionally requires two consecutive qualifying cycles.
//!
//! Missing data is not evidence: an unreadable temperature holds the
//! current zone and emits a one-shot "sensors unavailable" notice instead
//! of an alert.

use crate::hw_profile::ThermalLimits;
use crate::profiles::PowerProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete thermal-risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThermalZone {
    Comfort,
    Warning,
    Critical,
    Emergency,
}

impl ThermalZone {
    /// Fixed profile output per zone.
    pub fn power_profile(&self) -> PowerProfile {
        match self {
            ThermalZone::Comfort => PowerProfile::Performance,
            ThermalZone::Warning => PowerProfile::Balanced,
            ThermalZone::Critical => PowerProfile::PowerSave,
            ThermalZone::Emergency => PowerProfile::Emergency,
        }
    }
}

impl std::fmt::Display for ThermalZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThermalZone::Comfort => write!(f, "comfort"),
            ThermalZone::Warning => write!(f, "warning"),
            ThermalZone::Critical => write!(f, "critical"),
            ThermalZone::Emergency => write!(f, "emergency"),
        }
    }
}

/// Mutable thermal state, owned by the controller and updated once per poll
/// cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ThermalState {
    /// Current zone
    pub zone: ThermalZone,
    /// Cycles spent at or above Warning in the current excursion; resets to
    /// zero only on return to Comfort
    pub escalation_count: u32,
    /// When the zone last changed
    pub last_transition_at: DateTime<Utc>,
}

/// One cycle's controller output for the apply step and collaborators.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Zone after this cycle
    pub zone: ThermalZone,
    /// Profile the apply step should drive toward
    pub profile: PowerProfile,
    /// Niceness recommendation for the process-priority collaborator
    pub nice_recommendation: i32,
    /// User-visible alerts (upward transitions only)
    pub alerts: Vec<String>,
    /// Operational notices (sensor outages); never surfaced as alerts
    pub notices: Vec<String>,
}

/// The hysteretic escalation controller.
pub struct EscalationController {
    limits: ThermalLimits,
    margin: f64,
    escalation_bound: u32,
    state: ThermalState,
    /// Consecutive cycles below `critical - margin` while in Emergency.
    emergency_cooldown_cycles: u32,
    /// Consecutive cycles spent in Critical; escalates past the bound.
    sustained_critical_cycles: u32,
    /// Whether the current excursion has crossed the shutdown ceiling.
    above_ceiling: bool,
    sensors_unavailable: bool,
}

impl EscalationController {
    pub fn new(limits: ThermalLimits, margin: f64, escalation_bound: u32) -> Self {
        Self {
            limits,
            margin,
            escalation_bound,
            state: ThermalState {
                zone: ThermalZone::Comfort,
                escalation_count: 0,
                last_transition_at: Utc::now(),
            },
            emergency_cooldown_cycles: 0,
            sustained_critical_cycles: 0,
            above_ceiling: false,
            sensors_unavailable: false,
        }
    }

    pub fn state(&self) -> &ThermalState {
        &self.state
    }

    /// Evaluate one poll cycle.
    pub fn evaluate(&mut self, cpu_temp: Option<f64>) -> Assessment {
        let mut alerts = Vec::new();
        let mut notices = Vec::new();

        match cpu_temp {
            None => {
                // Hold the zone; counters do not advance on guesses.
                if !self.sensors_unavailable {
                    self.sensors_unavailable = true;
                    notices.push(format!(
                        "sensors unavailable: holding thermal zone {}",
                        self.state.zone
                    ));
                }
            }
            Some(temp) => {
                self.sensors_unavailable = false;
                self.advance(temp, &mut alerts);
            }
        }

        let profile = self.state.zone.power_profile();
        Assessment {
            zone: self.state.zone,
            profile,
            nice_recommendation: profile.nice_recommendation(),
            alerts,
            notices,
        }
    }

    fn advance(&mut self, temp: f64, alerts: &mut Vec<String>) {
        let zone = self.state.zone;
        let band = self.band(temp);

        let mut next = if band > zone {
            // Escalation is immediate and may jump zones.
            band
        } else if band < zone {
            self.deescalate(zone, temp)
        } else {
            zone
        };

        if next != ThermalZone::Emergency {
            self.emergency_cooldown_cycles = 0;
        }

        // Escalation counter: cycles at or above Warning.
        if next >= ThermalZone::Warning {
            self.state.escalation_count += 1;
        } else {
            self.state.escalation_count = 0;
        }

        // Sustained Critical without a cooling response is its own failure
        // mode and escalates even below the numeric Emergency boundary.
        if next == ThermalZone::Critical {
            self.sustained_critical_cycles += 1;
            if self.sustained_critical_cycles > self.escalation_bound {
                next = ThermalZone::Emergency;
                alerts.push(format!(
                    "CPU EMERGENCY: sustained critical temperature ({:.1}C) without cooling response",
                    temp
                ));
            }
        } else {
            self.sustained_critical_cycles = 0;
        }

        if next != zone {
            self.state.last_transition_at = Utc::now();
            if next > zone {
                alerts.push(match next {
                    ThermalZone::Warning => format!("CPU WARNING: {:.1}C", temp),
                    ThermalZone::Critical => format!("CPU CRITICAL: {:.1}C", temp),
                    ThermalZone::Emergency => format!(
                        "CPU EMERGENCY: {:.1}C (limit: {:.0}C)",
                        temp, self.limits.critical
                    ),
                    ThermalZone::Comfort => unreachable!("comfort is never above another zone"),
                });
            }
        }

        // The shutdown ceiling gets its own alert, once per excursion.
        if temp >= self.limits.emergency {
            if !self.above_ceiling {
                self.above_ceiling = true;
                alerts.push(format!(
                    "CPU EMERGENCY: {:.1}C at or above shutdown ceiling {:.0}C",
                    temp, self.limits.emergency
                ));
            }
        } else {
            self.above_ceiling = false;
        }

        self.state.zone = next;
    }

    /// Zone a temperature lands in with no history.
    fn band(&self, temp: f64) -> ThermalZone {
        if temp >= self.limits.critical {
            ThermalZone::Emergency
        } else if temp >= self.limits.warning {
            ThermalZone::Critical
        } else if temp >= self.limits.comfort {
            ThermalZone::Warning
        } else {
            ThermalZone::Comfort
        }
    }

    /// One de-escalation step, gated by the hysteresis margin below the
    /// current zone's entry boundary.
    fn deescalate(&mut self, zone: ThermalZone, temp: f64) -> ThermalZone {
        match zone {
            ThermalZone::Emergency => {
                if temp < self.limits.critical - self.margin {
                    self.emergency_cooldown_cycles += 1;
                    // No same-cycle de-escalation: the first qualifying cycle
                    // arms the latch, the second completes the transition.
                    if self.emergency_cooldown_cycles >= 2 {
                        self.emergency_cooldown_cycles = 0;
                        return ThermalZone::Critical;
                    }
                } else {
                    self.emergency_cooldown_cycles = 0;
                }
                ThermalZone::Emergency
            }
            ThermalZone::Critical => {
                if temp < self.limits.warning - self.margin {
                    ThermalZone::Warning
                } else {
                    ThermalZone::Critical
                }
            }
            ThermalZone::Warning => {
                if temp < self.limits.comfort - self.margin {
                    ThermalZone::Comfort
                } else {
                    ThermalZone::Warning
                }
            }
            ThermalZone::Comfort => ThermalZone::Comfort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ThermalLimits {
        ThermalLimits {
            comfort: 65.0,
            warning: 75.0,
            critical: 85.0,
            emergency: 95.0,
        }
    }

    fn controller() -> EscalationController {
        EscalationController::new(limits(), 3.0, 3)
    }

    fn run(controller: &mut EscalationController, temps: &[f64]) -> Vec<ThermalZone> {
        temps
            .iter()
            .map(|&t| controller.evaluate(Some(t)).zone)
            .collect()
    }

    #[test]
    fn test_reference_temperature_sequence() {
        let mut c = controller();
        let zones = run(&mut c, &[60.0, 68.0, 77.0, 90.0, 74.0, 60.0]);
        assert_eq!(
            zones,
            vec![
                ThermalZone::Comfort,
                ThermalZone::Warning,
                ThermalZone::Critical,
                ThermalZone::Emergency,
                // The latch holds Emergency one extra cycle.
                ThermalZone::Emergency,
                ThermalZone::Critical,
            ]
        );

        // Cooling continues: stepwise back to Comfort once each margin is
        // cleared.
        let tail = run(&mut c, &[60.0, 60.0]);
        assert_eq!(tail, vec![ThermalZone::Warning, ThermalZone::Comfort]);
        assert_eq!(c.state().escalation_count, 0);
    }

    #[test]
    fn test_hysteresis_no_chatter_at_boundary() {
        // Oscillating across the Warning boundary (65) by less than the
        // margin must hold the zone after the single entry transition.
        let mut c = controller();
        let zones = run(&mut c, &[66.0, 64.0, 66.0, 64.0, 66.0, 64.0]);
        let transitions = zones.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(zones[0], ThermalZone::Warning);
        assert_eq!(transitions, 0);
    }

    #[test]
    fn test_escalation_count_monotonic_and_reset() {
        let mut c = controller();
        c.evaluate(Some(70.0)); // Warning
        assert_eq!(c.state().escalation_count, 1);
        c.evaluate(Some(78.0)); // Critical
        assert_eq!(c.state().escalation_count, 2);
        c.evaluate(Some(73.0)); // holds Critical (within margin of 72)
        assert_eq!(c.state().escalation_count, 3);
        c.evaluate(Some(70.0)); // Warning
        assert_eq!(c.state().escalation_count, 4);

        // Entering Comfort resets to exactly zero.
        c.evaluate(Some(55.0));
        assert_eq!(c.state().zone, ThermalZone::Comfort);
        assert_eq!(c.state().escalation_count, 0);
    }

    #[test]
    fn test_emergency_latch_requires_two_consecutive_cycles() {
        let mut c = controller();
        c.evaluate(Some(90.0));
        assert_eq!(c.state().zone, ThermalZone::Emergency);

        // First qualifying cycle arms the latch only.
        assert_eq!(c.evaluate(Some(80.0)).zone, ThermalZone::Emergency);
        // A non-qualifying cycle resets the latch.
        assert_eq!(c.evaluate(Some(84.0)).zone, ThermalZone::Emergency);
        assert_eq!(c.evaluate(Some(80.0)).zone, ThermalZone::Emergency);
        // Second consecutive qualifying cycle completes the step down.
        assert_eq!(c.evaluate(Some(80.0)).zone, ThermalZone::Critical);
    }

    #[test]
    fn test_sustained_critical_escalates_below_numeric_boundary() {
        let mut c = controller();
        let zones = run(&mut c, &[80.0, 80.0, 80.0, 80.0, 80.0]);
        // Three consecutive critical cycles are tolerated; the fourth
        // exceeds the bound and escalates despite 80 < 85.
        assert_eq!(zones[0], ThermalZone::Critical);
        assert_eq!(zones[2], ThermalZone::Critical);
        assert_eq!(zones[3], ThermalZone::Emergency);
        // 80 qualifies for exit, but the latch needs a second cycle.
        assert_eq!(zones[4], ThermalZone::Emergency);
    }

    #[test]
    fn test_absolute_ceiling_jumps_from_comfort() {
        let mut c = controller();
        assert_eq!(c.evaluate(Some(96.0)).zone, ThermalZone::Emergency);
    }

    #[test]
    fn test_shutdown_ceiling_alert_once_per_excursion() {
        let mut c = controller();
        let first = c.evaluate(Some(96.0));
        assert!(first.alerts.iter().any(|a| a.contains("shutdown ceiling")));
        // Holding above the ceiling does not repeat the alert.
        let second = c.evaluate(Some(97.0));
        assert!(!second.alerts.iter().any(|a| a.contains("shutdown ceiling")));
    }

    #[test]
    fn test_missing_data_holds_zone() {
        let mut c = controller();
        c.evaluate(Some(78.0));
        assert_eq!(c.state().zone, ThermalZone::Critical);
        let count_before = c.state().escalation_count;

        let mut notices = 0;
        for _ in 0..5 {
            let assessment = c.evaluate(None);
            assert_eq!(assessment.zone, ThermalZone::Critical);
            assert!(assessment.alerts.is_empty());
            notices += assessment.notices.len();
        }
        // One outage, one notice.
        assert_eq!(notices, 1);
        // Counters do not advance on guesses.
        assert_eq!(c.state().escalation_count, count_before);
    }

    #[test]
    fn test_notice_reemitted_after_recovery() {
        let mut c = controller();
        assert_eq!(c.evaluate(None).notices.len(), 1);
        assert_eq!(c.evaluate(None).notices.len(), 0);
        c.evaluate(Some(50.0));
        assert_eq!(c.evaluate(None).notices.len(), 1);
    }

    #[test]
    fn test_alerts_on_upward_transitions_only() {
        let mut c = controller();
        assert!(c.evaluate(Some(60.0)).alerts.is_empty());
        let up = c.evaluate(Some(78.0));
        assert_eq!(up.alerts.len(), 1);
        assert!(up.alerts[0].starts_with("CPU CRITICAL"));
        // Holding a zone raises nothing.
        assert!(c.evaluate(Some(78.0)).alerts.is_empty());
        // De-escalating raises nothing.
        assert!(c.evaluate(Some(60.0)).alerts.is_empty());
    }

    #[test]
    fn test_zone_profile_mapping_is_fixed() {
        assert_eq!(
            ThermalZone::Comfort.power_profile(),
            PowerProfile::Performance
        );
        assert_eq!(ThermalZone::Warning.power_profile(), PowerProfile::Balanced);
        assert_eq!(
            ThermalZone::Critical.power_profile(),
            PowerProfile::PowerSave
        );
        assert_eq!(
            ThermalZone::Emergency.power_profile(),
            PowerProfile::Emergency
        );
    }
}
