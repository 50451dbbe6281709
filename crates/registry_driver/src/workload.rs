//! Dispatch and churn workloads run by the driver.
//!
//! Each workload builds its own dispatcher, checks the registry's ordering
//! and bookkeeping guarantees at the configured scale, and returns a report
//! that is printed as JSON.

use crate::config::WorkloadSettings;
use crate::error::DriverError;
use listener_registry::{
    DispatchStats, Dispatcher, EventFamily, ListenerError, RegistryConfig, SlotTable, TypeKey,
};
use serde::Serialize;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Churn rounds rotate their typed registrations over this many channels
const CHURN_CHANNELS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Fanout,
    Churn,
    All,
}

impl WorkloadKind {
    pub fn includes_fanout(self) -> bool {
        matches!(self, WorkloadKind::Fanout | WorkloadKind::All)
    }

    pub fn includes_churn(self) -> bool {
        matches!(self, WorkloadKind::Churn | WorkloadKind::All)
    }
}

/// Event fired by the workloads; `channel: None` reaches ANY tables only
#[derive(Debug, Clone, Copy)]
pub struct Pulse {
    pub channel: Option<u32>,
}

/// Listener that only records which tier it was registered in
#[derive(Debug)]
pub struct Probe {
    deferred: bool,
}

impl Probe {
    fn normal() -> Arc<Self> {
        Arc::new(Self { deferred: false })
    }

    fn deferred() -> Arc<Self> {
        Arc::new(Self { deferred: true })
    }
}

/// Counts deliveries per tier and flags normal deliveries seen after a deferred one
#[derive(Debug, Default)]
pub struct ProbeFamily {
    normal_seen: Cell<usize>,
    deferred_seen: Cell<usize>,
    order_violations: Cell<usize>,
}

impl ProbeFamily {
    fn reset(&self) {
        self.normal_seen.set(0);
        self.deferred_seen.set(0);
        self.order_violations.set(0);
    }
}

impl EventFamily for ProbeFamily {
    type Event = Pulse;
    type Listener = Probe;
    type Key = u32;

    fn classify(&self, event: &Pulse) -> TypeKey<u32> {
        event.channel.map_or(TypeKey::Any, TypeKey::Type)
    }

    fn handle(&self, listener: &Probe, _event: &Pulse) -> Result<(), ListenerError> {
        if listener.deferred {
            self.deferred_seen.set(self.deferred_seen.get() + 1);
        } else {
            if self.deferred_seen.get() > 0 {
                self.order_violations.set(self.order_violations.get() + 1);
            }
            self.normal_seen.set(self.normal_seen.get() + 1);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FanoutReport {
    pub normal_listeners: usize,
    pub deferred_listeners: usize,
    pub normal_delivered: usize,
    pub deferred_delivered: usize,
    pub order_violations: usize,
    pub register_micros: u128,
    pub fire_micros: u128,
    pub stats: DispatchStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChurnReport {
    pub rounds: usize,
    pub registrations: usize,
    pub removals: usize,
    pub reclaimed_weak: usize,
    pub expected_listeners: usize,
    pub final_listeners: usize,
    pub table_peak_backing: usize,
    pub table_bound_violations: usize,
    pub elapsed_micros: u128,
    pub stats: DispatchStats,
}

/// Registers normal and deferred listeners interleaved, fires one event that
/// reaches all of them and checks that every normal delivery came first.
pub fn fanout(settings: &WorkloadSettings, registry: &RegistryConfig) -> Result<FanoutReport, DriverError> {
    let normal = settings.normal_listeners;
    let deferred = settings.deferred_listeners;
    info!("📤 Fanout: {} normal + {} deferred listeners", normal, deferred);

    let dispatcher = Dispatcher::with_config(ProbeFamily::default(), registry);

    let started = Instant::now();
    for i in 0..normal.max(deferred) {
        if i < normal {
            dispatcher.add(&Probe::normal(), false);
        }
        if i < deferred {
            dispatcher.add_deferred(&Probe::deferred(), false);
        }
    }
    let register_micros = started.elapsed().as_micros();

    let started = Instant::now();
    let fired = dispatcher.fire(&Pulse { channel: None });
    let fire_micros = started.elapsed().as_micros();

    let family = dispatcher.family();
    let report = FanoutReport {
        normal_listeners: normal,
        deferred_listeners: deferred,
        normal_delivered: family.normal_seen.get(),
        deferred_delivered: family.deferred_seen.get(),
        order_violations: family.order_violations.get(),
        register_micros,
        fire_micros,
        stats: dispatcher.stats(),
    };

    if fired.invoked() != normal + deferred
        || report.normal_delivered != normal
        || report.deferred_delivered != deferred
    {
        return Err(verification_failed(
            "fanout",
            format!(
                "expected {} + {} deliveries, got {} + {}",
                normal, deferred, report.normal_delivered, report.deferred_delivered
            ),
        ));
    }
    if report.order_violations > 0 {
        return Err(verification_failed(
            "fanout",
            format!("{} normal listeners fired after a deferred one", report.order_violations),
        ));
    }

    info!("✅ Fanout delivered {} events in {}µs", fired.invoked(), fire_micros);
    Ok(report)
}

/// Repeated rounds of mixed strong/weak registration, explicit removal and
/// weak reclamation, followed by a slot-table bound check.
pub fn churn(settings: &WorkloadSettings, registry: &RegistryConfig) -> Result<ChurnReport, DriverError> {
    let per_round = settings.normal_listeners;
    let weak_cutoff = (per_round as f64 * settings.weak_fraction).round() as usize;
    info!(
        "🔁 Churn: {} rounds of {} listeners ({} weak per round)",
        settings.churn_rounds, per_round, weak_cutoff
    );

    let started = Instant::now();
    let dispatcher = Dispatcher::with_config(ProbeFamily::default(), registry);
    let mut registrations = 0;
    let mut removals = 0;
    let mut reclaimed_weak = 0;
    let mut alive_any = 0;
    let mut alive_by_channel: HashMap<u32, usize> = HashMap::new();

    for round in 0..settings.churn_rounds {
        let channel = (round % CHURN_CHANNELS) as u32;
        let batch: Vec<Arc<Probe>> = (0..per_round).map(|_| Probe::normal()).collect();

        for (i, probe) in batch.iter().enumerate() {
            let weak = i < weak_cutoff;
            if i % 2 == 0 {
                dispatcher.add(probe, weak);
            } else {
                dispatcher.add_for(probe, weak, channel);
            }
        }
        registrations += batch.len();

        for probe in batch.iter().step_by(3) {
            removals += dispatcher.remove(probe);
        }

        // Weak survivors lose their last strong reference here
        for (i, probe) in batch.into_iter().enumerate() {
            if i % 3 == 0 {
                continue;
            }
            if i < weak_cutoff {
                reclaimed_weak += 1;
                drop(probe);
            } else if i % 2 == 0 {
                alive_any += 1;
            } else {
                *alive_by_channel.entry(channel).or_default() += 1;
            }
        }

        dispatcher.family().reset();
        let fired = dispatcher.fire(&Pulse {
            channel: Some(channel),
        });
        let expected = alive_any + alive_by_channel.get(&channel).copied().unwrap_or(0);
        if fired.invoked() != expected {
            return Err(verification_failed(
                "churn",
                format!("round {round}: expected {expected} deliveries, got {}", fired.invoked()),
            ));
        }
        debug!("🔁 Round {} delivered {} on channel {}", round, expected, channel);
    }

    let expected_listeners = alive_any + alive_by_channel.values().sum::<usize>();
    let final_listeners = dispatcher.listener_count();
    if final_listeners != expected_listeners {
        return Err(verification_failed(
            "churn",
            format!("expected {expected_listeners} live listeners, registry reports {final_listeners}"),
        ));
    }

    let (table_peak_backing, table_bound_violations) =
        table_bound_check(per_round, settings.churn_rounds, registry.compaction_ratio);
    if table_bound_violations > 0 {
        return Err(verification_failed(
            "churn",
            format!("backing sequence exceeded the compaction bound {table_bound_violations} times"),
        ));
    }

    let report = ChurnReport {
        rounds: settings.churn_rounds,
        registrations,
        removals,
        reclaimed_weak,
        expected_listeners,
        final_listeners,
        table_peak_backing,
        table_bound_violations,
        elapsed_micros: started.elapsed().as_micros(),
        stats: dispatcher.stats(),
    };

    info!(
        "✅ Churn converged on {} listeners after {} registrations",
        final_listeners, registrations
    );
    Ok(report)
}

/// Adds `per_round` listeners then removes three quarters of all live ones,
/// every round, checking `backing <= ratio * live` after each operation.
fn table_bound_check(per_round: usize, rounds: usize, ratio: usize) -> (usize, usize) {
    let ratio = ratio.max(1);
    let mut table: SlotTable<Probe> = SlotTable::with_compaction_ratio(ratio);
    let mut live: Vec<Arc<Probe>> = Vec::new();
    let mut peak = 0;
    let mut violations = 0;

    let mut check = |table: &SlotTable<Probe>, live: usize| {
        peak = peak.max(table.backing_len());
        if table.backing_len() > ratio.saturating_mul(live) {
            violations += 1;
        }
    };

    for _ in 0..rounds {
        for _ in 0..per_round {
            let probe = Probe::normal();
            table.add(&probe, false);
            live.push(probe);
            check(&table, live.len());
        }

        let keep = live.len() / 4;
        while live.len() > keep {
            if let Some(probe) = live.pop() {
                table.remove(&probe);
                check(&table, live.len());
            }
        }
    }

    (peak, violations)
}

fn verification_failed(workload: &str, reason: String) -> DriverError {
    DriverError::Verification {
        workload: workload.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(normal: usize, deferred: usize, rounds: usize, weak_fraction: f64) -> WorkloadSettings {
        WorkloadSettings {
            normal_listeners: normal,
            deferred_listeners: deferred,
            churn_rounds: rounds,
            weak_fraction,
        }
    }

    #[test]
    fn test_fanout_orders_tiers() {
        let report = fanout(&small(300, 200, 0, 0.0), &RegistryConfig::default()).unwrap();
        assert_eq!(report.normal_delivered, 300);
        assert_eq!(report.deferred_delivered, 200);
        assert_eq!(report.order_violations, 0);
        assert_eq!(report.stats.events_fired, 1);
        assert_eq!(report.stats.total_listeners, 500);
    }

    #[test]
    fn test_fanout_with_no_listeners() {
        let report = fanout(&small(0, 0, 0, 0.0), &RegistryConfig::default()).unwrap();
        assert_eq!(report.normal_delivered, 0);
        assert_eq!(report.stats.deliveries, 0);
    }

    #[test]
    fn test_churn_converges() {
        let report = churn(&small(120, 0, 5, 0.5), &RegistryConfig::default()).unwrap();
        assert_eq!(report.registrations, 600);
        // Indices 0, 3, ..., 117 per round
        assert_eq!(report.removals, 5 * 40);
        // Weak cutoff 60; indices below it not divisible by 3
        assert_eq!(report.reclaimed_weak, 5 * 40);
        assert_eq!(report.final_listeners, 5 * 40);
        assert_eq!(report.final_listeners, report.expected_listeners);
        assert_eq!(report.table_bound_violations, 0);
    }

    #[test]
    fn test_churn_all_strong_and_all_weak() {
        let strong = churn(&small(30, 0, 3, 0.0), &RegistryConfig::default()).unwrap();
        assert_eq!(strong.reclaimed_weak, 0);
        assert_eq!(strong.final_listeners, 3 * 20);

        let weak = churn(&small(30, 0, 3, 1.0), &RegistryConfig::default()).unwrap();
        assert_eq!(weak.final_listeners, 0);
        assert_eq!(weak.stats.total_listeners, 0);
    }

    #[test]
    fn test_table_bound_holds_for_larger_ratio() {
        let (peak, violations) = table_bound_check(64, 4, 3);
        assert_eq!(violations, 0);
        assert!(peak >= 64);
    }

    #[test]
    fn test_table_bound_with_unbounded_ratio() {
        let (peak, violations) = table_bound_check(8, 2, usize::MAX);
        assert_eq!(violations, 0);
        assert!(peak >= 8);
    }

    #[test]
    fn test_workload_kind_selection() {
        assert!(WorkloadKind::All.includes_fanout());
        assert!(WorkloadKind::All.includes_churn());
        assert!(!WorkloadKind::Fanout.includes_churn());
        assert!(!WorkloadKind::Churn.includes_fanout());
    }
}
