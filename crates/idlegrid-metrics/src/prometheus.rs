//! Prometheus text exposition format.

use crate::collector::ProviderCounts;

/// Render instance counters into Prometheus text format.
///
/// Produces two COUNTER families labelled by `provider`.
pub fn render_prometheus(counts: &[ProviderCounts]) -> String {
    let mut out = String::new();

    out.push_str("# HELP idlegrid_instance_starts_total Workload scale-ups that started instances.\n");
    out.push_str("# TYPE idlegrid_instance_starts_total counter\n");
    for c in counts {
        out.push_str(&format!(
            "idlegrid_instance_starts_total{{provider=\"{}\"}} {}\n",
            c.provider, c.started
        ));
    }

    out.push_str("# HELP idlegrid_instance_stops_total Workload scale-downs that stopped instances.\n");
    out.push_str("# TYPE idlegrid_instance_stops_total counter\n");
    for c in counts {
        out.push_str(&format!(
            "idlegrid_instance_stops_total{{provider=\"{}\"}} {}\n",
            c.provider, c.stopped
        ));
    }

    out
}
