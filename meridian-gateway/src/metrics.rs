//! Prometheus text rendering for the `/metrics` operator route.
//!
//! There is no client-facing request surface left to instrument, so this
//! keeps no history of its own: every render is a snapshot pulled live from
//! the subsystems that already track it — the Health Monitor's circuit
//! state and error counts, the Weight Manager's EMA gauges, the connection
//! pool's occupancy. `total_errors` and `consecutive_failures` approximate
//! request/failure counts; they only advance for outcomes the Dispatcher
//! reports to the Health Monitor, so a request that never reaches a
//! provider (rejected before dispatch) isn't reflected here.

use meridian_router::circuit_breaker::CircuitState;
use meridian_router::gateway::Gateway;
use meridian_router::health::Status;
use std::fmt::Write as _;

pub async fn render(gateway: &Gateway) -> String {
    let mut out = String::new();

    write_help(&mut out, "gateway_provider_up", "gauge", "1 if the provider's circuit is not open");
    write_help(&mut out, "gateway_provider_total_errors", "counter", "cumulative dispatch errors observed for the provider");
    write_help(&mut out, "gateway_provider_consecutive_failures", "gauge", "current consecutive health-check/dispatch failure streak");
    write_help(&mut out, "gateway_provider_response_time_seconds", "gauge", "most recently observed response time");
    write_help(&mut out, "gateway_provider_circuit_state", "gauge", "0=closed 1=half_open 2=open");
    write_help(&mut out, "gateway_provider_weight", "gauge", "current adaptive routing weight");
    write_help(&mut out, "gateway_provider_ema_success_rate", "gauge", "EMA-smoothed success rate");
    write_help(&mut out, "gateway_provider_ema_cost_usd", "gauge", "EMA-smoothed cost per request");
    write_help(&mut out, "gateway_provider_active_connections", "gauge", "in-flight requests held against the provider's pool slot");

    for provider in gateway.registered_providers().await {
        let label = format!("provider=\"{provider}\"");

        if let Some(health) = gateway.provider_health(&provider).await {
            let up = if matches!(health.circuit, CircuitState::Open) { 0 } else { 1 };
            writeln!(out, "gateway_provider_up{{{label}}} {up}").ok();
            writeln!(out, "gateway_provider_total_errors{{{label}}} {}", health.total_errors).ok();
            writeln!(out, "gateway_provider_consecutive_failures{{{label}}} {}", health.consecutive_failures).ok();
            writeln!(out, "gateway_provider_response_time_seconds{{{label}}} {}", health.response_time).ok();
            writeln!(out, "gateway_provider_circuit_state{{{label}}} {}", circuit_state_code(&health.circuit)).ok();
            writeln!(out, "gateway_provider_status{{{label},status=\"{}\"}} 1", status_label(&health.status)).ok();
        }

        if let Some(weight) = gateway.provider_weight(&provider).await {
            writeln!(out, "gateway_provider_weight{{{label}}} {weight}").ok();
        }

        if let Some(metrics) = gateway.provider_metrics(&provider).await {
            if let Some(rate) = metrics.ema_success_rate {
                writeln!(out, "gateway_provider_ema_success_rate{{{label}}} {rate}").ok();
            }
            if let Some(cost) = metrics.ema_cost {
                writeln!(out, "gateway_provider_ema_cost_usd{{{label}}} {cost}").ok();
            }
        }

        let active = gateway.provider_active_connections(&provider).await;
        writeln!(out, "gateway_provider_active_connections{{{label}}} {active}").ok();
    }

    out
}

fn write_help(out: &mut String, name: &str, kind: &str, help: &str) {
    writeln!(out, "# HELP {name} {help}").ok();
    writeln!(out, "# TYPE {name} {kind}").ok();
}

fn circuit_state_code(state: &CircuitState) -> u8 {
    match state {
        CircuitState::Closed => 0,
        CircuitState::HalfOpen => 1,
        CircuitState::Open => 2,
    }
}

fn status_label(status: &Status) -> &'static str {
    match status {
        Status::Healthy => "healthy",
        Status::Degraded => "degraded",
        Status::Unhealthy => "unhealthy",
        Status::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_router::gateway::GatewayConfig;

    #[tokio::test]
    async fn empty_gateway_renders_only_help_headers() {
        let gateway = Gateway::new(GatewayConfig::default()).await;
        let rendered = render(&gateway).await;
        assert!(rendered.contains("# HELP gateway_provider_up"));
        assert!(!rendered.contains("gateway_provider_up{"));
    }
}
