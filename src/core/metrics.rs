//! Pure funnel-metrics calculation. Every call recomputes the full metric
//! set from the given inputs; there is no incremental update path.

use crate::domain::model::{ChannelMetrics, FunnelInput};

/// Calibration constant applied to raw proposal revenue when forecasting
/// the realized share.
pub const DEFAULT_REVENUE_FACTOR: f64 = 0.171;

/// Ratio convention used across all funnel metrics: a zero denominator
/// yields 0, never a panic, infinity or NaN.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn calculate(channel: &str, input: &FunnelInput) -> ChannelMetrics {
    let sends = input.send_count as f64;
    let leads = input.lead_count as f64;
    let sales = input.sale_count as f64;

    let investment = sends * input.unit_cost;
    let forecast_revenue = input.total_revenue * input.revenue_factor;

    ChannelMetrics {
        channel: channel.to_string(),
        send_count: input.send_count,
        delivered_count: input.delivered_count,
        lead_count: input.lead_count,
        sale_count: input.sale_count,
        total_revenue: input.total_revenue,
        investment,
        forecast_revenue,
        avg_ticket: ratio(input.total_revenue, sales),
        cost_per_lead: ratio(investment, leads),
        cost_per_sale: ratio(investment, sales),
        sends_per_sale: ratio(sends, sales),
        sends_per_lead: ratio(sends, leads),
        leads_per_sale: ratio(leads, sales),
        conversion_rate: ratio(sales, sends) * 100.0,
        roi: forecast_revenue - investment,
    }
}
