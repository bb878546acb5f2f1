use crate::domain::model::FunnelSnapshot;
use crate::domain::ports::Storage;
use crate::utils::error::{ReportError, Result};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// Writes one snapshot as a ZIP with a per-channel CSV plus the full JSON
/// snapshot, through the storage seam.
pub struct SnapshotExporter<S: Storage> {
    storage: S,
    output_path: String,
}

impl<S: Storage> SnapshotExporter<S> {
    pub fn new(storage: S, output_path: String) -> Self {
        Self {
            storage,
            output_path,
        }
    }

    pub async fn export(&self, snapshot: &FunnelSnapshot) -> Result<String> {
        let filename = format!(
            "funnel_{}.zip",
            snapshot.generated_at.format("%Y%m%d_%H%M%S")
        );

        tracing::debug!(
            "💾 Exporting snapshot with {} channels to {}",
            snapshot.channels.len(),
            filename
        );

        let csv_data = metrics_csv(snapshot)?;
        let json_data = serde_json::to_string_pretty(snapshot)?;

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("metrics.csv", FileOptions::default())?;
            zip.write_all(&csv_data)?;

            zip.start_file::<_, ()>("snapshot.json", FileOptions::default())?;
            zip.write_all(json_data.as_bytes())?;

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        self.storage.write_file(&filename, &zip_data).await?;

        let output_path = format!("{}/{}", self.output_path, filename);
        tracing::info!("💾 Snapshot saved to {}", output_path);
        Ok(output_path)
    }
}

fn metrics_csv(snapshot: &FunnelSnapshot) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "channel",
        "send_count",
        "delivered_count",
        "lead_count",
        "sale_count",
        "total_revenue",
        "investment",
        "forecast_revenue",
        "avg_ticket",
        "cost_per_lead",
        "cost_per_sale",
        "sends_per_sale",
        "sends_per_lead",
        "leads_per_sale",
        "conversion_rate",
        "roi",
    ])?;

    for channel in &snapshot.channels {
        writer.write_record([
            channel.channel.clone(),
            channel.send_count.to_string(),
            channel.delivered_count.to_string(),
            channel.lead_count.to_string(),
            channel.sale_count.to_string(),
            format!("{:.2}", channel.total_revenue),
            format!("{:.2}", channel.investment),
            format!("{:.2}", channel.forecast_revenue),
            format!("{:.2}", channel.avg_ticket),
            format!("{:.2}", channel.cost_per_lead),
            format!("{:.2}", channel.cost_per_sale),
            format!("{:.2}", channel.sends_per_sale),
            format!("{:.2}", channel.sends_per_lead),
            format!("{:.2}", channel.leads_per_sale),
            format!("{:.2}", channel.conversion_rate),
            format!("{:.2}", channel.roi),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| ReportError::ProcessingError {
            message: format!("CSV buffer error: {}", e),
        })
}
