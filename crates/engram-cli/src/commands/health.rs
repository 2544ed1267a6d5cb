use clap::Parser;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use crate::client::ApiClient;
use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct HealthCommand;

impl HealthCommand {
    pub async fn execute(&self, client: &ApiClient, format: OutputFormat) -> CliResult<()> {
        let body = client.get("/admin/health").await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_header(["Component", "Status"]);
                table.add_row(["Overall", body["status"].as_str().unwrap_or("-")]);
                table.add_row([
                    "Embedding engine",
                    body["embedding_engine"].as_str().unwrap_or("-"),
                ]);
                table.add_row(["Vector store", body["vector_store"].as_str().unwrap_or("-")]);
                table.add_row(["Recent tier", body["recent_tier"].as_str().unwrap_or("-")]);
                println!("{table}");
            }
        }

        Ok(())
    }
}
