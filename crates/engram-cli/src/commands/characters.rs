use clap::Parser;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

use crate::client::ApiClient;
use crate::error::CliResult;
use crate::output::{format_timestamp, OutputFormat};

#[derive(Parser)]
pub struct CharactersCommand;

impl CharactersCommand {
    pub async fn execute(&self, client: &ApiClient, format: OutputFormat) -> CliResult<()> {
        let body = client.get("/admin/characters").await?;
        let characters = body["characters"].as_array().cloned().unwrap_or_default();

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&characters)?);
            }
            OutputFormat::Table => {
                if characters.is_empty() {
                    println!("No characters found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Character", "Recent", "Buffer", "Long-term", "Total", "Last Memory"]);

                for character in &characters {
                    table.add_row([
                        character["character_id"].as_str().unwrap_or("-").to_string(),
                        character["recent_count"].to_string(),
                        character["buffer_count"].to_string(),
                        character["longterm_count"].to_string(),
                        character["total_count"].to_string(),
                        character["last_memory_at"]
                            .as_str()
                            .map(format_timestamp)
                            .unwrap_or_else(|| "-".to_string()),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} characters", characters.len());
            }
        }

        Ok(())
    }
}
