use std::path::PathBuf;

use clap::Parser;

use crate::client::ApiClient;
use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ExportCommand {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(long, short, help = "Write the bundle to a file instead of stdout")]
    pub out: Option<PathBuf>,
}

impl ExportCommand {
    pub async fn execute(&self, client: &ApiClient, format: OutputFormat) -> CliResult<()> {
        let bundle = client
            .get(&format!("/admin/export/{}", self.character))
            .await?;
        let json = serde_json::to_string_pretty(&bundle)?;

        match &self.out {
            Some(path) => {
                std::fs::write(path, &json)?;
                match format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({
                            "character_id": self.character,
                            "total_memories": bundle["total_memories"],
                            "written_to": path.display().to_string(),
                        })
                    ),
                    OutputFormat::Table => println!(
                        "Exported {} memories for {} to {}.",
                        bundle["total_memories"],
                        self.character,
                        path.display()
                    ),
                }
            }
            None => println!("{json}"),
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct ImportCommand {
    #[clap(help = "Path to a JSON file with a {\"memories\": [...]} payload")]
    pub file: PathBuf,
}

impl ImportCommand {
    pub async fn execute(&self, client: &ApiClient, format: OutputFormat) -> CliResult<()> {
        let raw = std::fs::read_to_string(&self.file)?;
        let payload: serde_json::Value = serde_json::from_str(&raw)?;

        if payload.get("memories").and_then(|m| m.as_array()).is_none() {
            return Err("Import file must contain a top-level \"memories\" array".into());
        }

        let report = client.post("/admin/import", Some(payload)).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Table => {
                println!("Imported {} memories.", report["imported"]);
                let failed = report["failed"].as_array().cloned().unwrap_or_default();
                if !failed.is_empty() {
                    println!("{} items failed:", failed.len());
                    for failure in &failed {
                        println!("  item {}: {}", failure["index"], failure["error"]);
                    }
                }
            }
        }

        Ok(())
    }
}
