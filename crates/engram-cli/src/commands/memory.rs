use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

use crate::client::ApiClient;
use crate::error::CliResult;
use crate::output::{format_timestamp, truncate_string, OutputFormat};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List a character's memories across all tiers")]
    List(ListArgs),

    #[clap(about = "Add a memory for a character")]
    Add(AddArgs),

    #[clap(about = "Search a character's long-term memories")]
    Search(SearchArgs),

    #[clap(about = "Update a memory's content wherever it lives")]
    Update(UpdateArgs),

    #[clap(about = "Delete a memory wherever it lives")]
    Delete(DeleteArgs),

    #[clap(about = "Force immediate embedding of a character's buffer")]
    EmbedNow(EmbedNowArgs),

    #[clap(about = "Clear every memory a character has")]
    Clear(ClearArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(long, short, default_value = "1", help = "Page number (1-indexed)")]
    pub page: usize,

    #[clap(long, short, default_value = "20", help = "Memories per page (max 100)")]
    pub limit: usize,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(help = "Memory content text")]
    pub content: String,

    #[clap(long, help = "Metadata as a JSON object")]
    pub metadata: Option<String>,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(help = "Search query text")]
    pub query: String,

    #[clap(long, short, help = "Number of results")]
    pub k: Option<usize>,
}

#[derive(Parser)]
pub struct UpdateArgs {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(help = "Memory id")]
    pub id: String,

    #[clap(help = "New content")]
    pub content: String,

    #[clap(long, help = "Replacement metadata as a JSON object")]
    pub metadata: Option<String>,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(help = "Memory id")]
    pub id: String,
}

#[derive(Parser)]
pub struct EmbedNowArgs {
    #[clap(help = "Character identifier")]
    pub character: String,
}

#[derive(Parser)]
pub struct ClearArgs {
    #[clap(help = "Character identifier")]
    pub character: String,

    #[clap(long, short = 'y', help = "Skip confirmation prompt")]
    pub yes: bool,
}

impl MemoryCommand {
    pub async fn execute(&self, client: &ApiClient, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(client, args, format).await,
            MemorySubcommand::Add(args) => Self::add(client, args, format).await,
            MemorySubcommand::Search(args) => Self::search(client, args, format).await,
            MemorySubcommand::Update(args) => Self::update(client, args, format).await,
            MemorySubcommand::Delete(args) => Self::delete(client, args, format).await,
            MemorySubcommand::EmbedNow(args) => Self::embed_now(client, args, format).await,
            MemorySubcommand::Clear(args) => Self::clear(client, args, format).await,
        }
    }

    async fn list(client: &ApiClient, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let body = client
            .get(&format!(
                "/admin/char/{}/memories?page={}&limit={}",
                args.character, args.page, args.limit
            ))
            .await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            OutputFormat::Table => {
                let memories = body["memories"].as_array().cloned().unwrap_or_default();
                if memories.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Content", "Location", "Created"]);

                for memory in &memories {
                    table.add_row([
                        memory["id"].as_str().unwrap_or("-").to_string(),
                        truncate_string(memory["content"].as_str().unwrap_or(""), 50),
                        memory["location"].as_str().unwrap_or("-").to_string(),
                        memory["timestamp"]
                            .as_str()
                            .map(format_timestamp)
                            .unwrap_or_else(|| "-".to_string()),
                    ]);
                }

                println!("{table}");
                println!(
                    "\nPage {}/{} ({} memories total)",
                    body["page"], body["total_pages"], body["total_memories"]
                );
            }
        }

        Ok(())
    }

    async fn add(client: &ApiClient, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        let mut payload = serde_json::json!({"content": args.content});
        if let Some(raw) = &args.metadata {
            let metadata: serde_json::Value = serde_json::from_str(raw)?;
            payload["metadata"] = metadata;
        }

        let body = client
            .post(&format!("/memory/{}", args.character), Some(payload))
            .await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
            OutputFormat::Table => {
                println!("Memory created: {}", body["id"].as_str().unwrap_or("-"));
                if body["evicted_to_buffer"].as_bool() == Some(true) {
                    println!("Oldest recent memory moved to the buffer.");
                }
                if body["buffer_auto_embedded"].as_bool() == Some(true) {
                    println!("Buffer reached its threshold and was embedded.");
                }
            }
        }

        Ok(())
    }

    async fn search(client: &ApiClient, args: &SearchArgs, format: OutputFormat) -> CliResult<()> {
        let mut path = format!(
            "/memory/{}/search?query={}",
            args.character,
            urlencode(&args.query)
        );
        if let Some(k) = args.k {
            path.push_str(&format!("&k={k}"));
        }

        let body = client.get(&path).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
            OutputFormat::Table => {
                let results = body["results"].as_array().cloned().unwrap_or_default();
                if results.is_empty() {
                    println!("No similar memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Score", "ID", "Content", "Created"]);

                for result in &results {
                    table.add_row([
                        format!("{:.3}", result["similarity_score"].as_f64().unwrap_or(0.0)),
                        result["memory"]["id"].as_str().unwrap_or("-").to_string(),
                        truncate_string(result["memory"]["content"].as_str().unwrap_or(""), 50),
                        result["memory"]["timestamp"]
                            .as_str()
                            .map(format_timestamp)
                            .unwrap_or_else(|| "-".to_string()),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn update(client: &ApiClient, args: &UpdateArgs, format: OutputFormat) -> CliResult<()> {
        let mut payload = serde_json::json!({"content": args.content});
        if let Some(raw) = &args.metadata {
            let metadata: serde_json::Value = serde_json::from_str(raw)?;
            payload["metadata"] = metadata;
        }

        let body = client
            .put(&format!("/admin/memory/{}/{}", args.character, args.id), payload)
            .await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
            OutputFormat::Table => println!(
                "Memory {} updated in {} storage.",
                args.id,
                body["updated_in"].as_str().unwrap_or("-")
            ),
        }

        Ok(())
    }

    async fn delete(client: &ApiClient, args: &DeleteArgs, format: OutputFormat) -> CliResult<()> {
        let body = client
            .delete(&format!("/admin/memory/{}/{}", args.character, args.id))
            .await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
            OutputFormat::Table => println!(
                "Memory {} deleted from {} storage.",
                args.id,
                body["deleted_from"].as_str().unwrap_or("-")
            ),
        }

        Ok(())
    }

    async fn embed_now(
        client: &ApiClient,
        args: &EmbedNowArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let body = client
            .post(&format!("/admin/char/{}/embed-now", args.character), None)
            .await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
            OutputFormat::Table => println!(
                "Embedded {} buffered memories for {}.",
                body["embedded_count"], args.character
            ),
        }

        Ok(())
    }

    async fn clear(client: &ApiClient, args: &ClearArgs, format: OutputFormat) -> CliResult<()> {
        if !args.yes {
            return Err(format!(
                "This deletes ALL memories for {}. Re-run with --yes to confirm.",
                args.character
            )
            .into());
        }

        let body = client.delete(&format!("/memory/{}", args.character)).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&body)?),
            OutputFormat::Table => println!(
                "Cleared {}: {} recent, {} buffered, {} long-term.",
                args.character,
                body["recent_deleted"],
                body["buffer_deleted"],
                body["longterm_deleted"]
            ),
        }

        Ok(())
    }
}

/// Percent-encode a query string value
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
