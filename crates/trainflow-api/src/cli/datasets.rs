//! Dataset subcommands: list, show versions, tag a version.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use trainflow_core::artifact::ArtifactStore;
use trainflow_types::artifact::DatasetVersion;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum DatasetsCommand {
    /// List datasets with their latest version.
    #[command(alias = "ls")]
    List,

    /// Show every version of a dataset.
    Show {
        /// Dataset name (e.g. gradient-lsun-cat-extracted).
        name: String,
    },

    /// Attach a tag to a dataset version, moving it if already used.
    Tag {
        /// Dataset name.
        name: String,

        /// Version number (`3` or `v3`).
        #[arg(id = "dataset_version", value_name = "VERSION")]
        version: String,

        /// Tag name (e.g. `baseline`).
        tag: String,
    },
}

pub async fn handle_datasets_command(
    cmd: DatasetsCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        DatasetsCommand::List => list(state, json).await,
        DatasetsCommand::Show { name } => show(state, &name, json).await,
        DatasetsCommand::Tag { name, version, tag } => {
            let version = parse_version(&version)?;
            tag_version(state, &name, version, &tag, json).await
        }
    }
}

async fn list(state: &AppState, json: bool) -> Result<()> {
    let datasets = state.store.list_datasets().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&datasets)?);
        return Ok(());
    }
    if datasets.is_empty() {
        println!("  No datasets yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Dataset").fg(Color::Cyan),
            Cell::new("Latest"),
            Cell::new("Versions"),
            Cell::new("Updated"),
        ]);
    for d in &datasets {
        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(format!("v{}", d.latest_version)),
            Cell::new(d.version_count),
            Cell::new(d.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn show(state: &AppState, name: &str, json: bool) -> Result<()> {
    let versions = state.store.list_versions(name).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    println!();
    println!("  {} ({} versions)", style(name).cyan().bold(), versions.len());
    println!("{}", version_table(&versions));
    Ok(())
}

async fn tag_version(state: &AppState, name: &str, version: u32, tag: &str, json: bool) -> Result<()> {
    let tagged = state
        .store
        .tag_version(name, version, tag)
        .await
        .with_context(|| format!("failed to tag {name}:v{version}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tagged)?);
    } else {
        println!(
            "  {} {}:v{} tagged '{}'",
            style("*").green().bold(),
            style(name).cyan(),
            tagged.version,
            tag
        );
    }
    Ok(())
}

fn parse_version(s: &str) -> Result<u32> {
    let digits = s.strip_prefix('v').unwrap_or(s);
    match digits.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => anyhow::bail!("'{s}' is not a version (expected e.g. 3 or v3)"),
    }
}

fn version_table(versions: &[DatasetVersion]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Digest"),
            Cell::new("Files"),
            Cell::new("Size"),
            Cell::new("Tags"),
            Cell::new("Created"),
        ]);
    for v in versions {
        table.add_row(vec![
            Cell::new(format!("v{}", v.version)),
            Cell::new(v.digest.chars().take(12).collect::<String>()),
            Cell::new(v.file_count),
            Cell::new(format_size(v.size_bytes)),
            Cell::new(v.tags.join(", ")),
            Cell::new(v.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    table
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_accept_optional_prefix() {
        assert_eq!(parse_version("3").unwrap(), 3);
        assert_eq!(parse_version("v12").unwrap(), 12);
        assert!(parse_version("v0").is_err());
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[tokio::test]
    async fn tag_and_show_committed_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::state::tests::test_state(dir.path()).await;
        let run_id = uuid::Uuid::now_v7();
        let staging = state
            .store
            .stage_dataset_output(run_id, "extractImages", "extracted-images")
            .await
            .unwrap();
        std::fs::write(staging.join("cat.tfrecords"), b"records").unwrap();
        state
            .store
            .commit_dataset("gradient-lsun-cat-extracted", &staging)
            .await
            .unwrap();

        tag_version(&state, "gradient-lsun-cat-extracted", 1, "baseline", true)
            .await
            .unwrap();
        let versions = state.store.list_versions("gradient-lsun-cat-extracted").await.unwrap();
        assert_eq!(versions[0].tags, vec!["baseline".to_string()]);
        assert!(version_table(&versions).to_string().contains("baseline"));

        assert!(
            tag_version(&state, "gradient-lsun-cat-extracted", 2, "next", false)
                .await
                .is_err()
        );
    }
}
