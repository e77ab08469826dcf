//! Fetches every library of a Plex server once and prints a summary
//!
//! ```text
//! PLEX_URL=http://plex.lan:32400 ALLOWED_LIBRARIES="Movies,TV Shows" \
//!     cargo run -p pmoplex --example fetch_libraries
//! ```

use pmoplex::{AllowList, LibraryAggregator, PlexClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let url = std::env::var("PLEX_URL").unwrap_or_else(|_| "http://localhost:32400".to_string());
    let allow_list = AllowList::parse(&std::env::var("ALLOWED_LIBRARIES").unwrap_or_default());

    println!("=== PMOPlex - {} ===\n", url);

    let client = PlexClient::new(url)?;
    let sections = client.list_sections().await?;
    println!("{} library(ies) on the server:", sections.len());
    for section in &sections {
        let marker = if allow_list.allows(&section.title) { "✓" } else { " " };
        println!("  [{}] {} (key {})", marker, section.title, section.key);
    }

    let snapshot = LibraryAggregator::new(client, allow_list)
        .aggregate()
        .await?;

    for (title, items) in snapshot.iter() {
        println!("\n--- {} ({} items) ---", title, items.len());
        for item in items.iter().take(5) {
            println!("  {} ({})", item.title, item.year);
            if let Some(trailer) = &item.trailer_url {
                println!("     Trailer: {}", trailer);
            }
        }
    }

    Ok(())
}
