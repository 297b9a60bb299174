use crate::app::AppContext;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Search MEMORY.md and HISTORY.md for a query.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Print entry counts, category breakdown, and size on disk.
    Stats,
    /// Drop near-duplicate MEMORY.md entries.
    Compact {
        #[arg(long, default_value_t = 0.7)]
        threshold: f64,
    },
}

pub async fn dispatch(ctx: &AppContext, action: MemoryAction) -> Result<(), String> {
    match action {
        MemoryAction::Search { query, limit } => {
            let facts = ctx.memory.search_memory(&query, limit, "");
            let history = ctx.memory.search_history(&query, limit, 0.0);
            if facts.is_empty() && history.is_empty() {
                println!("No matches.");
                return Ok(());
            }
            if !facts.is_empty() {
                println!("-- MEMORY.md --");
                for line in facts {
                    println!("{line}");
                }
            }
            if !history.is_empty() {
                println!("-- HISTORY.md --");
                for line in history {
                    println!("{line}");
                }
            }
            Ok(())
        }
        MemoryAction::Stats => {
            let stats = ctx.memory.get_memory_stats();
            println!("Total entries: {}", stats.total_entries);
            println!("Size: {} bytes", stats.size_bytes);
            for (category, count) in stats.category_counts {
                println!("  {category}: {count}");
            }
            Ok(())
        }
        MemoryAction::Compact { threshold } => {
            let removed = ctx.memory.compact_memory(threshold).map_err(|e| e.to_string())?;
            println!("Removed {removed} near-duplicate entries.");
            Ok(())
        }
    }
}
