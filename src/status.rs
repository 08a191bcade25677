//! `crew status` — knowledge base, index, and conversation health at a
//! glance.

use anyhow::Result;
use walkdir::WalkDir;

use crate::chat::ChatStore;
use crate::config::Config;
use crate::index;

pub async fn run_status(config: &Config, owner: &str) -> Result<()> {
    // Knowledge base
    let kb_root = &config.knowledge_base.root;
    if kb_root.exists() {
        let pdf_count = WalkDir::new(kb_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                        .unwrap_or(false)
            })
            .count();
        println!("knowledge base: {} ({} PDF files)", kb_root.display(), pdf_count);
    } else {
        println!("knowledge base: {} (missing)", kb_root.display());
    }

    // Index
    if index::index_exists(config) {
        let pool = index::open_index(config).await?;
        let meta = index::read_meta(&pool).await?;
        pool.close().await;
        let built = chrono::DateTime::from_timestamp(meta.built_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        println!(
            "index: {} chunks, model {} ({} dims), built {}",
            meta.chunk_count, meta.model, meta.dims, built
        );
    } else {
        println!("index: not built (run `crew process`)");
    }

    // Conversations
    let store = ChatStore::new(&config.conversations.root);
    let names = store.list(owner)?;
    if names.is_empty() {
        println!("conversations ({}): none saved", owner);
    } else {
        println!("conversations ({}): {}", owner, names.join(", "));
    }

    Ok(())
}
