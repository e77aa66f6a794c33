//! CLI smoke entry point.
//!
//! # Responsibility
//! - Drive one scripted document session against `pagetree_core`.
//! - Keep output deterministic apart from generated ids.
//!
//! Usage: `pagetree_cli [database-file]`. Without an argument the session
//! runs against an in-memory store.

use pagetree_core::{
    core_version, ArchiveFilter, DocumentEngine, DocumentPatch, EngineConfig, EngineResult,
    Interest, OwnerId, Payload, TitleQuery,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pagetree error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> EngineResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::with_file(path),
        None => EngineConfig::in_memory(),
    };
    println!("pagetree_core version={}", core_version());

    let engine = DocumentEngine::open(config)?;
    let owner = OwnerId::from("cli-user");

    let subscriber = engine.connect(owner.clone())?;
    engine
        .watch(&subscriber, Interest::trash(owner.clone()))
        .await?;

    let parent = engine.create(&owner, None).await?;
    engine
        .update(parent.id, &owner, DocumentPatch::title("Project notes"))
        .await?;
    let child = engine.create(&owner, Some(parent.id)).await?;
    engine
        .update(child.id, &owner, DocumentPatch::title("Meeting log"))
        .await?;

    let roots = engine
        .list_children(&owner, None, ArchiveFilter::ActiveOnly)
        .await?;
    println!("root documents={}", roots.len());

    let hits = engine.search(&owner, TitleQuery::new("notes")).await?;
    for hit in &hits {
        println!("search hit id={} title={}", hit.id, hit.title);
    }

    let archived = engine.archive(parent.id, &owner).await?;
    println!("archived documents={}", archived.len());
    for document in engine.list_trash(&owner).await? {
        println!("trash id={} title={}", document.id, document.title);
    }

    let restored = engine.restore(child.id, &owner).await?;
    println!("restored id={} archived={}", restored.id, restored.is_archived);

    while let Some(notification) = subscriber.try_next() {
        if let Payload::Trash(documents) = &notification.payload {
            println!(
                "trash update seq={} size={}",
                notification.seq,
                documents.len()
            );
        }
    }

    let deleted = engine.permanently_delete(parent.id, &owner).await?;
    println!("deleted documents={}", deleted.len());
    Ok(())
}
