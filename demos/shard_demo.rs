//! Example writing one shard from several threads
//!
//! This example shows:
//! - Concurrent writes into one shard writer
//! - Automatic flushes when the write buffer fills
//! - A manual flush from the controlling thread
//! - The final merge on close and reading the shard back
//!
//! Run with: RUST_LOG=info cargo run --example shard_demo

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sstshard::{DiskShardReader, DiskShardWriter, Options, ShardReader, ShardWriter};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Serialize, Deserialize)]
struct Visit {
    page: String,
    millis: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let dir = tempfile::TempDir::new()?;
    let options = Options::new().max_buffer_size(500).batch_size(128);
    let writer = Arc::new(DiskShardWriter::create(dir.path(), "visits", options)?);

    println!("=== Shard Writer Demo ===\n");

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || -> sstshard::Result<()> {
                for i in 0..1000u32 {
                    let user = format!("user:{:03}", (i * 31 + worker * 7) % 200);
                    let visit = Visit { page: format!("/page/{}", i % 17), millis: i * 3 };
                    writer.write_serialized(user.as_bytes(), &visit)?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
    }

    writer.flush()?;
    println!("1. Wrote 4000 visits into {} chunks", writer.chunk_files().len());

    writer.close().context("closing shard")?;
    println!("2. Merged into {:?}", writer.output_path());

    let reader = DiskShardReader::open(writer.output_path(), 128)?;
    println!("3. Shard holds {} sorted entries", reader.verify()?);

    println!("\n   First five entries:");
    for entry in reader.iter()?.take(5) {
        let entry = entry?;
        let visit: Visit = entry.decode_value()?;
        println!("   {} => {:?}", String::from_utf8_lossy(entry.key()), visit);
    }

    Ok(())
}
