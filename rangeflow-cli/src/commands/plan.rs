//! Plan command - show the chunk layout of a transfer without running it.

use clap::Args;
use rangeflow::config::{format_size, parse_size};
use rangeflow::transfer::{plan, plan_range, ByteRange, ChunkDescriptor, DEFAULT_CHUNK_SIZE};

use crate::error::CliError;

/// Arguments for the plan command.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Object size, e.g. 23MB or 24117248
    #[arg(long, value_name = "SIZE")]
    pub size: String,

    /// Chunk size (default: 5MB)
    #[arg(long, value_name = "SIZE")]
    pub chunk_size: Option<String>,

    /// HTTP Range header value, e.g. "bytes=1000-1999"
    #[arg(long, value_name = "HEADER")]
    pub range: Option<String>,
}

/// Run the plan command.
pub fn run(args: PlanArgs) -> Result<(), CliError> {
    let total = parse_size(&args.size)
        .map_err(|e| CliError::Config(format!("invalid --size '{}': {}", args.size, e)))?;
    let chunk_size = match &args.chunk_size {
        Some(s) => parse_size(s)
            .map_err(|e| CliError::Config(format!("invalid --chunk-size '{}': {}", s, e)))?,
        None => DEFAULT_CHUNK_SIZE,
    };

    let chunks = build_plan(total, chunk_size, args.range.as_deref())?;

    println!(
        "Object: {} ({} bytes), chunk size {}",
        format_size(total),
        total,
        format_size(chunk_size)
    );
    if let (Some(first), Some(last)) = (chunks.first(), chunks.last()) {
        println!("Range:  bytes {}-{}", first.start, last.end);
    }
    println!("Chunks: {}", chunks.len());
    println!();

    for chunk in &chunks {
        println!(
            "  #{:<5} {:>12} - {:<12} {}",
            chunk.index,
            chunk.start,
            chunk.end,
            format_size(chunk.size())
        );
    }

    Ok(())
}

fn build_plan(
    total: u64,
    chunk_size: u64,
    range_header: Option<&str>,
) -> Result<Vec<ChunkDescriptor>, CliError> {
    let chunks = match range_header {
        Some(header) => plan_range(ByteRange::parse_header(header, total)?, chunk_size)?,
        None => plan(total, chunk_size)?,
    };
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_plan_whole_object() {
        let chunks = build_plan(23 * 1024 * 1024, DEFAULT_CHUNK_SIZE, None).unwrap();
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[4].size(), 3 * 1024 * 1024);
    }

    #[test]
    fn test_build_plan_range() {
        let chunks = build_plan(10_000, 300, Some("bytes=1000-1999")).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start, 1000);
        assert_eq!(chunks[3].end, 1999);
    }

    #[test]
    fn test_build_plan_rejects_bad_range() {
        assert!(build_plan(100, 10, Some("bytes=200-300")).is_err());
    }

    #[test]
    fn test_build_plan_rejects_huge_chunk_count() {
        // 1 TiB in 1-byte chunks
        assert!(build_plan(1 << 40, 1, None).is_err());
    }
}
