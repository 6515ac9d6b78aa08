#![allow(clippy::uninlined_format_args)]

use signature_guard::extractor::{SignatureExtractor, Variant};
use signature_guard::normalization::Normalizer;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <body.html> [owner-email]", args[0]);
        std::process::exit(2);
    }

    let body = std::fs::read_to_string(&args[1])?;
    let owner = args.get(2).cloned();
    let extractor = SignatureExtractor::new("signature", owner)?;
    let normalizer = Normalizer::new();

    println!("Testing signature extraction for {}", args[1]);
    println!("Body length: {} bytes", body.len());

    for variant in [Variant::Classic, Variant::Modern] {
        println!("\n=== {} layout ===", variant);
        match extractor.locate(&body, variant) {
            Some(span) => {
                println!("✅ Found signature at bytes {}..{}", span.start, span.end);
                println!("  HTML: {}", span.html);
                println!("  Normalized: {}", normalizer.normalize_html(&span.html));
            }
            None => println!("❌ No signature found"),
        }
    }

    Ok(())
}
