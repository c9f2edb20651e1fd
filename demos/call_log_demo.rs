//! Demonstrates stale-while-revalidate contact resolution for a call log
//!
//! This example shows how to:
//! - Load a contact directory and build a resolver
//! - Bind rows before their contacts are known
//! - Redraw once the background worker has filled the cache
//! - Invalidate on resume and keep rendering old data meanwhile

use calllog_resolver::{
    BasicNumberFormatter, CallRow, CallType, ContactInfoResolver, InMemoryDirectory, ResolverConfig,
    RowDetails,
};
use std::sync::Arc;
use std::time::Duration;

const DIRECTORY: &str = r#"{
    "numbers": {
        "6505550100": {
            "person_id": 1,
            "name": "Alice Example",
            "number_type": 2,
            "number": "+16505550100",
            "normalized_number": "+16505550100",
            "lookup_key": "alice"
        },
        "4155550123": {
            "person_id": 2,
            "name": "Bob Example",
            "number_type": 1,
            "number": "(415) 555-0123"
        }
    },
    "addresses": {
        "carol@sip.example.com": {
            "person_id": 3,
            "name": "Carol Example",
            "number_type": 7,
            "label": "SIP"
        }
    }
}"#;

fn print_row(details: &RowDetails) {
    let name = details
        .contact
        .as_ref()
        .map(|c| c.name.as_str())
        .unwrap_or("(unknown)");
    println!(
        "   #{} {:<18} {:<22} {:?}",
        details.row_id, name, details.formatted_number, details.call_types
    );
}

fn render(resolver: &ContactInfoResolver, rows: &[CallRow]) {
    for row in rows {
        if let Some(details) = resolver.bind_row(row) {
            print_row(&details);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calllog_resolver=info".into()),
        )
        .init();

    let directory = InMemoryDirectory::from_json(DIRECTORY)?;
    println!("Loaded directory with {} entries\n", directory.len());

    let config = ResolverConfig::builder()
        .start_delay(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(100))
        .build();
    let (resolver, mut redraws) =
        ContactInfoResolver::new(config, Arc::new(directory), Arc::new(BasicNumberFormatter))?;

    let rows = vec![
        CallRow::new(1, "6505550100", CallType::Incoming).marked_new(),
        CallRow::new(2, "4155550123", CallType::Outgoing),
        CallRow::new(3, "carol@sip.example.com", CallType::Missed),
        CallRow::new(4, "2125550199", CallType::Voicemail).with_voicemail("voicemail/4"),
    ];

    // 1. First render: nothing is cached yet
    println!("1. First render");
    render(&resolver, &rows);
    resolver.set_loading(false);
    resolver.on_render_settled();

    // 2. The worker signals once for the whole burst
    println!("\n2. Waiting for redraw...");
    if redraws.changed_within(Duration::from_secs(2)).await {
        render(&resolver, &rows);
    } else {
        println!("   No redraw received");
    }

    // 3. Back from the background: everything is stale but still shown
    println!("\n3. Invalidated, rendering stale data");
    resolver.invalidate_all();
    render(&resolver, &rows);
    println!("   {} numbers queued for refresh", resolver.pending_requests());

    resolver.on_render_settled();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let redrawn = redraws.try_changed();
    println!("   Refreshed, redraw requested: {}", redrawn);

    println!("\n{}", resolver.cache_stats());

    resolver.shutdown().await;
    println!("\n✓ Worker {}", resolver.worker_state());

    Ok(())
}
