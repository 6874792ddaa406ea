// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline walkthrough.
//!
//! Demonstrates:
//! 1. Opening the SQLite-backed local store in a temp directory
//! 2. Saving a request, a pledge and a message while offline
//! 3. Reconnecting and watching the queue drain
//! 4. A record that keeps failing until it is quarantined
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! The hosted backend is simulated in-process, so nothing external is needed.
//!
//! # Run
//!
//! ```bash
//! cargo run --example offline_walkthrough
//! ```

use std::sync::Arc;
use std::time::Duration;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use opendoor_sync::{
    pending_label, ConnectivityMonitor, InMemoryRemote, OfflineSyncConfig, OperationKind, Record,
    RecordKind, StaticAuth, SyncContext, SyncStatus, TracingNotifier,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           opendoor-sync: Offline Walkthrough                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open the local store and start the context (offline)
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = OfflineSyncConfig {
        db_path: dir.path().join("OpenDoorReliefDB.sqlite").to_string_lossy().to_string(),
        ..Default::default()
    };
    println!("📦 Local store: {}", config.db_path);

    let remote = Arc::new(InMemoryRemote::new());
    remote.insert("conversations", "conv-1", serde_json::Map::new());
    remote.set_latency(Duration::from_millis(30));
    let monitor = Arc::new(ConnectivityMonitor::new(false));

    let ctx = SyncContext::open(
        config,
        remote.clone(),
        Arc::new(StaticAuth::signed_in("volunteer-42")),
        monitor.clone(),
        Arc::new(TracingNotifier),
    )
    .await;
    print_status("Started", ctx.status());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Offline writes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Saving while offline...");
    let writes = vec![
        (OperationKind::Request, json!({"location": "Pasadena", "needs": ["water", "blankets"]})),
        (OperationKind::Pledge, json!({"beds": 2, "city": "Altadena"})),
        (OperationKind::Message, json!({"conversationId": "conv-1", "text": "Heading over now"})),
        // No conversationId: the message strategy will reject this one
        (OperationKind::Message, json!({"text": "lost message"})),
    ];
    for (kind, data) in writes {
        let outcome = ctx.save_for_offline(kind, Record::from_json(data)?).await?;
        println!("   └─ {} → {:?}", kind, outcome);
    }
    print_status("Queued", ctx.status());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reconnect
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📶 Back online...");
    monitor.set_online(true);
    wait_until_idle(&ctx).await;
    print_status("After reconnect", ctx.status());

    println!("\n📖 Remote documents:");
    for collection in ["requests", "pledges", "conversations/conv-1/messages"] {
        for (id, doc) in remote.documents(collection) {
            println!("   └─ {}/{} → {}", collection, id, serde_json::Value::Object(doc));
        }
    }
    println!("\n📖 Local requests (ids rewritten to remote ids):");
    for record in ctx.records(RecordKind::Request).await? {
        println!("   └─ {}", record.to_json());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Drive the bad message into quarantine
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔁 Forcing sync until the bad message is quarantined...");
    for _ in 0..5 {
        let outcome = ctx.force_sync().await;
        if let Some(report) = outcome.report() {
            println!("   └─ {}", report);
        }
    }
    for op in ctx.failed_operations().await? {
        println!(
            "   └─ quarantined #{} ({}) after {} attempts: {}",
            op.id,
            op.kind,
            op.attempts,
            op.last_error.as_deref().unwrap_or("-")
        );
    }
    print_status("Final", ctx.status());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    ctx.clear_offline_data().await?;
    ctx.shutdown();
    println!("   ✅ Done! Stats: {:?}", ctx.stats());

    Ok(())
}

fn print_status(label: &str, status: SyncStatus) {
    println!(
        "   {} → online={} syncing={} ({})",
        label,
        status.is_online,
        status.is_syncing,
        pending_label(status.pending_count)
    );
}

/// Wait for the reconnect pass to start and finish.
async fn wait_until_idle(ctx: &SyncContext) {
    for _ in 0..500 {
        if ctx.stats().passes_started > 0 && !ctx.status().is_syncing {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
