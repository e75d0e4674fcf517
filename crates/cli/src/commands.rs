//! CLI commands

use chrono::Utc;
use std::io::BufRead;
use std::path::Path;

use riskwatch_audit::AuditLedger;
use riskwatch_core::{AuditRecord, IngressEvent};
use riskwatch_pipeline::EngineError;
use riskwatch_risk::RiskLevel;

use crate::context::AppContext;

/// A replay file line that could not be parsed
#[derive(Debug)]
pub struct BadLine {
    pub line: usize,
    pub error: String,
}

/// Parse one tagged event per line; blank lines and `#` comments are skipped
pub fn parse_events(reader: impl BufRead) -> anyhow::Result<(Vec<IngressEvent>, Vec<BadLine>)> {
    let mut events = Vec::new();
    let mut bad = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<IngressEvent>(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => bad.push(BadLine {
                line: index + 1,
                error: e.to_string(),
            }),
        }
    }
    Ok((events, bad))
}

/// Totals of a replay run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub processed: usize,
    pub rejected: usize,
    pub failed: usize,
    pub unparsable: usize,
    pub blocked_ips: usize,
    pub security_events: usize,
}

/// Feed a JSONL file through the engine
pub async fn replay(ctx: &AppContext, path: &Path) -> anyhow::Result<ReplaySummary> {
    let file = std::fs::File::open(path)?;
    let (events, bad) = parse_events(std::io::BufReader::new(file))?;

    let mut summary = ReplaySummary {
        unparsable: bad.len(),
        ..ReplaySummary::default()
    };
    for line in &bad {
        println!("⚠️  Line {}: {}", line.line, line.error);
    }

    // queue everything first so partitions run in parallel, then collect
    let mut pending = Vec::with_capacity(events.len());
    for event in events {
        pending.push(ctx.engine.enqueue(event).await?);
    }

    for rx in pending {
        match rx.await {
            Ok(Ok(outcome)) => {
                summary.processed += 1;
                if outcome.blocked_ip.is_some() {
                    summary.blocked_ips += 1;
                }
                summary.security_events += outcome.events.len();
            }
            Ok(Err(EngineError::Validation(e))) => {
                summary.rejected += 1;
                println!("⚠️  Rejected: {}", e);
            }
            Ok(Err(e)) => {
                summary.failed += 1;
                println!("❌ Failed: {}", e);
            }
            Err(_) => summary.failed += 1,
        }
    }

    println!(
        "✅ Replayed {} events ({} rejected, {} failed, {} unparsable)",
        summary.processed, summary.rejected, summary.failed, summary.unparsable
    );
    println!(
        "   {} IPs blocked, {} security events raised",
        summary.blocked_ips, summary.security_events
    );
    Ok(summary)
}

pub async fn score(ctx: &AppContext, user_id: &str) -> anyhow::Result<()> {
    match ctx.engine.risk_score(user_id).await? {
        Some(score) => {
            println!(
                "📊 {}: {} ({})",
                user_id,
                score.current_score,
                RiskLevel::from_score(score.current_score)
            );
            println!("   location:    {}", score.location_risk);
            println!("   device:      {}", score.device_risk);
            println!("   behavior:    {}", score.behavior_risk);
            println!("   transaction: {}", score.transaction_risk);
            println!("   velocity:    {}", score.velocity_risk);
            println!("   calculated:  {}", score.last_calculated);
        }
        None => println!("No risk score for {}", user_id),
    }
    Ok(())
}

pub async fn ip(ctx: &AppContext, address: &str) -> anyhow::Result<()> {
    let status = ctx.engine.ip_status(address, Utc::now()).await?;
    if status.is_blocked {
        println!(
            "⛔ {} blocked until {} ({})",
            status.ip_address,
            status
                .blocked_until
                .map(|t| t.to_string())
                .unwrap_or_else(|| "further notice".to_string()),
            status.block_reason.as_deref().unwrap_or("no reason")
        );
    } else {
        println!("✅ {} not blocked", status.ip_address);
    }
    println!(
        "   reputation: {}{}",
        status.reputation_score,
        if status.first_contact { " (first contact)" } else { "" }
    );
    Ok(())
}

pub async fn events(ctx: &AppContext, user_id: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let events = ctx.engine.security_events(user_id, limit).await?;
    if events.is_empty() {
        println!("No security events");
        return Ok(());
    }
    for e in events {
        println!(
            "{} [{}] {} user={} ip={} {}",
            e.created_at,
            e.severity,
            e.event_type,
            e.user_id.as_deref().unwrap_or("-"),
            if e.ip_address.is_empty() { "-" } else { e.ip_address.as_str() },
            e.description
        );
    }
    Ok(())
}

pub async fn notifications(ctx: &AppContext, user_id: &str) -> anyhow::Result<()> {
    let notifications = ctx.engine.notifications(user_id).await?;
    if notifications.is_empty() {
        println!("No notifications for {}", user_id);
        return Ok(());
    }
    for n in notifications {
        println!(
            "{} {} [{}] {}: {} (id: {})",
            if n.is_read { "  " } else { "🔔" },
            n.created_at,
            n.severity,
            n.title,
            n.message,
            n.id
        );
    }
    Ok(())
}

pub async fn mark_read(ctx: &AppContext, id: &str) -> anyhow::Result<()> {
    if ctx.engine.mark_notification_read(id, Utc::now()).await? {
        println!("✅ Notification {} marked read", id);
    } else {
        anyhow::bail!("Notification {} not found", id);
    }
    Ok(())
}

pub async fn trust_device(
    ctx: &AppContext,
    user_id: &str,
    device_id: &str,
    trusted: bool,
) -> anyhow::Result<()> {
    let device = ctx
        .engine
        .register_device(user_id, device_id, trusted, Utc::now())
        .await?;
    println!(
        "✅ Device {} for {} is {}",
        device.device_id,
        device.user_id,
        if device.is_trusted { "trusted" } else { "untrusted" }
    );
    Ok(())
}

pub async fn metrics(ctx: &AppContext) -> anyhow::Result<()> {
    let m = ctx.engine.metrics(Utc::now()).await?;
    println!("📈 Security metrics (last 24h), health: {}", m.system_health);
    println!("   failed logins:   {}", m.failed_logins_24h);
    println!("   blocked IPs:     {}", m.blocked_ips);
    println!("   high-risk users: {}", m.high_risk_users);
    println!("   critical events: {}", m.critical_events_24h);
    println!("   fraud events:    {}", m.fraud_events_24h);
    for (level, count) in &m.risk_distribution {
        println!("   {:<9} {}", format!("{}:", level), count);
    }
    if !m.geographic_threats.is_empty() {
        println!("   threats by country:");
        for (country, count) in &m.geographic_threats {
            println!("     {} {}", country, count);
        }
    }
    Ok(())
}

pub fn rules(ctx: &AppContext) -> anyhow::Result<()> {
    let rules = ctx.engine.rules();
    println!("📜 {} rules (hash {})", rules.len(), ctx.engine.rule_set_hash());
    for rule in rules {
        println!(
            "   {} {} [{}] > {} within {}s -> {} ({})",
            if rule.is_active { "●" } else { "○" },
            rule.name,
            rule.rule_type,
            rule.threshold,
            rule.time_window_seconds,
            rule.action,
            rule.severity
        );
    }
    Ok(())
}

/// Newest `limit` records from the ledger file or the database
pub async fn load_audit(
    ctx: &AppContext,
    ledger: Option<&Path>,
    limit: usize,
    failed_only: bool,
) -> anyhow::Result<Vec<AuditRecord>> {
    let mut records = match ledger {
        Some(path) => {
            let mut all = AuditLedger::open(path)?.read_all()?;
            all.reverse();
            all
        }
        None if failed_only => ctx.engine.audit_records(usize::MAX).await?,
        None => ctx.engine.audit_records(limit).await?,
    };
    if failed_only {
        records.retain(|r| !r.success);
    }
    records.truncate(limit);
    Ok(records)
}

pub async fn audit(
    ctx: &AppContext,
    ledger: Option<&Path>,
    limit: usize,
    failed_only: bool,
) -> anyhow::Result<()> {
    let records = load_audit(ctx, ledger, limit, failed_only).await?;
    if records.is_empty() {
        println!("No audit records");
        return Ok(());
    }
    for r in records {
        println!(
            "{} {} {} {}/{} user={}{}",
            r.created_at,
            if r.success { "✅" } else { "❌" },
            r.action,
            r.resource_type,
            r.resource_id,
            r.user_id.as_deref().unwrap_or("-"),
            r.error.map(|e| format!(" error: {}", e)).unwrap_or_default()
        );
    }
    Ok(())
}
