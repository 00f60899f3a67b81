// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tarjima webhooks` command implementation.
//!
//! Webhook administration is distinct from the polling supervisor: it
//! registers or inspects the platform-side webhook for one or all tenants
//! and prints a masked tenant listing.

use std::sync::Arc;

use tracing::info;

use tarjima_config::TarjimaConfig;
use tarjima_core::{MessengerApi, TarjimaError};
use tarjima_registry::TenantRegistry;
use tarjima_storage::Database;
use tarjima_telegram::TelegramMessenger;

use crate::{WebhookAction, WebhookArgs};

/// Webhook URL for one tenant under a public base URL.
fn webhook_url(base_url: &str, tenant_id: i64) -> String {
    format!("{}/bot/webhook/{tenant_id}/", base_url.trim_end_matches('/'))
}

/// Print the diagnostic tenant listing, secrets masked.
pub async fn print_tenant_list(registry: &TenantRegistry) -> Result<(), TarjimaError> {
    let overview = registry.list_overview().await?;

    println!("\nTenants:\n{}", "=".repeat(60));
    for tenant in &overview {
        let active = if tenant.is_active { "active" } else { "inactive" };
        let credential = match &tenant.credential {
            Some(masked) => format!("configured ({masked})"),
            None => "not configured".to_string(),
        };

        println!("\n  ID: {}", tenant.id);
        println!("  Name: {}", tenant.name);
        println!("  Status: {active}");
        println!("  Credential: {credential}");
        println!(
            "  Company channel: {}",
            if tenant.company_channel_configured {
                "configured"
            } else {
                "not configured"
            }
        );
        for branch in &tenant.branches {
            println!(
                "    Branch {} ({}): B2C {} | B2B {}",
                branch.id,
                branch.name,
                if branch.b2c_channel_configured { "yes" } else { "no" },
                if branch.b2b_channel_configured { "yes" } else { "no" },
            );
        }
    }
    println!("\n{}\nTotal: {} tenants\n", "=".repeat(60), overview.len());
    Ok(())
}

fn require_base_url(args: &WebhookArgs) -> Result<&str, TarjimaError> {
    args.base_url
        .as_deref()
        .ok_or_else(|| TarjimaError::Config("--base-url is required for this action".into()))
}

fn require_tenant(args: &WebhookArgs) -> Result<i64, TarjimaError> {
    args.tenant
        .ok_or_else(|| TarjimaError::Config("--tenant is required for this action".into()))
}

fn client_for(
    config: &TarjimaConfig,
    tenant: &tarjima_core::types::Tenant,
) -> Result<TelegramMessenger, TarjimaError> {
    let token = tenant.bot_token.as_deref().ok_or_else(|| {
        TarjimaError::Config(format!(
            "tenant {} has no bot credential configured",
            tenant.id
        ))
    })?;
    TelegramMessenger::new(tenant.id, token, config.telegram.api_url.as_deref())
}

/// Runs the `tarjima webhooks` command.
pub async fn run_webhooks(config: TarjimaConfig, args: WebhookArgs) -> Result<(), TarjimaError> {
    let db = Arc::new(Database::open(&config.storage.database_path).await?);
    let registry = TenantRegistry::new(db.clone());

    match args.action {
        WebhookAction::List => print_tenant_list(&registry).await?,

        WebhookAction::Register => {
            let base_url = require_base_url(&args)?;
            let tenant_id = require_tenant(&args)?;
            let tenant = registry.get_active(tenant_id).await?;

            let url = webhook_url(base_url, tenant.id);
            let client = client_for(&config, &tenant)?;
            client.set_webhook(&url).await?;
            info!(tenant_id, url = url.as_str(), "webhook registered");
            println!("Webhook set for {}: {url}", tenant.name);
        }

        WebhookAction::RegisterAll => {
            let base_url = require_base_url(&args)?;
            let tenants = registry.active_with_bots().await?;
            let mut registered = 0;

            for tenant in &tenants {
                let url = webhook_url(base_url, tenant.id);
                match client_for(&config, tenant) {
                    Ok(client) => match client.set_webhook(&url).await {
                        Ok(()) => {
                            println!("Webhook set for {}: {url}", tenant.name);
                            registered += 1;
                        }
                        Err(e) => println!("Failed for {}: {e}", tenant.name),
                    },
                    Err(e) => println!("Failed for {}: {e}", tenant.name),
                }
            }
            println!("\nProcessed {} tenants, {registered} registered", tenants.len());
        }

        WebhookAction::Info => {
            let tenant_id = require_tenant(&args)?;
            let tenant = registry.get_active(tenant_id).await?;
            let client = client_for(&config, &tenant)?;
            let status = client.webhook_info().await?;

            println!("\nWebhook info for: {}", tenant.name);
            println!("  URL: {}", status.url.as_deref().unwrap_or("not set"));
            println!("  Pending updates: {}", status.pending_update_count);
            if let Some(last_error) = &status.last_error_message {
                println!("  Last error: {last_error}");
            }
        }
    }

    db.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_joins_without_double_slash() {
        assert_eq!(
            webhook_url("https://example.com", 3),
            "https://example.com/bot/webhook/3/"
        );
        assert_eq!(
            webhook_url("https://example.com/", 3),
            "https://example.com/bot/webhook/3/"
        );
    }
}
