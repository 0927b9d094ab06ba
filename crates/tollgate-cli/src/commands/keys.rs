//! Keys command - administer caller API keys.

use std::fmt::Write as _;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tollgate_core::KeyRecord;
use tollgate_keys::{FileKeyStore, masked};

use crate::theme::Theme;

/// Create a key and print it. This is the only time the key is shown.
pub(crate) fn create_key(store: &FileKeyStore, name: &str) -> Result<()> {
    let (key, record) = store.create(name)?;

    println!("{}", Theme::ok(&format!("Created API key '{}'.", record.name)));
    println!("\n{}\n", Theme::secret(key.expose()));
    println!(
        "{}",
        Theme::caution("Store this key now. It cannot be shown again.")
    );
    println!("{}", Theme::field("Key file", store.path().display()));
    println!();

    Ok(())
}

/// List every key.
pub(crate) fn list_keys(store: &FileKeyStore) -> Result<()> {
    let records = store.list()?;
    if records.is_empty() {
        println!(
            "{}",
            Theme::note("No API keys. Create one with `tollgate keys create --name <name>`.")
        );
        return Ok(());
    }

    println!("\n{}", Theme::banner("API Keys"));
    print!("{}", render_table(&records));
    println!();
    Ok(())
}

/// Show one key with the secret masked.
pub(crate) fn show_key(store: &FileKeyStore, name: &str) -> Result<()> {
    let Some(record) = store.show(name)? else {
        bail!("no API key named '{name}'");
    };

    println!("\n{}", Theme::banner(&format!("API Key '{}'", record.name)));
    print!("{}", render_record(&record));
    println!();
    Ok(())
}

/// Enable or disable a key.
pub(crate) fn set_enabled(store: &FileKeyStore, name: &str, enabled: bool) -> Result<()> {
    if !store.set_enabled(name, enabled)? {
        bail!("no API key named '{name}'");
    }
    let state = if enabled { "enabled" } else { "disabled" };
    println!("{}", Theme::ok(&format!("API key '{name}' {state}.")));
    Ok(())
}

/// Delete a key, asking first unless `yes`.
pub(crate) fn revoke_key(store: &FileKeyStore, name: &str, yes: bool) -> Result<()> {
    if store.show(name)?.is_none() {
        bail!("no API key named '{name}'");
    }

    if !yes {
        println!(
            "{}",
            Theme::caution("Callers using this key will be refused immediately.")
        );
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!("Revoke API key '{name}'?"))
            .default(false)
            .interact()?;
        if !confirm {
            println!("{}", Theme::note("Aborted."));
            return Ok(());
        }
    }

    if !store.revoke(name)? {
        bail!("no API key named '{name}'");
    }
    println!("{}", Theme::ok(&format!("API key '{name}' revoked.")));
    Ok(())
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn last_used(record: &KeyRecord) -> String {
    record
        .last_used_at
        .as_ref()
        .map_or_else(|| "never".to_owned(), timestamp)
}

fn render_table(records: &[KeyRecord]) -> String {
    let width = records
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!(
        "  {:<width$}  {:<16}  {:<16}  {:<7}  KEY\n",
        "NAME", "CREATED", "LAST USED", "ENABLED"
    );
    for record in records {
        let _ = writeln!(
            out,
            "  {:<width$}  {:<16}  {:<16}  {:<7}  ...{}",
            record.name,
            timestamp(&record.created_at),
            last_used(record),
            if record.enabled { "yes" } else { "no" },
            record.key_suffix,
        );
    }
    out
}

fn render_record(record: &KeyRecord) -> String {
    [
        Theme::field("Key", masked(record)),
        Theme::field("Created", timestamp(&record.created_at)),
        Theme::field("Last used", last_used(record)),
        Theme::field("Enabled", Theme::switch(record.enabled)),
    ]
    .iter()
    .fold(String::new(), |mut out, line| {
        let _ = writeln!(out, "{line}");
        out
    })
}
