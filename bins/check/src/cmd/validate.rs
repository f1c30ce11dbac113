use std::collections::HashMap;

use converge_api::{Decoder, JsonRecord, json_decoder};
use ingest::KindCatalog;
use verify::HarnessConfig;

use crate::config::ValidateArgs;
use crate::error::CheckError;

pub async fn run(args: ValidateArgs) -> Result<(), CheckError> {
    tracing::info!("converge-check starting");

    // --- Load config ---
    let config = HarnessConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    check(&config)
}

fn check(config: &HarnessConfig) -> Result<(), CheckError> {
    config.validate()?;

    // --- Policies ---
    for name in config.policies.keys() {
        let policy = config.policy(name)?;
        tracing::info!(name = %name, %policy, "resolved policy");
    }
    if !config.policies.contains_key(verify::DEFAULT_POLICY) {
        let policy = config.default_policy()?;
        tracing::info!(%policy, "no [policies.default], using built-in");
    }

    // --- Kinds ---
    if !config.push.is_empty() && config.kinds.is_empty() {
        return Err(CheckError::NoComponents("[[kinds]]"));
    }
    let decoders: HashMap<String, Decoder<JsonRecord>> = config
        .kinds
        .iter()
        .map(|k| (k.name.clone(), json_decoder(k.name.clone())))
        .collect();
    let catalog = KindCatalog::from_config(&config.kinds, decoders)?;
    let buffers = catalog.buffers();

    // --- Ingestors ---
    for pull in &config.pull {
        catalog.check(&buffers, &pull.topics)?;
        for topic in &pull.topics {
            if let Some(entry) = catalog.resolve(topic) {
                tracing::info!(ingestor = %pull.name, %topic, kind = entry.kind(), start = ?pull.start, "pull route");
            }
        }
    }
    for push in &config.push {
        tracing::info!(ingestor = %push.name, subject = %push.subject_pattern, "push ingestor");
    }

    tracing::info!(
        kinds = catalog.len(),
        pull = config.pull.len(),
        push = config.push.len(),
        "config OK"
    );
    Ok(())
}
