//! Bundled baseline documents.
//!
//! Embedded at build time from `baseline/*.json`. They are the trusted
//! reference shape for validation and the last-resort fallback for reads,
//! so they are always available and never stale.

use std::sync::OnceLock;

use crate::config_type::ConfigType;
use crate::document::ConfigDocument;

const DEFAULTS_JSON: &str = include_str!("../baseline/defaults.json");
const DOMAINS_JSON: &str = include_str!("../baseline/domains.json");
const STYLES_JSON: &str = include_str!("../baseline/styles.json");
const UI_JSON: &str = include_str!("../baseline/ui.json");

static BASELINES: OnceLock<[ConfigDocument; 4]> = OnceLock::new();

fn parse(config_type: ConfigType, raw: &str) -> ConfigDocument {
    // The embedded files are covered by tests; a failure here is a build defect.
    ConfigDocument::from_slice(raw.as_bytes())
        .unwrap_or_else(|e| panic!("bundled {config_type} baseline is not valid JSON: {e}"))
}

fn baselines() -> &'static [ConfigDocument; 4] {
    BASELINES.get_or_init(|| {
        [
            parse(ConfigType::Defaults, DEFAULTS_JSON),
            parse(ConfigType::Domains, DOMAINS_JSON),
            parse(ConfigType::Styles, STYLES_JSON),
            parse(ConfigType::Ui, UI_JSON),
        ]
    })
}

/// The bundled baseline document for `config_type`.
pub fn bundled(config_type: ConfigType) -> &'static ConfigDocument {
    let docs = baselines();
    match config_type {
        ConfigType::Defaults => &docs[0],
        ConfigType::Domains => &docs[1],
        ConfigType::Styles => &docs[2],
        ConfigType::Ui => &docs[3],
    }
}

/// Raw embedded text of the baseline, as shipped.
pub fn bundled_raw(config_type: ConfigType) -> &'static str {
    match config_type {
        ConfigType::Defaults => DEFAULTS_JSON,
        ConfigType::Domains => DOMAINS_JSON,
        ConfigType::Styles => STYLES_JSON,
        ConfigType::Ui => UI_JSON,
    }
}
