use crate::error::Result;
use crate::ratio::OversubscriptionRatios;
use crate::shaping::{CpuQuotaPolicy, GrantShaper, MIN_CPU_CORES, MIN_MEM_MIB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Key of the CPU limit policy option
pub const CPU_NUM_QUOTA: &str = "CPU_NUM_QUOTA";

/// Language of user-facing admission messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

/// Option value as written in YAML/JSON; numbers are kept as text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum OptionValue {
    Text(String),
    Number(f64),
}

impl From<OptionValue> for String {
    fn from(value: OptionValue) -> Self {
        match value {
            OptionValue::Text(s) => s,
            OptionValue::Number(n) => n.to_string(),
        }
    }
}

fn deserialize_options<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: BTreeMap<String, OptionValue> = BTreeMap::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.into())).collect())
}

fn default_min_cpu() -> f64 {
    MIN_CPU_CORES
}

fn default_min_mem() -> f64 {
    MIN_MEM_MIB
}

/// Admission engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionConfig {
    /// Executor-style options (`DEV_CPU_SUBSCRIBE_RATIO`, `CPU_NUM_QUOTA`, ...)
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: BTreeMap<String, String>,
    #[serde(default = "default_min_cpu")]
    pub min_cpu_cores: f64,
    #[serde(default = "default_min_mem")]
    pub min_mem_mib: f64,
    #[serde(default)]
    pub locale: Locale,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            options: BTreeMap::new(),
            min_cpu_cores: MIN_CPU_CORES,
            min_mem_mib: MIN_MEM_MIB,
            locale: Locale::default(),
        }
    }
}

impl AdmissionConfig {
    /// Load from a JSON or YAML file
    pub fn load(path: &Path) -> Result<Self> {
        Ok(polestar_core::load_file(path)?)
    }

    pub fn ratios(&self) -> Result<OversubscriptionRatios> {
        OversubscriptionRatios::from_options(&self.options)
    }

    pub fn cpu_quota_policy(&self) -> Result<CpuQuotaPolicy> {
        CpuQuotaPolicy::from_option(self.options.get(CPU_NUM_QUOTA).map(String::as_str))
    }

    /// Grant shaper built from this configuration
    pub fn shaper(&self) -> Result<GrantShaper> {
        Ok(GrantShaper::new(self.ratios()?, self.cpu_quota_policy()?)
            .with_floors(self.min_cpu_cores, self.min_mem_mib))
    }
}
