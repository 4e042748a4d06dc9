use esp_idf_svc::nvs::{EspDefaultNvs, EspDefaultNvsPartition};
use trms_meter::config::MonitorConfig;

const NAMESPACE: &str = "trms";
const CONFIG_KEY: &str = "monitor";

/// Reads the monitor configuration (JSON) from flash, or the defaults if none was stored.
pub fn load_config() -> anyhow::Result<MonitorConfig> {
    let nvs = EspDefaultNvs::new(EspDefaultNvsPartition::take()?, NAMESPACE, true)?;

    match get_string(&nvs, CONFIG_KEY)? {
        Some(json) => MonitorConfig::from_json(&json),
        None => {
            log::warn!("No stored configuration, using defaults");
            Ok(MonitorConfig::default())
        }
    }
}

fn get_string(nvs: &EspDefaultNvs, key: &str) -> anyhow::Result<Option<String>> {
    let len = nvs.str_len(key)?;
    if let Some(len) = len {
        let mut buf = vec![0u8; len];
        Ok(nvs.get_str(key, &mut buf)?.map(|s| s.trim_end_matches('\0').into()))
    } else {
        Ok(None)
    }
}
