//! INI file configuration adapter.
//!
//! Section and key names are case-insensitive; values are kept verbatim.

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| EngineError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, EngineError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| EngineError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, EngineError> {
        match self.config.get(section, key) {
            None => Ok(default),
            Some(raw) => Self::parse_bool(&raw).ok_or_else(|| {
                EngineError::invalid(section, key, format!("'{raw}' is not a boolean"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[strategy]
name = Regime Scalper

[backtest]
initial_capital = 10000000
fee_rate = 0.0005

[consensus]
min_votes = 3
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("Regime Scalper".to_string())
        );
        assert_eq!(adapter.get_int("consensus", "min_votes", 0).unwrap(), 3);
        assert_eq!(adapter.get_double("backtest", "fee_rate", 0.0).unwrap(), 0.0005);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[Exit]\nStop_Loss = -0.02\n").unwrap();
        assert_eq!(adapter.get_double("exit", "stop_loss", 0.0).unwrap(), -0.02);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nfee_rate = 0.001\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn require_string_reports_missing_key() {
        let adapter = FileConfigAdapter::from_string("[strategy]\n").unwrap();
        let err = adapter.require_string("strategy", "name").unwrap_err();
        assert_eq!(err.to_string(), "missing config key [strategy] name");
    }

    #[test]
    fn get_int_uses_default_only_when_missing() {
        let adapter = FileConfigAdapter::from_string("[regime]\nslope_lookback = abc\n").unwrap();
        assert_eq!(adapter.get_int("regime", "missing", 42).unwrap(), 42);
        let err = adapter.get_int("regime", "slope_lookback", 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config value [regime] slope_lookback: 'abc' is not an integer"
        );
    }

    #[test]
    fn get_double_rejects_non_numeric() {
        let adapter = FileConfigAdapter::from_string(
            "[exit]\nstop_loss = -1.5%\ntrailing_activation = inf\n",
        )
        .unwrap();
        assert!(adapter.get_double("exit", "stop_loss", -0.015).is_err());
        assert!(adapter.get_double("exit", "trailing_activation", 0.01).is_err());
        assert_eq!(adapter.get_double("exit", "missing", -0.015).unwrap(), -0.015);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[consensus]\na = true\nb = yes\nc = 1\nd = off\ne = No\nf = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("consensus", "a", false).unwrap());
        assert!(adapter.get_bool("consensus", "b", false).unwrap());
        assert!(adapter.get_bool("consensus", "c", false).unwrap());
        assert!(!adapter.get_bool("consensus", "d", true).unwrap());
        assert!(!adapter.get_bool("consensus", "e", true).unwrap());
        assert!(adapter.get_bool("consensus", "f", true).is_err());
        assert!(!adapter.get_bool("consensus", "missing", false).unwrap());
    }

    #[test]
    fn get_list_splits_and_trims() {
        let adapter = FileConfigAdapter::from_string(
            "[voters]\nenabled = rsi_extreme ,ma_cross,, htf_filter\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_list("voters", "enabled"),
            Some(vec![
                "rsi_extreme".to_string(),
                "ma_cross".to_string(),
                "htf_filter".to_string()
            ])
        );
        assert_eq!(adapter.get_list("voters", "missing"), None);
    }

    #[test]
    fn sizing_value_keeps_colons() {
        let adapter =
            FileConfigAdapter::from_string("[consensus]\nsizing = 3:0.3, 4:0.5\n").unwrap();
        assert_eq!(
            adapter.get_string("consensus", "sizing"),
            Some("3:0.3, 4:0.5".to_string())
        );
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[take_profit]\nbull_strong = 0.03, 0.06, 0.10\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_list("take_profit", "bull_strong").map(|v| v.len()),
            Some(3)
        );
    }

    #[test]
    fn from_file_returns_config_parse_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(EngineError::ConfigParse { .. })));
    }
}
